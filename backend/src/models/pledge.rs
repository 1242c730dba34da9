//! Pledge model
//!
//! A pledge is a loan contract secured by one or more pawned items.
//! Each pledge has:
//! - Branch, customer, and (optional, different) owner
//! - Branch/year scoped pledge and receipt numbers
//! - Valuation aggregates and the loan derived from them (i64 minor units)
//! - Three interest rates snapshotted at creation
//! - Pledge, due, and grace-end dates
//! - Status (Active, Renewed, Overdue, Forfeited, Redeemed, Auctioned, Cancelled)
//!
//! After creation a pledge is only changed through lifecycle transitions;
//! callers receive clones and cannot edit the ledger copy.
//!
//! CRITICAL: All money values are i64 (minor units)

use crate::models::gold_price::GoldPriceSnapshot;
use crate::models::payment::PaymentSplit;
use crate::models::rates::PledgeRates;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Pledge status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PledgeStatus {
    /// Loan outstanding, never renewed
    Active,

    /// Loan outstanding, renewed at least once
    Renewed,

    /// Past due date (set by the overdue batch; also derivable from dates)
    Overdue,

    /// Declared forfeit after grace expiry, awaiting auction
    Forfeited,

    /// Every item redeemed (terminal)
    Redeemed,

    /// Collateral sold at auction (terminal)
    Auctioned,

    /// Reversed before any payment (terminal)
    Cancelled,
}

impl PledgeStatus {
    /// Terminal statuses never change again
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PledgeStatus::Redeemed | PledgeStatus::Auctioned | PledgeStatus::Cancelled
        )
    }

    /// Loan still outstanding and serviceable (renewable / redeemable)
    pub fn is_open(&self) -> bool {
        matches!(
            self,
            PledgeStatus::Active | PledgeStatus::Renewed | PledgeStatus::Overdue
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PledgeStatus::Active => "active",
            PledgeStatus::Renewed => "renewed",
            PledgeStatus::Overdue => "overdue",
            PledgeStatus::Forfeited => "forfeited",
            PledgeStatus::Redeemed => "redeemed",
            PledgeStatus::Auctioned => "auctioned",
            PledgeStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for PledgeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Cancellation metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cancellation {
    pub cancelled_on: NaiveDate,
    pub cancelled_by: String,
    pub reason: String,
}

/// Everything needed to open a pledge
///
/// Built by the lifecycle after valuation and numbering succeed.
#[derive(Debug, Clone)]
pub(crate) struct NewPledge {
    pub branch_id: String,
    pub customer_id: String,
    pub owner_id: Option<String>,
    pub pledge_no: String,
    pub receipt_no: String,
    pub total_gross_weight_mg: i64,
    pub total_weight_mg: i64,
    pub gross_value: i64,
    pub total_deduction: i64,
    pub net_value: i64,
    pub loan_percentage_bps: i64,
    pub loan_amount: i64,
    pub handling_fee: i64,
    pub payout: PaymentSplit,
    pub rates: PledgeRates,
    pub pledge_date: NaiveDate,
    pub term_months: u32,
    pub due_date: NaiveDate,
    pub grace_end_date: NaiveDate,
    pub gold_prices: GoldPriceSnapshot,
    pub created_by: String,
}

/// A loan contract secured by pawned items
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pledge {
    id: String,
    branch_id: String,
    customer_id: String,
    owner_id: Option<String>,
    pledge_no: String,
    receipt_no: String,
    item_ids: Vec<String>,

    /// Sum of item gross weights (mg)
    total_gross_weight_mg: i64,
    /// Sum of item net weights (mg)
    total_weight_mg: i64,
    gross_value: i64,
    total_deduction: i64,
    /// gross_value - total_deduction
    net_value: i64,
    loan_percentage_bps: i64,
    /// round(net_value * loan_percentage / 100)
    loan_amount: i64,
    /// Principal still owed; drops on partial redemption
    outstanding_principal: i64,
    handling_fee: i64,
    /// loan_amount - handling_fee
    payout_amount: i64,
    payout: PaymentSplit,

    rates: PledgeRates,
    pledge_date: NaiveDate,
    term_months: u32,
    due_date: NaiveDate,
    grace_end_date: NaiveDate,
    /// Prices the items were valued with
    gold_prices: GoldPriceSnapshot,

    status: PledgeStatus,
    renewal_count: u32,
    /// Pledge months whose interest has been collected by renewals
    interest_months_paid: u32,
    forfeited_on: Option<NaiveDate>,
    cancellation: Option<Cancellation>,
    created_by: String,
}

impl Pledge {
    pub(crate) fn open(new: NewPledge) -> Self {
        let payout_amount = new.loan_amount - new.handling_fee;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            branch_id: new.branch_id,
            customer_id: new.customer_id,
            owner_id: new.owner_id,
            pledge_no: new.pledge_no,
            receipt_no: new.receipt_no,
            item_ids: Vec::new(),
            total_gross_weight_mg: new.total_gross_weight_mg,
            total_weight_mg: new.total_weight_mg,
            gross_value: new.gross_value,
            total_deduction: new.total_deduction,
            net_value: new.net_value,
            loan_percentage_bps: new.loan_percentage_bps,
            loan_amount: new.loan_amount,
            outstanding_principal: new.loan_amount,
            handling_fee: new.handling_fee,
            payout_amount,
            payout: new.payout,
            rates: new.rates,
            pledge_date: new.pledge_date,
            term_months: new.term_months,
            due_date: new.due_date,
            grace_end_date: new.grace_end_date,
            gold_prices: new.gold_prices,
            status: PledgeStatus::Active,
            renewal_count: 0,
            interest_months_paid: 0,
            forfeited_on: None,
            cancellation: None,
            created_by: new.created_by,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn branch_id(&self) -> &str {
        &self.branch_id
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    /// Owner of the collateral; the customer when not recorded separately
    pub fn owner_id(&self) -> &str {
        self.owner_id.as_deref().unwrap_or(&self.customer_id)
    }

    pub fn pledge_no(&self) -> &str {
        &self.pledge_no
    }

    pub fn receipt_no(&self) -> &str {
        &self.receipt_no
    }

    pub fn item_ids(&self) -> &[String] {
        &self.item_ids
    }

    pub fn total_gross_weight_mg(&self) -> i64 {
        self.total_gross_weight_mg
    }

    pub fn total_weight_mg(&self) -> i64 {
        self.total_weight_mg
    }

    pub fn gross_value(&self) -> i64 {
        self.gross_value
    }

    pub fn total_deduction(&self) -> i64 {
        self.total_deduction
    }

    pub fn net_value(&self) -> i64 {
        self.net_value
    }

    pub fn loan_percentage_bps(&self) -> i64 {
        self.loan_percentage_bps
    }

    pub fn loan_amount(&self) -> i64 {
        self.loan_amount
    }

    pub fn outstanding_principal(&self) -> i64 {
        self.outstanding_principal
    }

    pub fn handling_fee(&self) -> i64 {
        self.handling_fee
    }

    pub fn payout_amount(&self) -> i64 {
        self.payout_amount
    }

    pub fn payout(&self) -> PaymentSplit {
        self.payout
    }

    pub fn rates(&self) -> &PledgeRates {
        &self.rates
    }

    pub fn pledge_date(&self) -> NaiveDate {
        self.pledge_date
    }

    pub fn term_months(&self) -> u32 {
        self.term_months
    }

    pub fn due_date(&self) -> NaiveDate {
        self.due_date
    }

    pub fn grace_end_date(&self) -> NaiveDate {
        self.grace_end_date
    }

    pub fn gold_prices(&self) -> &GoldPriceSnapshot {
        &self.gold_prices
    }

    /// Stored status (see [`Pledge::display_status`] for the date-derived view)
    pub fn status(&self) -> PledgeStatus {
        self.status
    }

    pub fn renewal_count(&self) -> u32 {
        self.renewal_count
    }

    pub fn interest_months_paid(&self) -> u32 {
        self.interest_months_paid
    }

    pub fn forfeited_on(&self) -> Option<NaiveDate> {
        self.forfeited_on
    }

    pub fn cancellation(&self) -> Option<&Cancellation> {
        self.cancellation.as_ref()
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Past due date
    ///
    /// Returns `true` if `as_of` is **strictly after** the due date.
    ///
    /// # Boundary Semantics
    /// - `as_of <= due_date`: not overdue
    /// - `as_of > due_date`: overdue (still serviceable until grace end)
    pub fn is_overdue(&self, as_of: NaiveDate) -> bool {
        as_of > self.due_date
    }

    /// Still renewable / redeemable without forfeiture risk
    pub fn is_within_grace(&self, as_of: NaiveDate) -> bool {
        as_of <= self.grace_end_date
    }

    /// Past grace end, eligible for a manual forfeiture declaration
    pub fn is_forfeitable(&self, as_of: NaiveDate) -> bool {
        self.status.is_open() && as_of > self.grace_end_date
    }

    /// Status as displayed on `as_of`
    ///
    /// Open pledges past their due date show as overdue even when the
    /// overdue batch has not stored it yet.
    pub fn display_status(&self, as_of: NaiveDate) -> PledgeStatus {
        if self.status.is_open() && self.is_overdue(as_of) {
            PledgeStatus::Overdue
        } else {
            self.status
        }
    }

    pub(crate) fn attach_item(&mut self, item_id: &str) {
        self.item_ids.push(item_id.to_string());
    }

    pub(crate) fn set_status(&mut self, status: PledgeStatus) {
        self.status = status;
    }

    /// Record a renewal: new dates, paid months, renewal count
    pub(crate) fn apply_renewal(
        &mut self,
        new_due_date: NaiveDate,
        new_grace_end_date: NaiveDate,
        months_paid: u32,
    ) {
        self.due_date = new_due_date;
        self.grace_end_date = new_grace_end_date;
        self.interest_months_paid += months_paid;
        self.renewal_count += 1;
        self.status = PledgeStatus::Renewed;
    }

    pub(crate) fn reduce_principal(&mut self, amount: i64) {
        self.outstanding_principal -= amount;
    }

    pub(crate) fn mark_forfeited(&mut self, date: NaiveDate) {
        self.status = PledgeStatus::Forfeited;
        self.forfeited_on = Some(date);
    }

    pub(crate) fn mark_cancelled(&mut self, cancellation: Cancellation) {
        self.status = PledgeStatus::Cancelled;
        self.cancellation = Some(cancellation);
    }
}
