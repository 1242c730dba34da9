//! Day-end aggregation and close
//!
//! # Critical Invariants
//!
//! 1. **One report per (branch, date)**: the book is keyed by branch then
//!    date, so a second `open` for the same key fails instead of
//!    overwriting
//! 2. **Pure aggregation**: [`aggregate`] only reads the ledger and may be
//!    called any number of times before close
//! 3. **Frozen after close**: `close` stores the totals; mutations dated on
//!    a closed day are rejected through [`DayEndBook::ensure_open`]

use crate::models::day_end::{DailyTotals, DayEndReport, DayEndStatus};
use crate::models::pledge::PledgeStatus;
use crate::models::renewal::AuctionStatus;
use crate::models::state::LedgerState;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DayEndError {
    #[error("Day {date} already opened for branch {branch_id}")]
    AlreadyOpened { branch_id: String, date: NaiveDate },

    #[error("Day {date} not opened for branch {branch_id}")]
    NotOpened { branch_id: String, date: NaiveDate },

    #[error("Day {date} already closed for branch {branch_id}")]
    AlreadyClosed { branch_id: String, date: NaiveDate },

    #[error("Day {date} is closed for branch {branch_id}; no further changes")]
    DayClosed { branch_id: String, date: NaiveDate },
}

/// Every day-end report, keyed branch -> date
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DayEndBook {
    reports: BTreeMap<String, BTreeMap<NaiveDate, DayEndReport>>,
}

impl DayEndBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, branch_id: &str, date: NaiveDate) -> Option<&DayEndReport> {
        self.reports.get(branch_id).and_then(|days| days.get(&date))
    }

    pub fn reports(&self) -> impl Iterator<Item = &DayEndReport> {
        self.reports.values().flat_map(|days| days.values())
    }

    pub fn is_closed(&self, branch_id: &str, date: NaiveDate) -> bool {
        self.report(branch_id, date).map_or(false, DayEndReport::is_closed)
    }

    /// Fail if the branch's day is closed
    pub fn ensure_open(&self, branch_id: &str, date: NaiveDate) -> Result<(), DayEndError> {
        if self.is_closed(branch_id, date) {
            return Err(DayEndError::DayClosed {
                branch_id: branch_id.to_string(),
                date,
            });
        }
        Ok(())
    }

    /// Open the branch's day with its opening cash balance
    pub fn open(
        &mut self,
        branch_id: &str,
        date: NaiveDate,
        opening_balance: i64,
        opened_by: &str,
    ) -> Result<DayEndReport, DayEndError> {
        if let Some(existing) = self.report(branch_id, date) {
            return Err(if existing.is_closed() {
                DayEndError::AlreadyClosed {
                    branch_id: branch_id.to_string(),
                    date,
                }
            } else {
                DayEndError::AlreadyOpened {
                    branch_id: branch_id.to_string(),
                    date,
                }
            });
        }

        let report = DayEndReport {
            id: uuid::Uuid::new_v4().to_string(),
            branch_id: branch_id.to_string(),
            report_date: date,
            status: DayEndStatus::Open,
            opening_balance,
            opened_by: opened_by.to_string(),
            totals: None,
            expected_closing_balance: None,
            closing_balance: None,
            variance: None,
            notes: None,
            closed_by: None,
        };

        self.reports
            .entry(branch_id.to_string())
            .or_default()
            .insert(date, report.clone());
        Ok(report)
    }

    /// Freeze the totals and record the counted closing balance
    pub fn close(
        &mut self,
        branch_id: &str,
        date: NaiveDate,
        totals: DailyTotals,
        closing_balance: i64,
        notes: Option<String>,
        closed_by: &str,
    ) -> Result<DayEndReport, DayEndError> {
        let report = self
            .reports
            .get_mut(branch_id)
            .and_then(|days| days.get_mut(&date))
            .ok_or_else(|| DayEndError::NotOpened {
                branch_id: branch_id.to_string(),
                date,
            })?;

        if report.is_closed() {
            return Err(DayEndError::AlreadyClosed {
                branch_id: branch_id.to_string(),
                date,
            });
        }

        let expected = report.opening_balance + totals.net_cash();
        report.status = DayEndStatus::Closed;
        report.totals = Some(totals);
        report.expected_closing_balance = Some(expected);
        report.closing_balance = Some(closing_balance);
        report.variance = Some(closing_balance - expected);
        report.notes = notes;
        report.closed_by = Some(closed_by.to_string());

        Ok(report.clone())
    }
}

/// Sum a branch's completed business for one date
///
/// Pledges later cancelled are left out. Auction sales count as cash in.
pub fn aggregate(ledger: &LedgerState, branch_id: &str, date: NaiveDate) -> DailyTotals {
    let mut totals = DailyTotals::default();

    for pledge in ledger.pledges().filter(|p| {
        p.branch_id() == branch_id && p.pledge_date() == date && p.status() != PledgeStatus::Cancelled
    }) {
        totals.pledge_count += 1;
        totals.pledge_loan_total += pledge.loan_amount();
        totals.pledge_payout_total += pledge.payout_amount();
        totals.pledge_fee_total += pledge.handling_fee();
        totals.cash_out += pledge.payout().cash;
        totals.transfer_out += pledge.payout().transfer;
    }

    for renewal in ledger
        .renewals()
        .filter(|r| r.branch_id == branch_id && r.renewal_date == date)
    {
        totals.renewal_count += 1;
        totals.renewal_interest_total += renewal.interest_amount;
        totals.renewal_fee_total += renewal.handling_fee;
        totals.renewal_collected_total += renewal.total_payable;
        totals.cash_in += renewal.payment.cash;
        totals.transfer_in += renewal.payment.transfer;
    }

    for redemption in ledger
        .redemptions()
        .filter(|r| r.branch_id == branch_id && r.redemption_date == date)
    {
        totals.redemption_count += 1;
        if redemption.is_partial {
            totals.partial_redemption_count += 1;
        }
        totals.redemption_principal_total += redemption.principal_amount;
        totals.redemption_interest_total += redemption.interest_amount;
        totals.redemption_fee_total += redemption.handling_fee + redemption.other_charges;
        totals.redemption_collected_total += redemption.total_payable;
        totals.cash_in += redemption.payment.cash;
        totals.transfer_in += redemption.payment.transfer;
    }

    for sale in ledger.auction_items().filter(|a| {
        a.branch_id == branch_id && a.status == AuctionStatus::Sold && a.sold_on == Some(date)
    }) {
        let price = sale.sale_price.unwrap_or(0);
        totals.auction_sale_count += 1;
        totals.auction_sale_total += price;
        totals.cash_in += price;
    }

    totals
}
