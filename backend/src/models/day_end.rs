//! Day-end report and daily totals
//!
//! CRITICAL: All money values are i64 (minor units)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayEndStatus {
    Open,
    Closed,
}

/// Branch totals for one business date
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTotals {
    pub pledge_count: u32,
    pub pledge_loan_total: i64,
    pub pledge_payout_total: i64,
    pub pledge_fee_total: i64,

    pub renewal_count: u32,
    pub renewal_interest_total: i64,
    pub renewal_fee_total: i64,
    pub renewal_collected_total: i64,

    pub redemption_count: u32,
    pub partial_redemption_count: u32,
    pub redemption_principal_total: i64,
    pub redemption_interest_total: i64,
    pub redemption_fee_total: i64,
    pub redemption_collected_total: i64,

    pub auction_sale_count: u32,
    pub auction_sale_total: i64,

    pub cash_in: i64,
    pub cash_out: i64,
    pub transfer_in: i64,
    pub transfer_out: i64,
}

impl DailyTotals {
    /// Net cash movement of the day
    pub fn net_cash(&self) -> i64 {
        self.cash_in - self.cash_out
    }
}

/// One branch's reconciliation for one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayEndReport {
    pub id: String,
    pub branch_id: String,
    pub report_date: NaiveDate,
    pub status: DayEndStatus,
    pub opening_balance: i64,
    pub opened_by: String,
    /// Frozen on close
    pub totals: Option<DailyTotals>,
    /// opening_balance + cash_in - cash_out
    pub expected_closing_balance: Option<i64>,
    pub closing_balance: Option<i64>,
    /// closing_balance - expected_closing_balance
    pub variance: Option<i64>,
    pub notes: Option<String>,
    pub closed_by: Option<String>,
}

impl DayEndReport {
    pub fn is_closed(&self) -> bool {
        self.status == DayEndStatus::Closed
    }
}
