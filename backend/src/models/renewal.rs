//! Renewal and redemption records
//!
//! Both are append-only: once written they are never edited. A renewal
//! keeps one breakdown row per charged month because the rate can change
//! mid-period (standard -> extended -> overdue) and the printed receipt
//! lists every month.
//!
//! CRITICAL: All money values are i64 (minor units)

use crate::models::payment::PaymentSplit;
use crate::models::rates::RateType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Record status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Completed,
}

/// Interest charged for one pledge month
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestBreakdownRow {
    /// Pledge month this row charges (1 = the month starting on the pledge date)
    pub month_no: u32,
    /// First day of that month
    pub month_start: NaiveDate,
    pub rate_type: RateType,
    pub rate_bps: i64,
    pub amount: i64,
    /// Running total including this row
    pub cumulative_amount: i64,
}

/// A renewal: interest collected, due date pushed out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Renewal {
    pub id: String,
    pub pledge_id: String,
    pub branch_id: String,
    pub renewal_no: String,
    /// Sequence within the pledge (1 = first renewal)
    pub renewal_count: u32,
    pub renewal_date: NaiveDate,
    pub renewal_months: u32,
    pub previous_due_date: NaiveDate,
    pub new_due_date: NaiveDate,
    pub new_grace_end_date: NaiveDate,
    /// Rate in force on the renewal date
    pub interest_rate_bps: i64,
    pub interest_months: u32,
    pub interest_amount: i64,
    pub handling_fee: i64,
    pub total_payable: i64,
    pub payment: PaymentSplit,
    pub status: RecordStatus,
    pub breakdown: Vec<InterestBreakdownRow>,
    pub processed_by: String,
}

/// A redemption: principal and interest repaid, items returned
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Redemption {
    pub id: String,
    pub pledge_id: String,
    pub branch_id: String,
    pub redemption_no: String,
    pub redemption_date: NaiveDate,
    pub is_partial: bool,
    pub redeemed_item_ids: Vec<String>,
    pub principal_amount: i64,
    pub interest_months: u32,
    /// Rate in force on the redemption date
    pub interest_rate_bps: i64,
    pub interest_amount: i64,
    pub handling_fee: i64,
    pub other_charges: i64,
    pub total_payable: i64,
    pub payment: PaymentSplit,
    pub status: RecordStatus,
    pub breakdown: Vec<InterestBreakdownRow>,
    pub items_released: bool,
    pub released_on: Option<NaiveDate>,
    pub released_by: Option<String>,
    pub processed_by: String,
}

/// Auction listing state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuctionStatus {
    Listed,
    Sold,
}

/// A forfeited item offered at auction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuctionItem {
    pub id: String,
    pub pledge_id: String,
    pub item_id: String,
    pub branch_id: String,
    pub auction_no: String,
    pub listed_on: NaiveDate,
    pub reserve_price: i64,
    pub status: AuctionStatus,
    pub sale_price: Option<i64>,
    pub sold_on: Option<NaiveDate>,
    pub buyer_ref: Option<String>,
}
