//! Interest rate rows and the per-pledge rate snapshot
//!
//! CRITICAL: Rates are i64 basis points per month (2% = 200)

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Interest tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateType {
    Standard,
    Extended,
    Overdue,
}

impl RateType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateType::Standard => "standard",
            RateType::Extended => "extended",
            RateType::Overdue => "overdue",
        }
    }
}

/// A named rate, scoped to one branch or global (`branch_id = None`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRate {
    pub id: String,
    pub branch_id: Option<String>,
    pub name: String,
    pub rate_type: RateType,
    /// Monthly rate in basis points
    pub rate_bps: i64,
    /// First pledge month this tier covers (1-indexed)
    pub month_from: u32,
    /// Last pledge month this tier covers, open-ended when `None`
    pub month_to: Option<u32>,
    pub effective_from: NaiveDate,
    pub effective_to: Option<NaiveDate>,
    pub is_active: bool,
}

impl InterestRate {
    /// Create an active, open-ended global rate
    pub fn new(name: &str, rate_type: RateType, rate_bps: i64, effective_from: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            branch_id: None,
            name: name.to_string(),
            rate_type,
            rate_bps,
            month_from: 1,
            month_to: None,
            effective_from,
            effective_to: None,
            is_active: true,
        }
    }

    /// Scope to one branch (builder pattern)
    pub fn for_branch(mut self, branch_id: &str) -> Self {
        self.branch_id = Some(branch_id.to_string());
        self
    }

    /// Restrict the pledge-month range (builder pattern)
    pub fn with_months(mut self, month_from: u32, month_to: Option<u32>) -> Self {
        self.month_from = month_from;
        self.month_to = month_to;
        self
    }

    /// Close the effective window (builder pattern)
    pub fn effective_until(mut self, effective_to: NaiveDate) -> Self {
        self.effective_to = Some(effective_to);
        self
    }

    /// Is this row in force on `date`?
    pub fn is_effective_on(&self, date: NaiveDate) -> bool {
        self.is_active
            && self.effective_from <= date
            && self.effective_to.map_or(true, |to| date <= to)
    }
}

/// The three rates a pledge carries for its whole life
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeRates {
    pub standard_bps: i64,
    pub extended_bps: i64,
    /// `None` when the branch charges no separate overdue tier
    pub overdue_bps: Option<i64>,
    /// Months charged at the standard rate before the extended rate applies
    pub extended_after_months: u32,
}

impl PledgeRates {
    pub fn rate_for(&self, rate_type: RateType) -> Option<i64> {
        match rate_type {
            RateType::Standard => Some(self.standard_bps),
            RateType::Extended => Some(self.extended_bps),
            RateType::Overdue => self.overdue_bps,
        }
    }
}
