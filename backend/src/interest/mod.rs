//! Interest policy
//!
//! Picks the rate tier for a pledge and prices interest month by month.
//!
//! # Tiers
//!
//! For the pledge as a whole on a reference date:
//! 1. `overdue` when the date is past the due date and an overdue rate exists
//! 2. `extended` when more than `extended_after_months` have elapsed
//! 3. `standard` otherwise
//!
//! The month-by-month breakdown re-evaluates the tier for each pledge
//! month: month `k` is overdue when it starts after the due date, extended
//! when `k > extended_after_months`, standard otherwise. Each row is
//! `round(principal x rate_bps / 10_000)`.
//!
//! # Paid months
//!
//! Renewals collect interest for months `1..=n` and record `n` on the
//! pledge. Accrued interest only covers months after the paid ones, which
//! keeps it non-decreasing in the reference date.

pub mod rate_book;

pub use rate_book::RateBook;

use crate::core::calendar::{chargeable_months, elapsed_months, month_start, MonthRounding};
use crate::core::money::apply_bps;
use crate::models::pledge::Pledge;
use crate::models::rates::{PledgeRates, RateType};
use crate::models::renewal::InterestBreakdownRow;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum InterestError {
    #[error("No {rate_type:?} interest rate in force for branch {branch_id}")]
    MissingRate { branch_id: String, rate_type: RateType },

    #[error("Reference date {as_of} is before pledge date {pledge_date}")]
    InvalidPeriod { pledge_date: NaiveDate, as_of: NaiveDate },

    #[error("Invalid interest rate: {0}")]
    InvalidRate(String),
}

/// Rate tier and monthly rate in force
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveRate {
    pub rate_type: RateType,
    pub rate_bps: i64,
}

/// Tier selection and interest pricing under one partial-month rule
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InterestPolicy {
    rounding: MonthRounding,
}

impl InterestPolicy {
    pub fn new(rounding: MonthRounding) -> Self {
        Self { rounding }
    }

    pub fn rounding(&self) -> MonthRounding {
        self.rounding
    }

    /// Chargeable months from the pledge date to `as_of` (at least one)
    pub fn chargeable_months(&self, pledge: &Pledge, as_of: NaiveDate) -> Result<u32, InterestError> {
        check_period(pledge, as_of)?;
        Ok(chargeable_months(pledge.pledge_date(), as_of, self.rounding))
    }

    /// Rate tier in force for the pledge on `as_of`
    pub fn effective_rate(&self, pledge: &Pledge, as_of: NaiveDate) -> Result<EffectiveRate, InterestError> {
        check_period(pledge, as_of)?;
        let rates = pledge.rates();

        if pledge.is_overdue(as_of) {
            if let Some(rate_bps) = rates.overdue_bps {
                return Ok(EffectiveRate {
                    rate_type: RateType::Overdue,
                    rate_bps,
                });
            }
        }

        let elapsed = elapsed_months(pledge.pledge_date(), as_of, self.rounding);
        if elapsed > rates.extended_after_months {
            Ok(EffectiveRate {
                rate_type: RateType::Extended,
                rate_bps: rates.extended_bps,
            })
        } else {
            Ok(EffectiveRate {
                rate_type: RateType::Standard,
                rate_bps: rates.standard_bps,
            })
        }
    }

    /// Breakdown of interest not yet collected, on the outstanding principal
    pub fn unpaid_breakdown(
        &self,
        pledge: &Pledge,
        as_of: NaiveDate,
    ) -> Result<Vec<InterestBreakdownRow>, InterestError> {
        self.unpaid_breakdown_on(pledge, pledge.outstanding_principal(), as_of)
    }

    /// Breakdown of interest not yet collected, on a chosen principal
    ///
    /// Partial redemptions price interest on the redeemed portion only.
    pub fn unpaid_breakdown_on(
        &self,
        pledge: &Pledge,
        principal: i64,
        as_of: NaiveDate,
    ) -> Result<Vec<InterestBreakdownRow>, InterestError> {
        let chargeable = self.chargeable_months(pledge, as_of)?;
        let paid = pledge.interest_months_paid();
        Ok(breakdown(
            principal,
            pledge.rates(),
            pledge.pledge_date(),
            pledge.due_date(),
            paid + 1,
            chargeable.saturating_sub(paid),
        ))
    }

    /// Interest accrued and unpaid on `as_of`
    pub fn accrued_interest(&self, pledge: &Pledge, as_of: NaiveDate) -> Result<i64, InterestError> {
        Ok(total_of(&self.unpaid_breakdown(pledge, as_of)?))
    }

    /// Months a renewal on `as_of` collects: unpaid months, at least one
    pub fn renewal_breakdown(
        &self,
        pledge: &Pledge,
        as_of: NaiveDate,
    ) -> Result<Vec<InterestBreakdownRow>, InterestError> {
        let chargeable = self.chargeable_months(pledge, as_of)?;
        let paid = pledge.interest_months_paid();
        let months = chargeable.saturating_sub(paid).max(1);
        Ok(breakdown(
            pledge.outstanding_principal(),
            pledge.rates(),
            pledge.pledge_date(),
            pledge.due_date(),
            paid + 1,
            months,
        ))
    }
}

fn check_period(pledge: &Pledge, as_of: NaiveDate) -> Result<(), InterestError> {
    if as_of < pledge.pledge_date() {
        return Err(InterestError::InvalidPeriod {
            pledge_date: pledge.pledge_date(),
            as_of,
        });
    }
    Ok(())
}

/// Tier for one pledge month (1-indexed)
pub fn tier_for_month(
    rates: &PledgeRates,
    pledge_date: NaiveDate,
    due_date: NaiveDate,
    month_no: u32,
) -> EffectiveRate {
    if let Some(rate_bps) = rates.overdue_bps {
        if month_start(pledge_date, month_no) > due_date {
            return EffectiveRate {
                rate_type: RateType::Overdue,
                rate_bps,
            };
        }
    }

    if month_no > rates.extended_after_months {
        EffectiveRate {
            rate_type: RateType::Extended,
            rate_bps: rates.extended_bps,
        }
    } else {
        EffectiveRate {
            rate_type: RateType::Standard,
            rate_bps: rates.standard_bps,
        }
    }
}

/// One row per month for `months` pledge months starting at `first_month`
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use pawnshop_core_rs::interest::breakdown;
/// use pawnshop_core_rs::models::{PledgeRates, RateType};
///
/// let rates = PledgeRates {
///     standard_bps: 200,
///     extended_bps: 250,
///     overdue_bps: None,
///     extended_after_months: 6,
/// };
/// let pledged = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
/// let due = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
///
/// let rows = breakdown(100_000, &rates, pledged, due, 1, 7);
/// assert_eq!(rows.len(), 7);
/// assert_eq!(rows[5].cumulative_amount, 12_000);
/// assert_eq!(rows[6].rate_type, RateType::Extended);
/// assert_eq!(rows[6].cumulative_amount, 14_500);
/// ```
pub fn breakdown(
    principal: i64,
    rates: &PledgeRates,
    pledge_date: NaiveDate,
    due_date: NaiveDate,
    first_month: u32,
    months: u32,
) -> Vec<InterestBreakdownRow> {
    let mut cumulative_amount = 0;
    (first_month..first_month + months)
        .map(|month_no| {
            let tier = tier_for_month(rates, pledge_date, due_date, month_no);
            let amount = apply_bps(principal, tier.rate_bps);
            cumulative_amount += amount;
            InterestBreakdownRow {
                month_no,
                month_start: month_start(pledge_date, month_no),
                rate_type: tier.rate_type,
                rate_bps: tier.rate_bps,
                amount,
                cumulative_amount,
            }
        })
        .collect()
}

/// Total of a breakdown (its last cumulative amount)
pub fn total_of(rows: &[InterestBreakdownRow]) -> i64 {
    rows.last().map_or(0, |row| row.cumulative_amount)
}
