//! Interest rate book
//!
//! Holds every configured [`InterestRate`] row and resolves the three rates
//! a new pledge carries. Branch rows win over global rows; among rows of
//! the same scope the latest `effective_from` wins.

use super::InterestError;
use crate::models::rates::{InterestRate, PledgeRates, RateType};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Standard months before the extended tier when the standard row is open-ended
pub const DEFAULT_EXTENDED_AFTER_MONTHS: u32 = 6;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RateBook {
    /// rate id -> row
    rates: BTreeMap<String, InterestRate>,
}

impl RateBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rate row after checking its ranges
    pub fn add(&mut self, rate: InterestRate) -> Result<(), InterestError> {
        if rate.rate_bps < 0 {
            return Err(InterestError::InvalidRate(format!(
                "{}: rate must not be negative",
                rate.name
            )));
        }
        if rate.month_from == 0 || rate.month_to.map_or(false, |to| to < rate.month_from) {
            return Err(InterestError::InvalidRate(format!(
                "{}: month range {}..{:?} is empty",
                rate.name, rate.month_from, rate.month_to
            )));
        }
        if rate.effective_to.map_or(false, |to| to < rate.effective_from) {
            return Err(InterestError::InvalidRate(format!(
                "{}: effective window ends before it starts",
                rate.name
            )));
        }

        self.rates.insert(rate.id.clone(), rate);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&InterestRate> {
        self.rates.get(id)
    }

    pub fn len(&self) -> usize {
        self.rates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rates.is_empty()
    }

    /// Row in force for one type, branch, and date
    pub fn effective(
        &self,
        branch_id: &str,
        rate_type: RateType,
        as_of: NaiveDate,
    ) -> Option<&InterestRate> {
        self.rates
            .values()
            .filter(|r| r.rate_type == rate_type && r.is_effective_on(as_of))
            .filter(|r| r.branch_id.as_deref().map_or(true, |b| b == branch_id))
            .max_by(|a, b| {
                let scope = |r: &InterestRate| r.branch_id.is_some();
                scope(a)
                    .cmp(&scope(b))
                    .then(a.effective_from.cmp(&b.effective_from))
                    .then(b.id.cmp(&a.id))
            })
    }

    /// Resolve the rates a pledge created on `as_of` at `branch_id` carries
    ///
    /// Standard and extended rows are required; the overdue tier is optional.
    pub fn resolve(&self, branch_id: &str, as_of: NaiveDate) -> Result<PledgeRates, InterestError> {
        let missing = |rate_type: RateType| InterestError::MissingRate {
            branch_id: branch_id.to_string(),
            rate_type,
        };

        let standard = self
            .effective(branch_id, RateType::Standard, as_of)
            .ok_or_else(|| missing(RateType::Standard))?;
        let extended = self
            .effective(branch_id, RateType::Extended, as_of)
            .ok_or_else(|| missing(RateType::Extended))?;
        let overdue = self.effective(branch_id, RateType::Overdue, as_of);

        Ok(PledgeRates {
            standard_bps: standard.rate_bps,
            extended_bps: extended.rate_bps,
            overdue_bps: overdue.map(|r| r.rate_bps),
            extended_after_months: standard.month_to.unwrap_or(DEFAULT_EXTENDED_AFTER_MONTHS),
        })
    }
}
