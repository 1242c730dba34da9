//! Engine configuration
//!
//! Branch-wide business parameters. All money values are i64 minor units,
//! percentages are basis points.

use crate::core::calendar::MonthRounding;
use crate::core::money::BPS_SCALE;
use crate::error::EngineError;
use crate::orchestrator::checkpoint::compute_config_hash;
use serde::{Deserialize, Serialize};

/// Complete engine configuration
///
/// Missing JSON fields take their defaults; unknown fields are rejected.
///
/// # Example
///
/// ```rust
/// use pawnshop_core_rs::orchestrator::EngineConfig;
///
/// let config = EngineConfig::from_json_str(r#"{ "grace_period_days": 14 }"#).unwrap();
/// assert_eq!(config.grace_period_days, 14);
/// assert_eq!(config.default_loan_percentage_bps, 7_500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Loan-to-value applied when a request does not override it
    pub default_loan_percentage_bps: i64,

    /// Upper bound for overrides
    pub max_loan_percentage_bps: i64,

    /// Months from pledge date to due date
    pub default_term_months: u32,

    /// Days from due date to grace end
    pub grace_period_days: u32,

    /// Deducted from the payout at creation
    pub pledge_handling_fee: i64,

    /// Added to the renewal payable
    pub renewal_handling_fee: i64,

    /// Added to the redemption payable
    pub redemption_handling_fee: i64,

    /// Partial-month rule for interest
    pub month_rounding: MonthRounding,

    /// Collisions skipped before a document number request fails
    pub sequence_max_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_loan_percentage_bps: 7_500,
            max_loan_percentage_bps: 9_000,
            default_term_months: 6,
            grace_period_days: 30,
            pledge_handling_fee: 0,
            renewal_handling_fee: 0,
            redemption_handling_fee: 0,
            month_rounding: MonthRounding::Floor,
            sequence_max_retries: 5,
        }
    }
}

impl EngineConfig {
    /// Parse and validate a JSON config
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| EngineError::InvalidConfig(format!("Config parse failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        let invalid = |msg: String| Err(EngineError::InvalidConfig(msg));

        if self.max_loan_percentage_bps <= 0 || self.max_loan_percentage_bps > BPS_SCALE {
            return invalid(format!(
                "max_loan_percentage_bps must be in 1..={}, got {}",
                BPS_SCALE, self.max_loan_percentage_bps
            ));
        }
        if self.default_loan_percentage_bps <= 0
            || self.default_loan_percentage_bps > self.max_loan_percentage_bps
        {
            return invalid(format!(
                "default_loan_percentage_bps must be in 1..={}, got {}",
                self.max_loan_percentage_bps, self.default_loan_percentage_bps
            ));
        }
        if self.default_term_months == 0 {
            return invalid("default_term_months must be at least 1".to_string());
        }
        for (name, fee) in [
            ("pledge_handling_fee", self.pledge_handling_fee),
            ("renewal_handling_fee", self.renewal_handling_fee),
            ("redemption_handling_fee", self.redemption_handling_fee),
        ] {
            if fee < 0 {
                return invalid(format!("{} must not be negative, got {}", name, fee));
            }
        }
        Ok(())
    }

    /// SHA-256 fingerprint of the canonical JSON form
    pub fn config_hash(&self) -> Result<String, EngineError> {
        compute_config_hash(self)
    }
}
