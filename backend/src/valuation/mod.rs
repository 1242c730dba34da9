//! Collateral valuation
//!
//! Turns item inputs plus a gold-price snapshot into per-item values and
//! pledge-level totals. Pure functions: no clock, no randomness, no state.
//!
//! # Deduction rules
//!
//! - `Percentage` and `Grams` reduce the **weight** before pricing
//! - `Amount` reduces the **value** after pricing; weight is untouched
//!
//! # Rounding
//!
//! Each scaled product is rounded half-up once. The loan amount is derived
//! from the summed pledge net value, never summed per item.

use crate::core::money::{apply_bps, value_of_weight, BPS_SCALE};
use crate::models::gold_price::GoldPriceSnapshot;
use crate::models::item::StoneDeduction;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that reject a valuation request before any mutation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValuationError {
    #[error("At least one item is required")]
    NoItems,

    #[error("Invalid weight on item {index}: gross {gross_weight_mg} mg, net {net_weight_mg} mg")]
    InvalidWeight {
        index: usize,
        gross_weight_mg: i64,
        net_weight_mg: i64,
    },

    #[error("No gold price for purity {0}")]
    UnknownPurity(String),

    #[error("Invalid stone deduction on item {index}: {reason}")]
    InvalidDeduction { index: usize, reason: String },

    #[error("Deduction on item {index} exceeds its value: gross {gross_value}, deduction {deduction_amount}")]
    DeductionExceedsValue {
        index: usize,
        gross_value: i64,
        deduction_amount: i64,
    },

    #[error("Invalid loan percentage: {0} bps")]
    InvalidLoanPercentage(i64),

    #[error("Value of item {index} is out of range: {net_weight_mg} mg at {price_per_gram}/g")]
    ValueOutOfRange {
        index: usize,
        net_weight_mg: i64,
        price_per_gram: i64,
    },

    #[error("Pledge totals are out of range")]
    TotalOutOfRange,
}

/// One item as presented at the counter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemInput {
    pub category: String,
    pub purity_code: String,
    pub gross_weight_mg: i64,
    pub stone_deduction: Option<StoneDeduction>,
    pub description: Option<String>,
}

impl ItemInput {
    pub fn new(category: &str, purity_code: &str, gross_weight_mg: i64) -> Self {
        Self {
            category: category.to_string(),
            purity_code: purity_code.to_string(),
            gross_weight_mg,
            stone_deduction: None,
            description: None,
        }
    }

    /// Attach a stone deduction (builder pattern)
    pub fn with_deduction(mut self, deduction: StoneDeduction) -> Self {
        self.stone_deduction = Some(deduction);
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

/// Valuation of a single item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemValuation {
    pub category: String,
    pub purity_code: String,
    pub gross_weight_mg: i64,
    pub stone_deduction: Option<StoneDeduction>,
    /// Weight removed by a percentage/grams deduction
    pub deducted_weight_mg: i64,
    pub net_weight_mg: i64,
    pub price_per_gram: i64,
    /// net_weight x price_per_gram
    pub gross_value: i64,
    /// Value removed by an amount deduction
    pub deduction_amount: i64,
    pub net_value: i64,
}

/// Valuation of a whole pledge
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PledgeValuation {
    pub items: Vec<ItemValuation>,
    pub total_gross_weight_mg: i64,
    pub total_weight_mg: i64,
    pub gross_value: i64,
    pub total_deduction: i64,
    pub net_value: i64,
}

/// Value one item
///
/// `index` is only used to point errors at the offending input line.
pub fn value_item(
    index: usize,
    input: &ItemInput,
    prices: &GoldPriceSnapshot,
) -> Result<ItemValuation, ValuationError> {
    if input.gross_weight_mg <= 0 {
        return Err(ValuationError::InvalidWeight {
            index,
            gross_weight_mg: input.gross_weight_mg,
            net_weight_mg: input.gross_weight_mg,
        });
    }

    let price_per_gram = prices
        .price_for(&input.purity_code)
        .ok_or_else(|| ValuationError::UnknownPurity(input.purity_code.clone()))?;

    let invalid = |reason: &str| ValuationError::InvalidDeduction {
        index,
        reason: reason.to_string(),
    };

    let (deducted_weight_mg, deduction_amount) = match input.stone_deduction {
        None => (0, 0),
        Some(StoneDeduction::Percentage { bps }) => {
            if !(0..=BPS_SCALE).contains(&bps) {
                return Err(invalid("percentage must be between 0 and 100"));
            }
            (apply_bps(input.gross_weight_mg, bps), 0)
        }
        Some(StoneDeduction::Grams { milligrams }) => {
            if milligrams < 0 {
                return Err(invalid("weight must not be negative"));
            }
            (milligrams, 0)
        }
        Some(StoneDeduction::Amount { amount }) => {
            if amount < 0 {
                return Err(invalid("amount must not be negative"));
            }
            (0, amount)
        }
    };

    let net_weight_mg = input.gross_weight_mg - deducted_weight_mg;
    if net_weight_mg < 0 {
        return Err(ValuationError::InvalidWeight {
            index,
            gross_weight_mg: input.gross_weight_mg,
            net_weight_mg,
        });
    }

    let gross_value = value_of_weight(net_weight_mg, price_per_gram).ok_or(ValuationError::ValueOutOfRange {
        index,
        net_weight_mg,
        price_per_gram,
    })?;
    if deduction_amount > gross_value {
        return Err(ValuationError::DeductionExceedsValue {
            index,
            gross_value,
            deduction_amount,
        });
    }

    Ok(ItemValuation {
        category: input.category.clone(),
        purity_code: input.purity_code.clone(),
        gross_weight_mg: input.gross_weight_mg,
        stone_deduction: input.stone_deduction,
        deducted_weight_mg,
        net_weight_mg,
        price_per_gram,
        gross_value,
        deduction_amount,
        net_value: gross_value - deduction_amount,
    })
}

/// Value every item and sum the pledge totals
///
/// # Example
///
/// ```rust
/// use chrono::NaiveDate;
/// use pawnshop_core_rs::models::{GoldPriceSnapshot, PriceSource, StoneDeduction};
/// use pawnshop_core_rs::valuation::{value_items, ItemInput};
///
/// let prices = GoldPriceSnapshot::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), PriceSource::Manual)
///     .with_price("916", 30_000);
///
/// let items = vec![
///     ItemInput::new("ring", "916", 10_000),
///     ItemInput::new("chain", "916", 20_000)
///         .with_deduction(StoneDeduction::Grams { milligrams: 2_000 }),
/// ];
///
/// let valuation = value_items(&items, &prices).unwrap();
/// assert_eq!(valuation.total_weight_mg, 28_000);
/// assert_eq!(valuation.net_value, 840_000); // 28 g at 300.00/g
/// ```
pub fn value_items(
    inputs: &[ItemInput],
    prices: &GoldPriceSnapshot,
) -> Result<PledgeValuation, ValuationError> {
    if inputs.is_empty() {
        return Err(ValuationError::NoItems);
    }

    let items = inputs
        .iter()
        .enumerate()
        .map(|(index, input)| value_item(index, input, prices))
        .collect::<Result<Vec<_>, _>>()?;

    let total_gross_weight_mg = checked_total(items.iter().map(|i| i.gross_weight_mg))?;
    let total_weight_mg = checked_total(items.iter().map(|i| i.net_weight_mg))?;
    let gross_value = checked_total(items.iter().map(|i| i.gross_value))?;
    let total_deduction = checked_total(items.iter().map(|i| i.deduction_amount))?;

    Ok(PledgeValuation {
        items,
        total_gross_weight_mg,
        total_weight_mg,
        gross_value,
        total_deduction,
        net_value: gross_value - total_deduction,
    })
}

fn checked_total(mut values: impl Iterator<Item = i64>) -> Result<i64, ValuationError> {
    values
        .try_fold(0i64, |acc, v| acc.checked_add(v))
        .ok_or(ValuationError::TotalOutOfRange)
}

/// Loan amount for a net value at a loan-to-value percentage
///
/// `loan_percentage_bps` must be in `1..=max_bps`.
pub fn loan_amount(
    net_value: i64,
    loan_percentage_bps: i64,
    max_bps: i64,
) -> Result<i64, ValuationError> {
    if loan_percentage_bps <= 0 || loan_percentage_bps > max_bps.min(BPS_SCALE) {
        return Err(ValuationError::InvalidLoanPercentage(loan_percentage_bps));
    }
    Ok(apply_bps(net_value, loan_percentage_bps))
}
