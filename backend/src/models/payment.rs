//! Cash / transfer split of a payment or payout

use serde::{Deserialize, Serialize};

/// How an amount was settled across cash and bank transfer (i64 minor units)
///
/// # Example
/// ```
/// use pawnshop_core_rs::models::PaymentSplit;
///
/// let split = PaymentSplit::new(10_000, 4_500);
/// assert_eq!(split.total(), 14_500);
/// assert!(split.covers(14_500));
/// assert!(!PaymentSplit::cash(14_000).covers(14_500));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PaymentSplit {
    pub cash: i64,
    pub transfer: i64,
}

impl PaymentSplit {
    pub fn new(cash: i64, transfer: i64) -> Self {
        Self { cash, transfer }
    }

    pub fn cash(amount: i64) -> Self {
        Self::new(amount, 0)
    }

    pub fn transfer(amount: i64) -> Self {
        Self::new(0, amount)
    }

    pub fn total(&self) -> i64 {
        self.cash + self.transfer
    }

    /// Non-negative parts summing exactly to `amount`
    pub fn covers(&self, amount: i64) -> bool {
        self.cash >= 0 && self.transfer >= 0 && self.total() == amount
    }
}
