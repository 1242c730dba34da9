//! Pledged item model
//!
//! Each item belongs to exactly one pledge and carries its own valuation
//! snapshot (price per gram, weights, values) taken at pledge creation.
//!
//! CRITICAL: Money is i64 minor units, weight is i64 milligrams

use crate::valuation::ItemValuation;
use serde::{Deserialize, Serialize};

/// Stone (non-gold) deduction on an item
///
/// Weight-type deductions reduce the weight before pricing; the amount
/// type reduces the value after pricing and leaves the weight untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoneDeduction {
    /// Share of gross weight, in basis points
    Percentage { bps: i64 },
    /// Currency amount subtracted from the item value
    Amount { amount: i64 },
    /// Weight subtracted directly, in milligrams
    Grams { milligrams: i64 },
}

impl StoneDeduction {
    pub fn kind(&self) -> &'static str {
        match self {
            StoneDeduction::Percentage { .. } => "percentage",
            StoneDeduction::Amount { .. } => "amount",
            StoneDeduction::Grams { .. } => "grams",
        }
    }
}

/// Item status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    /// In the vault, securing the loan
    Stored,
    /// Redeemed and handed back to the customer
    Released,
    /// Redeemed (paid) but still in its slot awaiting hand-over
    Redeemed,
    /// Sold at auction
    Auctioned,
    /// Pledge cancelled
    Cancelled,
}

impl ItemStatus {
    /// No longer securing the loan
    pub fn is_closed(&self) -> bool {
        !matches!(self, ItemStatus::Stored)
    }

    /// May still occupy a physical slot
    pub fn may_occupy_slot(&self) -> bool {
        matches!(self, ItemStatus::Stored | ItemStatus::Redeemed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Stored => "stored",
            ItemStatus::Released => "released",
            ItemStatus::Redeemed => "redeemed",
            ItemStatus::Auctioned => "auctioned",
            ItemStatus::Cancelled => "cancelled",
        }
    }
}

/// Physical location: vault -> box -> slot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotLocation {
    pub vault_id: String,
    pub box_id: String,
    pub slot_id: String,
}

/// A pledged item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PledgeItem {
    id: String,
    pledge_id: String,
    /// Position within the pledge (1-indexed)
    line_no: u32,
    category: String,
    description: Option<String>,
    purity_code: String,
    gross_weight_mg: i64,
    stone_deduction: Option<StoneDeduction>,
    /// Weight removed by percentage/grams deductions
    deducted_weight_mg: i64,
    net_weight_mg: i64,
    /// Purity price snapshot (i64 minor units per gram)
    price_per_gram: i64,
    gross_value: i64,
    /// Value removed by an amount-type deduction
    deduction_amount: i64,
    net_value: i64,
    location: Option<SlotLocation>,
    status: ItemStatus,
    /// Redemption that closed this item, if any
    redemption_id: Option<String>,
}

impl PledgeItem {
    /// Create a stored, unlocated item from its valuation
    pub fn from_valuation(
        pledge_id: &str,
        line_no: u32,
        valuation: &ItemValuation,
        description: Option<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            pledge_id: pledge_id.to_string(),
            line_no,
            category: valuation.category.clone(),
            description,
            purity_code: valuation.purity_code.clone(),
            gross_weight_mg: valuation.gross_weight_mg,
            stone_deduction: valuation.stone_deduction,
            deducted_weight_mg: valuation.deducted_weight_mg,
            net_weight_mg: valuation.net_weight_mg,
            price_per_gram: valuation.price_per_gram,
            gross_value: valuation.gross_value,
            deduction_amount: valuation.deduction_amount,
            net_value: valuation.net_value,
            location: None,
            status: ItemStatus::Stored,
            redemption_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pledge_id(&self) -> &str {
        &self.pledge_id
    }

    pub fn line_no(&self) -> u32 {
        self.line_no
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn purity_code(&self) -> &str {
        &self.purity_code
    }

    pub fn gross_weight_mg(&self) -> i64 {
        self.gross_weight_mg
    }

    pub fn stone_deduction(&self) -> Option<StoneDeduction> {
        self.stone_deduction
    }

    pub fn deducted_weight_mg(&self) -> i64 {
        self.deducted_weight_mg
    }

    pub fn net_weight_mg(&self) -> i64 {
        self.net_weight_mg
    }

    pub fn price_per_gram(&self) -> i64 {
        self.price_per_gram
    }

    pub fn gross_value(&self) -> i64 {
        self.gross_value
    }

    pub fn deduction_amount(&self) -> i64 {
        self.deduction_amount
    }

    pub fn net_value(&self) -> i64 {
        self.net_value
    }

    pub fn location(&self) -> Option<&SlotLocation> {
        self.location.as_ref()
    }

    pub fn slot_id(&self) -> Option<&str> {
        self.location.as_ref().map(|l| l.slot_id.as_str())
    }

    pub fn status(&self) -> ItemStatus {
        self.status
    }

    pub fn redemption_id(&self) -> Option<&str> {
        self.redemption_id.as_deref()
    }

    pub fn is_stored(&self) -> bool {
        self.status == ItemStatus::Stored
    }

    pub(crate) fn set_location(&mut self, location: Option<SlotLocation>) {
        self.location = location;
    }

    pub(crate) fn set_status(&mut self, status: ItemStatus) {
        self.status = status;
    }

    pub(crate) fn link_redemption(&mut self, redemption_id: &str) {
        self.redemption_id = Some(redemption_id.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_statuses() {
        assert!(!ItemStatus::Stored.is_closed());
        assert!(ItemStatus::Released.is_closed());
        assert!(ItemStatus::Redeemed.is_closed());
        assert!(ItemStatus::Auctioned.is_closed());
        assert!(ItemStatus::Cancelled.is_closed());
    }

    #[test]
    fn test_only_stored_or_awaiting_handover_may_occupy() {
        assert!(ItemStatus::Stored.may_occupy_slot());
        assert!(ItemStatus::Redeemed.may_occupy_slot());
        assert!(!ItemStatus::Released.may_occupy_slot());
        assert!(!ItemStatus::Auctioned.may_occupy_slot());
        assert!(!ItemStatus::Cancelled.may_occupy_slot());
    }

    #[test]
    fn test_stone_deduction_serde_tag() {
        let json = serde_json::to_string(&StoneDeduction::Grams { milligrams: 500 }).unwrap();
        assert_eq!(json, r#"{"type":"grams","milligrams":500}"#);
    }
}
