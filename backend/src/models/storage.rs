//! Physical storage: vault -> box -> slot
//!
//! Strict containment: a vault holds boxes, a box holds slots, and a slot
//! holds at most one item. `Slot::current_item_id` is a weak reference;
//! the slot does not own the item.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vault {
    pub id: String,
    pub branch_id: String,
    pub code: String,
    pub name: String,
    pub is_active: bool,
}

/// A box inside a vault
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageBox {
    pub id: String,
    pub vault_id: String,
    pub code: String,
    pub total_slots: u32,
    /// Must always equal the number of occupied child slots
    pub occupied_slots: u32,
    pub is_active: bool,
}

impl StorageBox {
    pub fn available_slots(&self) -> u32 {
        self.total_slots.saturating_sub(self.occupied_slots)
    }
}

/// The smallest storage unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    pub id: String,
    pub box_id: String,
    pub vault_id: String,
    /// Position within the box (1-indexed)
    pub slot_number: u32,
    pub code: String,
    pub is_active: bool,
    pub is_occupied: bool,
    pub current_item_id: Option<String>,
}

impl Slot {
    pub fn is_free(&self) -> bool {
        !self.is_occupied
    }

    pub fn holds(&self, item_id: &str) -> bool {
        self.is_occupied && self.current_item_id.as_deref() == Some(item_id)
    }
}

/// Kind of location change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationAction {
    Stored,
    Moved,
    Released,
}

impl LocationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationAction::Stored => "stored",
            LocationAction::Moved => "moved",
            LocationAction::Released => "released",
        }
    }
}

/// Append-only location ledger row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLocationHistory {
    /// Monotonic position in the ledger
    pub seq: u64,
    pub item_id: String,
    pub action: LocationAction,
    pub from_slot_id: Option<String>,
    pub to_slot_id: Option<String>,
    pub reason: Option<String>,
    pub performed_by: String,
    pub performed_on: NaiveDate,
}
