//! Storage allocator: vault -> box -> slot
//!
//! # Critical Invariants
//!
//! 1. **Slot exclusivity**: a slot holds at most one item, and an item with
//!    a location is the occupant of exactly that slot
//! 2. **Box occupancy**: `StorageBox::occupied_slots` equals the number of
//!    its occupied slots; it is recomputed from the slots after every
//!    change, never incremented blindly
//! 3. **Append-only history**: every assignment, move, and release appends
//!    one [`ItemLocationHistory`] row
//! 4. **No half moves**: `move_item` checks the target before touching
//!    anything, so a failed move leaves the item in its old slot
//!
//! Every operation takes `&mut self` and the affected item; callers
//! serialize access (the engine applies operations to a cloned ledger
//! under its lock and commits only on success).

use crate::models::item::{ItemStatus, PledgeItem, SlotLocation};
use crate::models::storage::{ItemLocationHistory, LocationAction, Slot, StorageBox, Vault};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, error};

/// Errors raised by storage operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Slot {slot_id} is occupied by item {occupant_item_id}")]
    SlotOccupied {
        slot_id: String,
        occupant_item_id: String,
    },

    #[error("Slot not found: {0}")]
    SlotNotFound(String),

    #[error("Item not found: {0}")]
    ItemNotFound(String),

    #[error("Box not found: {0}")]
    BoxNotFound(String),

    #[error("Vault not found: {0}")]
    VaultNotFound(String),

    #[error("Item {item_id} is already stored in slot {slot_id}")]
    ItemAlreadyStored { item_id: String, slot_id: String },

    #[error("Item {item_id} is not in slot {slot_id}")]
    NotInSlot { item_id: String, slot_id: String },

    #[error("Slot {slot_id} belongs to branch {slot_branch}, not {branch_id}")]
    BranchMismatch {
        slot_id: String,
        slot_branch: String,
        branch_id: String,
    },

    #[error("Slot {0} is inactive")]
    SlotInactive(String),

    #[error("Item {item_id} cannot occupy a slot while {status}")]
    ItemNotStorable { item_id: String, status: String },

    #[error("Duplicate code {0}")]
    DuplicateCode(String),

    #[error("Invalid slot count: {0}")]
    InvalidSlotCount(u32),

    #[error("Storage consistency violation: {0}")]
    ConsistencyViolation(String),
}

/// Box whose stored count disagreed with its slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OccupancyDrift {
    pub box_id: String,
    pub recorded: u32,
    pub actual: u32,
}

/// Result of an assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    Assigned,
    /// Item already occupied the slot; nothing changed
    Unchanged,
}

/// All vaults, boxes, slots, and the location ledger
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageState {
    vaults: BTreeMap<String, Vault>,
    boxes: BTreeMap<String, StorageBox>,
    slots: BTreeMap<String, Slot>,
    history: Vec<ItemLocationHistory>,
    /// Drift found by recomputes since the last drain
    #[serde(skip)]
    drift: Vec<OccupancyDrift>,
}

impl StorageState {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Setup
    // ========================================================================

    /// Create a vault; codes are unique within a branch
    pub fn add_vault(&mut self, branch_id: &str, code: &str, name: &str) -> Result<Vault, StorageError> {
        if self
            .vaults
            .values()
            .any(|v| v.branch_id == branch_id && v.code == code)
        {
            return Err(StorageError::DuplicateCode(code.to_string()));
        }

        let vault = Vault {
            id: uuid::Uuid::new_v4().to_string(),
            branch_id: branch_id.to_string(),
            code: code.to_string(),
            name: name.to_string(),
            is_active: true,
        };
        self.vaults.insert(vault.id.clone(), vault.clone());
        Ok(vault)
    }

    /// Create a box with `total_slots` empty slots numbered from 1
    pub fn add_box(&mut self, vault_id: &str, code: &str, total_slots: u32) -> Result<StorageBox, StorageError> {
        if !self.vaults.contains_key(vault_id) {
            return Err(StorageError::VaultNotFound(vault_id.to_string()));
        }
        if total_slots == 0 {
            return Err(StorageError::InvalidSlotCount(total_slots));
        }
        if self
            .boxes
            .values()
            .any(|b| b.vault_id == vault_id && b.code == code)
        {
            return Err(StorageError::DuplicateCode(code.to_string()));
        }

        let storage_box = StorageBox {
            id: uuid::Uuid::new_v4().to_string(),
            vault_id: vault_id.to_string(),
            code: code.to_string(),
            total_slots,
            occupied_slots: 0,
            is_active: true,
        };

        for slot_number in 1..=total_slots {
            let slot = Slot {
                id: uuid::Uuid::new_v4().to_string(),
                box_id: storage_box.id.clone(),
                vault_id: vault_id.to_string(),
                slot_number,
                code: format!("{}-{:02}", code, slot_number),
                is_active: true,
                is_occupied: false,
                current_item_id: None,
            };
            self.slots.insert(slot.id.clone(), slot);
        }

        self.boxes.insert(storage_box.id.clone(), storage_box.clone());
        Ok(storage_box)
    }

    /// Enable or disable a slot; occupied slots cannot be disabled
    pub fn set_slot_active(&mut self, slot_id: &str, active: bool) -> Result<(), StorageError> {
        let slot = self
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| StorageError::SlotNotFound(slot_id.to_string()))?;

        if !active {
            if let Some(occupant) = slot.current_item_id.as_ref().filter(|_| slot.is_occupied) {
                return Err(StorageError::SlotOccupied {
                    slot_id: slot_id.to_string(),
                    occupant_item_id: occupant.clone(),
                });
            }
        }
        slot.is_active = active;
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    pub fn vault(&self, vault_id: &str) -> Option<&Vault> {
        self.vaults.get(vault_id)
    }

    pub fn storage_box(&self, box_id: &str) -> Option<&StorageBox> {
        self.boxes.get(box_id)
    }

    pub fn slot(&self, slot_id: &str) -> Option<&Slot> {
        self.slots.get(slot_id)
    }

    pub fn slots_in_box(&self, box_id: &str) -> Vec<&Slot> {
        self.slots.values().filter(|s| s.box_id == box_id).collect()
    }

    pub fn boxes(&self) -> impl Iterator<Item = &StorageBox> {
        self.boxes.values()
    }

    pub fn slots(&self) -> impl Iterator<Item = &Slot> {
        self.slots.values()
    }

    /// Branch that owns a slot (through its vault)
    pub fn branch_of_slot(&self, slot_id: &str) -> Option<&str> {
        let slot = self.slots.get(slot_id)?;
        self.vaults.get(&slot.vault_id).map(|v| v.branch_id.as_str())
    }

    /// Location ledger rows for one item, oldest first
    pub fn history_for(&self, item_id: &str) -> Vec<&ItemLocationHistory> {
        self.history.iter().filter(|h| h.item_id == item_id).collect()
    }

    pub fn history(&self) -> &[ItemLocationHistory] {
        &self.history
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Put an item into a slot
    ///
    /// Re-assigning an item to the slot it already occupies is a no-op.
    pub fn assign(
        &mut self,
        item: &mut PledgeItem,
        slot_id: &str,
        branch_id: &str,
        performed_by: &str,
        performed_on: NaiveDate,
    ) -> Result<AssignOutcome, StorageError> {
        let slot = self.check_target(item, slot_id, branch_id)?;
        if slot.holds(item.id()) {
            return Ok(AssignOutcome::Unchanged);
        }

        if let Some(current) = item.slot_id() {
            return Err(StorageError::ItemAlreadyStored {
                item_id: item.id().to_string(),
                slot_id: current.to_string(),
            });
        }
        if item.status() != ItemStatus::Stored {
            return Err(StorageError::ItemNotStorable {
                item_id: item.id().to_string(),
                status: item.status().as_str().to_string(),
            });
        }

        let location = self.occupy(item.id(), slot_id)?;
        item.set_location(Some(location));
        self.append_history(item.id(), LocationAction::Stored, None, Some(slot_id), None, performed_by, performed_on);

        debug!(item_id = item.id(), slot_id, "Item assigned to slot");
        Ok(AssignOutcome::Assigned)
    }

    /// Take an item out of its slot
    ///
    /// Returns the freed slot id, or `None` when the item had no slot.
    pub fn release(
        &mut self,
        item: &mut PledgeItem,
        reason: Option<&str>,
        performed_by: &str,
        performed_on: NaiveDate,
    ) -> Result<Option<String>, StorageError> {
        let slot_id = match item.slot_id() {
            Some(slot_id) => slot_id.to_string(),
            None => return Ok(None),
        };

        self.vacate(item.id(), &slot_id)?;
        item.set_location(None);
        self.append_history(item.id(), LocationAction::Released, Some(&slot_id), None, reason, performed_by, performed_on);

        debug!(item_id = item.id(), slot_id = %slot_id, "Item released from slot");
        Ok(Some(slot_id))
    }

    /// Move an item between slots as one step
    #[allow(clippy::too_many_arguments)]
    pub fn move_item(
        &mut self,
        item: &mut PledgeItem,
        from_slot_id: &str,
        to_slot_id: &str,
        branch_id: &str,
        reason: &str,
        performed_by: &str,
        performed_on: NaiveDate,
    ) -> Result<(), StorageError> {
        if item.slot_id() != Some(from_slot_id) {
            return Err(StorageError::NotInSlot {
                item_id: item.id().to_string(),
                slot_id: from_slot_id.to_string(),
            });
        }
        if from_slot_id == to_slot_id {
            return Ok(());
        }

        // Nothing is written until the target is known to accept the item
        self.check_target(item, to_slot_id, branch_id)?;

        self.vacate(item.id(), from_slot_id)?;
        let location = self.occupy(item.id(), to_slot_id)?;
        item.set_location(Some(location));
        self.append_history(
            item.id(),
            LocationAction::Moved,
            Some(from_slot_id),
            Some(to_slot_id),
            Some(reason),
            performed_by,
            performed_on,
        );

        debug!(item_id = item.id(), from_slot_id, to_slot_id, "Item moved");
        Ok(())
    }

    /// Recount a box's occupied slots from its slots
    ///
    /// A disagreement is corrected, logged, and kept for
    /// [`StorageState::take_drift`].
    pub fn recompute_box(&mut self, box_id: &str) -> Result<u32, StorageError> {
        let actual = self
            .slots
            .values()
            .filter(|s| s.box_id == box_id && s.is_occupied)
            .count() as u32;

        let storage_box = self
            .boxes
            .get_mut(box_id)
            .ok_or_else(|| StorageError::BoxNotFound(box_id.to_string()))?;

        if storage_box.occupied_slots != actual {
            error!(
                box_id,
                recorded = storage_box.occupied_slots,
                actual,
                "Box occupancy drift corrected"
            );
            self.drift.push(OccupancyDrift {
                box_id: box_id.to_string(),
                recorded: storage_box.occupied_slots,
                actual,
            });
            storage_box.occupied_slots = actual;
        }
        Ok(actual)
    }

    /// Drain drift recorded by recomputes
    pub fn take_drift(&mut self) -> Vec<OccupancyDrift> {
        std::mem::take(&mut self.drift)
    }

    /// Check every storage invariant against the item table
    pub fn check_consistency(&self, items: &BTreeMap<String, PledgeItem>) -> Result<(), StorageError> {
        let violation = |msg: String| Err(StorageError::ConsistencyViolation(msg));

        for slot in self.slots.values() {
            match (&slot.current_item_id, slot.is_occupied) {
                (Some(item_id), true) => {
                    let Some(item) = items.get(item_id) else {
                        return violation(format!("Slot {} holds unknown item {}", slot.id, item_id));
                    };
                    if item.slot_id() != Some(slot.id.as_str()) {
                        return violation(format!(
                            "Slot {} holds item {} located elsewhere",
                            slot.id, item_id
                        ));
                    }
                }
                (None, false) => {}
                _ => {
                    return violation(format!("Slot {} occupancy flag disagrees with occupant", slot.id));
                }
            }
        }

        for item in items.values() {
            if let Some(slot_id) = item.slot_id() {
                if !item.status().may_occupy_slot() {
                    return violation(format!(
                        "Item {} is {} but still in slot {}",
                        item.id(),
                        item.status().as_str(),
                        slot_id
                    ));
                }
                match self.slots.get(slot_id) {
                    Some(slot) if slot.holds(item.id()) => {}
                    _ => {
                        return violation(format!(
                            "Item {} claims slot {} which does not hold it",
                            item.id(),
                            slot_id
                        ))
                    }
                }
            }
        }

        for storage_box in self.boxes.values() {
            let actual = self
                .slots
                .values()
                .filter(|s| s.box_id == storage_box.id && s.is_occupied)
                .count() as u32;
            if actual != storage_box.occupied_slots {
                return violation(format!(
                    "Box {} records {} occupied slots, found {}",
                    storage_box.id, storage_box.occupied_slots, actual
                ));
            }
        }

        Ok(())
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn check_target(&self, item: &PledgeItem, slot_id: &str, branch_id: &str) -> Result<&Slot, StorageError> {
        let slot = self
            .slots
            .get(slot_id)
            .ok_or_else(|| StorageError::SlotNotFound(slot_id.to_string()))?;

        let slot_branch = self
            .vaults
            .get(&slot.vault_id)
            .map(|v| v.branch_id.as_str())
            .ok_or_else(|| StorageError::VaultNotFound(slot.vault_id.clone()))?;
        if slot_branch != branch_id {
            return Err(StorageError::BranchMismatch {
                slot_id: slot_id.to_string(),
                slot_branch: slot_branch.to_string(),
                branch_id: branch_id.to_string(),
            });
        }

        if slot.holds(item.id()) {
            return Ok(slot);
        }
        if let Some(occupant) = slot.current_item_id.as_ref().filter(|_| slot.is_occupied) {
            return Err(StorageError::SlotOccupied {
                slot_id: slot_id.to_string(),
                occupant_item_id: occupant.clone(),
            });
        }
        if !slot.is_active {
            return Err(StorageError::SlotInactive(slot_id.to_string()));
        }
        if !item.status().may_occupy_slot() {
            return Err(StorageError::ItemNotStorable {
                item_id: item.id().to_string(),
                status: item.status().as_str().to_string(),
            });
        }
        Ok(slot)
    }

    fn occupy(&mut self, item_id: &str, slot_id: &str) -> Result<SlotLocation, StorageError> {
        let slot = self
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| StorageError::SlotNotFound(slot_id.to_string()))?;
        slot.is_occupied = true;
        slot.current_item_id = Some(item_id.to_string());

        let location = SlotLocation {
            vault_id: slot.vault_id.clone(),
            box_id: slot.box_id.clone(),
            slot_id: slot.id.clone(),
        };
        self.recount_box(&location.box_id)?;
        Ok(location)
    }

    fn vacate(&mut self, item_id: &str, slot_id: &str) -> Result<(), StorageError> {
        let slot = self
            .slots
            .get_mut(slot_id)
            .ok_or_else(|| StorageError::SlotNotFound(slot_id.to_string()))?;
        if !slot.holds(item_id) {
            return Err(StorageError::ConsistencyViolation(format!(
                "Item {} points at slot {} which does not hold it",
                item_id, slot_id
            )));
        }
        slot.is_occupied = false;
        slot.current_item_id = None;

        let box_id = slot.box_id.clone();
        self.recount_box(&box_id)?;
        Ok(())
    }

    /// Bring a box's count in line after a slot change made here
    fn recount_box(&mut self, box_id: &str) -> Result<(), StorageError> {
        let actual = self
            .slots
            .values()
            .filter(|s| s.box_id == box_id && s.is_occupied)
            .count() as u32;
        let storage_box = self
            .boxes
            .get_mut(box_id)
            .ok_or_else(|| StorageError::BoxNotFound(box_id.to_string()))?;
        storage_box.occupied_slots = actual;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn append_history(
        &mut self,
        item_id: &str,
        action: LocationAction,
        from_slot_id: Option<&str>,
        to_slot_id: Option<&str>,
        reason: Option<&str>,
        performed_by: &str,
        performed_on: NaiveDate,
    ) {
        self.history.push(ItemLocationHistory {
            seq: self.history.len() as u64 + 1,
            item_id: item_id.to_string(),
            action,
            from_slot_id: from_slot_id.map(str::to_string),
            to_slot_id: to_slot_id.map(str::to_string),
            reason: reason.map(str::to_string),
            performed_by: performed_by.to_string(),
            performed_on,
        });
    }

    /// Overwrite a box's recorded count (drift injection for recovery tests)
    #[cfg(test)]
    pub(crate) fn corrupt_box_count(&mut self, box_id: &str, occupied_slots: u32) {
        if let Some(b) = self.boxes.get_mut(box_id) {
            b.occupied_slots = occupied_slots;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::valuation::ItemValuation;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    fn item() -> PledgeItem {
        let valuation = ItemValuation {
            category: "ring".to_string(),
            purity_code: "916".to_string(),
            gross_weight_mg: 5_000,
            stone_deduction: None,
            deducted_weight_mg: 0,
            net_weight_mg: 5_000,
            price_per_gram: 30_000,
            gross_value: 150_000,
            deduction_amount: 0,
            net_value: 150_000,
        };
        PledgeItem::from_valuation("P1", 1, &valuation, None)
    }

    fn storage() -> (StorageState, StorageBox) {
        let mut storage = StorageState::new();
        let vault = storage.add_vault("BR1", "V1", "Main vault").unwrap();
        let storage_box = storage.add_box(&vault.id, "B1", 3).unwrap();
        (storage, storage_box)
    }

    fn slot_ids(storage: &StorageState, box_id: &str) -> Vec<String> {
        let mut slots = storage.slots_in_box(box_id);
        slots.sort_by_key(|s| s.slot_number);
        slots.into_iter().map(|s| s.id.clone()).collect()
    }

    #[test]
    fn test_add_box_creates_numbered_slots() {
        let (storage, storage_box) = storage();
        let mut codes: Vec<_> = storage
            .slots_in_box(&storage_box.id)
            .iter()
            .map(|s| s.code.clone())
            .collect();
        codes.sort();
        assert_eq!(codes, vec!["B1-01", "B1-02", "B1-03"]);
        assert_eq!(storage_box.available_slots(), 3);
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let (mut storage, storage_box) = storage();
        assert_eq!(
            storage.add_vault("BR1", "V1", "Again"),
            Err(StorageError::DuplicateCode("V1".to_string()))
        );
        assert!(storage.add_vault("BR2", "V1", "Other branch").is_ok());
        assert_eq!(
            storage.add_box(&storage_box.vault_id, "B1", 2),
            Err(StorageError::DuplicateCode("B1".to_string()))
        );
        assert_eq!(
            storage.add_box(&storage_box.vault_id, "B2", 0),
            Err(StorageError::InvalidSlotCount(0))
        );
    }

    #[test]
    fn test_assign_is_idempotent_for_same_item() {
        let (mut storage, storage_box) = storage();
        let slots = slot_ids(&storage, &storage_box.id);
        let mut item = item();

        assert_eq!(
            storage.assign(&mut item, &slots[0], "BR1", "U1", d(1)).unwrap(),
            AssignOutcome::Assigned
        );
        assert_eq!(
            storage.assign(&mut item, &slots[0], "BR1", "U1", d(1)).unwrap(),
            AssignOutcome::Unchanged
        );
        assert_eq!(storage.history().len(), 1);
        assert_eq!(storage.storage_box(&storage_box.id).unwrap().occupied_slots, 1);
    }

    #[test]
    fn test_assign_rejects_branch_mismatch_and_inactive_slot() {
        let (mut storage, storage_box) = storage();
        let slots = slot_ids(&storage, &storage_box.id);
        let mut item = item();

        assert!(matches!(
            storage.assign(&mut item, &slots[0], "BR2", "U1", d(1)),
            Err(StorageError::BranchMismatch { .. })
        ));

        storage.set_slot_active(&slots[1], false).unwrap();
        assert_eq!(
            storage.assign(&mut item, &slots[1], "BR1", "U1", d(1)),
            Err(StorageError::SlotInactive(slots[1].clone()))
        );
        assert!(item.location().is_none());
    }

    #[test]
    fn test_release_unassigned_item_is_noop() {
        let (mut storage, _) = storage();
        let mut item = item();
        assert_eq!(storage.release(&mut item, None, "U1", d(1)).unwrap(), None);
        assert!(storage.history().is_empty());
    }

    #[test]
    fn test_move_writes_single_history_row() {
        let (mut storage, storage_box) = storage();
        let slots = slot_ids(&storage, &storage_box.id);
        let mut item = item();

        storage.assign(&mut item, &slots[0], "BR1", "U1", d(1)).unwrap();
        storage
            .move_item(&mut item, &slots[0], &slots[2], "BR1", "rebalance", "U1", d(2))
            .unwrap();

        assert_eq!(item.slot_id(), Some(slots[2].as_str()));
        assert!(storage.slot(&slots[0]).unwrap().is_free());
        let history = storage.history_for(item.id());
        assert_eq!(history.len(), 2);
        assert_eq!(history[1].action, LocationAction::Moved);
        assert_eq!(history[1].from_slot_id.as_deref(), Some(slots[0].as_str()));
        assert_eq!(history[1].reason.as_deref(), Some("rebalance"));
        assert!(storage.check_consistency(&BTreeMap::from([(item.id().to_string(), item.clone())])).is_ok());
    }

    #[test]
    fn test_move_from_wrong_slot_rejected() {
        let (mut storage, storage_box) = storage();
        let slots = slot_ids(&storage, &storage_box.id);
        let mut item = item();
        storage.assign(&mut item, &slots[0], "BR1", "U1", d(1)).unwrap();

        assert!(matches!(
            storage.move_item(&mut item, &slots[1], &slots[2], "BR1", "x", "U1", d(2)),
            Err(StorageError::NotInSlot { .. })
        ));
    }

    #[test]
    fn test_cannot_disable_occupied_slot() {
        let (mut storage, storage_box) = storage();
        let slots = slot_ids(&storage, &storage_box.id);
        let mut item = item();
        storage.assign(&mut item, &slots[0], "BR1", "U1", d(1)).unwrap();

        assert!(matches!(
            storage.set_slot_active(&slots[0], false),
            Err(StorageError::SlotOccupied { .. })
        ));
    }

    #[test]
    fn test_recompute_heals_and_reports_drift() {
        let (mut storage, storage_box) = storage();
        let slots = slot_ids(&storage, &storage_box.id);
        let mut item = item();
        storage.assign(&mut item, &slots[0], "BR1", "U1", d(1)).unwrap();

        storage.corrupt_box_count(&storage_box.id, 3);
        assert_eq!(storage.recompute_box(&storage_box.id).unwrap(), 1);

        let drift = storage.take_drift();
        assert_eq!(
            drift,
            vec![OccupancyDrift {
                box_id: storage_box.id.clone(),
                recorded: 3,
                actual: 1
            }]
        );
        assert!(storage.take_drift().is_empty());
    }

    #[test]
    fn test_normal_changes_record_no_drift() {
        let (mut storage, storage_box) = storage();
        let slots = slot_ids(&storage, &storage_box.id);
        let mut item = item();

        storage.assign(&mut item, &slots[0], "BR1", "U1", d(1)).unwrap();
        storage.move_item(&mut item, &slots[0], &slots[1], "BR1", "reshelve", "U1", d(2)).unwrap();
        storage.release(&mut item, None, "U1", d(3)).unwrap();

        assert!(storage.take_drift().is_empty());
        assert_eq!(storage.storage_box(&storage_box.id).unwrap().occupied_slots, 0);
    }
}
