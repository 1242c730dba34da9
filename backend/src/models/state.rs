//! Ledger State
//!
//! Represents the complete state of one pawnshop ledger: pledges and
//! their items, renewal/redemption/auction records, physical storage,
//! document counters, rate and price books, and day-end reports.
//!
//! # Critical Invariants
//!
//! 1. **Item ownership**: every item belongs to exactly one pledge and is
//!    listed in that pledge's `item_ids`
//! 2. **Status consistency**: no item is `stored` once its pledge is
//!    redeemed, auctioned, or cancelled
//! 3. **Closure**: a pledge is `redeemed` exactly when none of its items is
//!    `stored` and at least one was redeemed
//! 4. **Storage**: see [`crate::storage`]
//!
//! The engine mutates a clone of this struct and swaps it in only after
//! [`LedgerState::check_consistency`] passes.

use crate::day_end::DayEndBook;
use crate::interest::RateBook;
use crate::models::gold_price::GoldPriceBook;
use crate::models::item::{ItemStatus, PledgeItem};
use crate::models::pledge::{Pledge, PledgeStatus};
use crate::models::renewal::{AuctionItem, Redemption, Renewal};
use crate::sequence::SequenceGenerator;
use crate::storage::StorageState;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Complete ledger state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerState {
    pub(crate) pledges: BTreeMap<String, Pledge>,
    pub(crate) items: BTreeMap<String, PledgeItem>,
    pub(crate) renewals: BTreeMap<String, Renewal>,
    pub(crate) redemptions: BTreeMap<String, Redemption>,
    pub(crate) auction_items: BTreeMap<String, AuctionItem>,
    pub(crate) storage: StorageState,
    pub(crate) sequences: SequenceGenerator,
    pub(crate) rates: RateBook,
    pub(crate) gold_prices: GoldPriceBook,
    pub(crate) day_ends: DayEndBook,
}

impl LedgerState {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Read access
    // ========================================================================

    pub fn pledge(&self, pledge_id: &str) -> Option<&Pledge> {
        self.pledges.get(pledge_id)
    }

    pub fn pledges(&self) -> impl Iterator<Item = &Pledge> {
        self.pledges.values()
    }

    pub fn item(&self, item_id: &str) -> Option<&PledgeItem> {
        self.items.get(item_id)
    }

    pub fn items(&self) -> &BTreeMap<String, PledgeItem> {
        &self.items
    }

    /// Items of a pledge in line order
    pub fn items_of(&self, pledge_id: &str) -> Vec<&PledgeItem> {
        self.pledges
            .get(pledge_id)
            .map(|p| p.item_ids().iter().filter_map(|id| self.items.get(id)).collect())
            .unwrap_or_default()
    }

    pub fn renewal(&self, renewal_id: &str) -> Option<&Renewal> {
        self.renewals.get(renewal_id)
    }

    pub fn renewals(&self) -> impl Iterator<Item = &Renewal> {
        self.renewals.values()
    }

    /// Renewals of a pledge, oldest first
    pub fn renewals_of(&self, pledge_id: &str) -> Vec<&Renewal> {
        let mut renewals: Vec<_> = self
            .renewals
            .values()
            .filter(|r| r.pledge_id == pledge_id)
            .collect();
        renewals.sort_by_key(|r| r.renewal_count);
        renewals
    }

    pub fn redemption(&self, redemption_id: &str) -> Option<&Redemption> {
        self.redemptions.get(redemption_id)
    }

    pub fn redemptions(&self) -> impl Iterator<Item = &Redemption> {
        self.redemptions.values()
    }

    /// Redemptions of a pledge, oldest first
    pub fn redemptions_of(&self, pledge_id: &str) -> Vec<&Redemption> {
        let mut redemptions: Vec<_> = self
            .redemptions
            .values()
            .filter(|r| r.pledge_id == pledge_id)
            .collect();
        redemptions.sort_by(|a, b| {
            a.redemption_date
                .cmp(&b.redemption_date)
                .then(a.redemption_no.cmp(&b.redemption_no))
        });
        redemptions
    }

    pub fn auction_item(&self, auction_item_id: &str) -> Option<&AuctionItem> {
        self.auction_items.get(auction_item_id)
    }

    pub fn auction_items(&self) -> impl Iterator<Item = &AuctionItem> {
        self.auction_items.values()
    }

    pub fn storage(&self) -> &StorageState {
        &self.storage
    }

    pub fn sequences(&self) -> &SequenceGenerator {
        &self.sequences
    }

    pub fn rates(&self) -> &RateBook {
        &self.rates
    }

    pub fn gold_prices(&self) -> &GoldPriceBook {
        &self.gold_prices
    }

    pub fn day_ends(&self) -> &DayEndBook {
        &self.day_ends
    }

    pub fn num_pledges(&self) -> usize {
        self.pledges.len()
    }

    // ========================================================================
    // Invariants
    // ========================================================================

    /// Check pledge/item consistency and every storage invariant
    pub fn check_consistency(&self) -> Result<(), String> {
        for pledge in self.pledges.values() {
            if pledge.item_ids().is_empty() {
                return Err(format!("Pledge {} has no items", pledge.id()));
            }

            let mut any_stored = false;
            let mut any_redeemed = false;
            for item_id in pledge.item_ids() {
                let item = self
                    .items
                    .get(item_id)
                    .ok_or_else(|| format!("Pledge {} lists unknown item {}", pledge.id(), item_id))?;
                if item.pledge_id() != pledge.id() {
                    return Err(format!(
                        "Item {} listed by pledge {} belongs to {}",
                        item_id,
                        pledge.id(),
                        item.pledge_id()
                    ));
                }
                check_item_status(pledge.status(), item.status()).map_err(|allowed| {
                    format!(
                        "Item {} is {} while pledge {} is {} (allowed: {})",
                        item_id,
                        item.status().as_str(),
                        pledge.id(),
                        pledge.status(),
                        allowed
                    )
                })?;
                any_stored |= item.status() == ItemStatus::Stored;
                any_redeemed |= matches!(item.status(), ItemStatus::Redeemed | ItemStatus::Released);
            }

            let should_be_redeemed = !any_stored && any_redeemed && pledge.status() != PledgeStatus::Auctioned;
            if should_be_redeemed != (pledge.status() == PledgeStatus::Redeemed) {
                return Err(format!(
                    "Pledge {} is {} but its items say otherwise",
                    pledge.id(),
                    pledge.status()
                ));
            }
            if pledge.outstanding_principal() < 0 {
                return Err(format!("Pledge {} has negative principal", pledge.id()));
            }
        }

        for item in self.items.values() {
            if !self.pledges.contains_key(item.pledge_id()) {
                return Err(format!("Item {} belongs to unknown pledge {}", item.id(), item.pledge_id()));
            }
        }

        self.storage
            .check_consistency(&self.items)
            .map_err(|e| e.to_string())?;

        self.sequences.check_counters()
    }
}

/// Item statuses allowed under each pledge status
///
/// Returns a description of the allowed set on mismatch.
fn check_item_status(pledge: PledgeStatus, item: ItemStatus) -> Result<(), &'static str> {
    use ItemStatus as I;
    use PledgeStatus as P;

    let ok = match pledge {
        // Partial redemptions leave some items closed while the loan runs
        P::Active | P::Renewed | P::Overdue => matches!(item, I::Stored | I::Redeemed | I::Released),
        P::Forfeited => matches!(item, I::Stored | I::Redeemed | I::Released | I::Auctioned),
        P::Redeemed => matches!(item, I::Redeemed | I::Released),
        P::Auctioned => matches!(item, I::Redeemed | I::Released | I::Auctioned),
        P::Cancelled => matches!(item, I::Cancelled),
    };

    if ok {
        Ok(())
    } else {
        Err(match pledge {
            P::Active | P::Renewed | P::Overdue => "stored, redeemed, released",
            P::Forfeited => "stored, redeemed, released, auctioned",
            P::Redeemed => "redeemed, released",
            P::Auctioned => "redeemed, released, auctioned",
            P::Cancelled => "cancelled",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_status_table() {
        assert!(check_item_status(PledgeStatus::Active, ItemStatus::Stored).is_ok());
        assert!(check_item_status(PledgeStatus::Redeemed, ItemStatus::Stored).is_err());
        assert!(check_item_status(PledgeStatus::Cancelled, ItemStatus::Stored).is_err());
        assert!(check_item_status(PledgeStatus::Auctioned, ItemStatus::Stored).is_err());
        assert!(check_item_status(PledgeStatus::Forfeited, ItemStatus::Auctioned).is_ok());
        assert!(check_item_status(PledgeStatus::Active, ItemStatus::Auctioned).is_err());
    }

    #[test]
    fn test_empty_ledger_is_consistent() {
        let ledger = LedgerState::new();
        assert!(ledger.check_consistency().is_ok());
        assert_eq!(ledger.num_pledges(), 0);
        assert!(ledger.items_of("missing").is_empty());
    }
}
