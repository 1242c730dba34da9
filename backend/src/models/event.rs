//! Committed ledger events
//!
//! This module defines the Event enum which captures every state change
//! the engine commits. Events are published to sinks only after the
//! transaction that produced them has committed. They enable:
//! - Auditing (who changed what, old and new values)
//! - Notifications (receipt printing, customer messages)
//! - Replay and debugging of branch activity
//!
//! # Event Types
//!
//! Events are categorized by module:
//! - **pledge**: creation, renewal, redemption, forfeiture, cancellation
//! - **auction**: listing and sale of forfeited items
//! - **storage**: slot assignment, moves, releases, occupancy drift
//! - **day_end**: branch day opened / closed
//! - **gold_price**: daily price recorded
//!
//! # Example
//!
//! ```rust
//! use chrono::NaiveDate;
//! use pawnshop_core_rs::models::Event;
//!
//! let event = Event::SlotReleased {
//!     date: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
//!     branch_id: "BR1".to_string(),
//!     item_id: "item-1".to_string(),
//!     slot_id: "slot-9".to_string(),
//! };
//!
//! assert_eq!(event.event_type(), "SlotReleased");
//! assert_eq!(event.module(), "storage");
//! ```

use crate::models::pledge::PledgeStatus;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Ledger event capturing one committed state change
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    PledgeCreated {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        pledge_no: String,
        receipt_no: String,
        loan_amount: i64,
        payout_amount: i64,
        item_count: usize,
    },

    PledgeRenewed {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        renewal_id: String,
        renewal_no: String,
        previous_due_date: NaiveDate,
        new_due_date: NaiveDate,
        interest_amount: i64,
        total_payable: i64,
        old_status: PledgeStatus,
    },

    PledgeRedeemed {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        redemption_id: String,
        redemption_no: String,
        is_partial: bool,
        item_ids: Vec<String>,
        total_payable: i64,
        old_status: PledgeStatus,
        new_status: PledgeStatus,
    },

    /// Redeemed items handed back (slots freed)
    ItemsReleased {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        redemption_id: String,
        item_ids: Vec<String>,
    },

    PledgeForfeited {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        old_status: PledgeStatus,
        reason: String,
    },

    PledgeMarkedOverdue {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        old_status: PledgeStatus,
    },

    PledgeCancelled {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        old_status: PledgeStatus,
        reason: String,
    },

    AuctionListed {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        auction_item_id: String,
        auction_no: String,
        item_id: String,
        reserve_price: i64,
    },

    AuctionSold {
        date: NaiveDate,
        branch_id: String,
        pledge_id: String,
        auction_item_id: String,
        item_id: String,
        sale_price: i64,
        new_status: PledgeStatus,
    },

    SlotAssigned {
        date: NaiveDate,
        branch_id: String,
        item_id: String,
        slot_id: String,
    },

    ItemMoved {
        date: NaiveDate,
        branch_id: String,
        item_id: String,
        from_slot_id: String,
        to_slot_id: String,
        reason: String,
    },

    SlotReleased {
        date: NaiveDate,
        branch_id: String,
        item_id: String,
        slot_id: String,
    },

    /// A box's stored occupancy count disagreed with its slots and was recomputed
    OccupancyDrift {
        date: NaiveDate,
        branch_id: String,
        box_id: String,
        recorded: u32,
        actual: u32,
    },

    DayOpened {
        date: NaiveDate,
        branch_id: String,
        report_id: String,
        opening_balance: i64,
    },

    DayClosed {
        date: NaiveDate,
        branch_id: String,
        report_id: String,
        closing_balance: i64,
        variance: i64,
    },

    GoldPriceRecorded {
        date: NaiveDate,
        branch_id: String,
        source: String,
        purity_count: usize,
        corrections: usize,
    },
}

impl Event {
    /// Business date of the change
    pub fn date(&self) -> NaiveDate {
        match self {
            Event::PledgeCreated { date, .. }
            | Event::PledgeRenewed { date, .. }
            | Event::PledgeRedeemed { date, .. }
            | Event::ItemsReleased { date, .. }
            | Event::PledgeForfeited { date, .. }
            | Event::PledgeMarkedOverdue { date, .. }
            | Event::PledgeCancelled { date, .. }
            | Event::AuctionListed { date, .. }
            | Event::AuctionSold { date, .. }
            | Event::SlotAssigned { date, .. }
            | Event::ItemMoved { date, .. }
            | Event::SlotReleased { date, .. }
            | Event::OccupancyDrift { date, .. }
            | Event::DayOpened { date, .. }
            | Event::DayClosed { date, .. }
            | Event::GoldPriceRecorded { date, .. } => *date,
        }
    }

    /// Branch the change belongs to
    pub fn branch_id(&self) -> &str {
        match self {
            Event::PledgeCreated { branch_id, .. }
            | Event::PledgeRenewed { branch_id, .. }
            | Event::PledgeRedeemed { branch_id, .. }
            | Event::ItemsReleased { branch_id, .. }
            | Event::PledgeForfeited { branch_id, .. }
            | Event::PledgeMarkedOverdue { branch_id, .. }
            | Event::PledgeCancelled { branch_id, .. }
            | Event::AuctionListed { branch_id, .. }
            | Event::AuctionSold { branch_id, .. }
            | Event::SlotAssigned { branch_id, .. }
            | Event::ItemMoved { branch_id, .. }
            | Event::SlotReleased { branch_id, .. }
            | Event::OccupancyDrift { branch_id, .. }
            | Event::DayOpened { branch_id, .. }
            | Event::DayClosed { branch_id, .. }
            | Event::GoldPriceRecorded { branch_id, .. } => branch_id,
        }
    }

    /// Get a short description of the event type
    pub fn event_type(&self) -> &'static str {
        match self {
            Event::PledgeCreated { .. } => "PledgeCreated",
            Event::PledgeRenewed { .. } => "PledgeRenewed",
            Event::PledgeRedeemed { .. } => "PledgeRedeemed",
            Event::ItemsReleased { .. } => "ItemsReleased",
            Event::PledgeForfeited { .. } => "PledgeForfeited",
            Event::PledgeMarkedOverdue { .. } => "PledgeMarkedOverdue",
            Event::PledgeCancelled { .. } => "PledgeCancelled",
            Event::AuctionListed { .. } => "AuctionListed",
            Event::AuctionSold { .. } => "AuctionSold",
            Event::SlotAssigned { .. } => "SlotAssigned",
            Event::ItemMoved { .. } => "ItemMoved",
            Event::SlotReleased { .. } => "SlotReleased",
            Event::OccupancyDrift { .. } => "OccupancyDrift",
            Event::DayOpened { .. } => "DayOpened",
            Event::DayClosed { .. } => "DayClosed",
            Event::GoldPriceRecorded { .. } => "GoldPriceRecorded",
        }
    }

    /// Functional module for audit grouping
    pub fn module(&self) -> &'static str {
        match self {
            Event::PledgeCreated { .. }
            | Event::PledgeRenewed { .. }
            | Event::PledgeRedeemed { .. }
            | Event::ItemsReleased { .. }
            | Event::PledgeForfeited { .. }
            | Event::PledgeMarkedOverdue { .. }
            | Event::PledgeCancelled { .. } => "pledge",
            Event::AuctionListed { .. } | Event::AuctionSold { .. } => "auction",
            Event::SlotAssigned { .. }
            | Event::ItemMoved { .. }
            | Event::SlotReleased { .. }
            | Event::OccupancyDrift { .. } => "storage",
            Event::DayOpened { .. } | Event::DayClosed { .. } => "day_end",
            Event::GoldPriceRecorded { .. } => "gold_price",
        }
    }

    /// Get pledge ID if event relates to a specific pledge
    pub fn pledge_id(&self) -> Option<&str> {
        match self {
            Event::PledgeCreated { pledge_id, .. }
            | Event::PledgeRenewed { pledge_id, .. }
            | Event::PledgeRedeemed { pledge_id, .. }
            | Event::ItemsReleased { pledge_id, .. }
            | Event::PledgeForfeited { pledge_id, .. }
            | Event::PledgeMarkedOverdue { pledge_id, .. }
            | Event::PledgeCancelled { pledge_id, .. }
            | Event::AuctionListed { pledge_id, .. }
            | Event::AuctionSold { pledge_id, .. } => Some(pledge_id),
            _ => None,
        }
    }

    /// Get item ID if event relates to a single item
    pub fn item_id(&self) -> Option<&str> {
        match self {
            Event::AuctionListed { item_id, .. }
            | Event::AuctionSold { item_id, .. }
            | Event::SlotAssigned { item_id, .. }
            | Event::ItemMoved { item_id, .. }
            | Event::SlotReleased { item_id, .. } => Some(item_id),
            _ => None,
        }
    }

    /// Completion of a customer-facing transaction (receipt / notification worthy)
    pub fn is_lifecycle_completion(&self) -> bool {
        matches!(
            self,
            Event::PledgeCreated { .. }
                | Event::PledgeRenewed { .. }
                | Event::PledgeRedeemed { .. }
                | Event::PledgeCancelled { .. }
        )
    }
}

/// Event log for storing and querying committed events.
///
/// This is a simple wrapper around Vec<Event> with convenience methods.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn log(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Get the number of events logged
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if the log is empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Get all events
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Get events dated on a business date
    pub fn events_on(&self, date: NaiveDate) -> Vec<&Event> {
        self.events.iter().filter(|e| e.date() == date).collect()
    }

    /// Get events of a specific type
    pub fn events_of_type(&self, event_type: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get events for a specific pledge
    pub fn events_for_pledge(&self, pledge_id: &str) -> Vec<&Event> {
        self.events
            .iter()
            .filter(|e| e.pledge_id() == Some(pledge_id))
            .collect()
    }

    /// Clear all events
    pub fn clear(&mut self) {
        self.events.clear();
    }
}
