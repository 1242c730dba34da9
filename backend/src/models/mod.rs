//! Domain models for the pledge ledger

pub mod context;
pub mod day_end;
pub mod event;
pub mod gold_price;
pub mod item;
pub mod payment;
pub mod pledge;
pub mod rates;
pub mod renewal;
pub mod state;
pub mod storage;

// Re-exports
pub use context::ActorContext;
pub use day_end::{DailyTotals, DayEndReport, DayEndStatus};
pub use event::{Event, EventLog};
pub use gold_price::{GoldPriceAudit, GoldPriceBook, GoldPriceSnapshot, PriceSource};
pub use item::{ItemStatus, PledgeItem, SlotLocation, StoneDeduction};
pub use payment::PaymentSplit;
pub use pledge::{Cancellation, Pledge, PledgeStatus};
pub use rates::{InterestRate, PledgeRates, RateType};
pub use renewal::{AuctionItem, AuctionStatus, InterestBreakdownRow, RecordStatus, Redemption, Renewal};
pub use state::LedgerState;
pub use storage::{ItemLocationHistory, LocationAction, Slot, StorageBox, Vault};
