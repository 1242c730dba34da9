//! Pawnshop Core - Rust Engine
//!
//! Pledge valuation, interest accrual, lifecycle, storage allocation,
//! document numbering, and day-end aggregation for pawnshop branches.
//!
//! # Architecture
//!
//! - **core**: Integer money arithmetic and calendar months
//! - **models**: Domain types (Pledge, PledgeItem, Renewal, Slot, LedgerState)
//! - **valuation**: Item and pledge valuation, loan amount
//! - **interest**: Rate tiers, month-by-month breakdowns, rate book
//! - **lifecycle**: Pledge state machine and its operations
//! - **storage**: Vault / box / slot allocator
//! - **sequence**: Branch and year scoped document numbers
//! - **day_end**: Daily totals and the open/close book
//! - **events**: Post-commit sinks (audit, notification, printing)
//! - **orchestrator**: `PawnEngine` transactions, config, snapshots
//!
//! # Critical Invariants
//!
//! 1. All money values are i64 minor units, weights i64 milligrams
//! 2. All rounding is half-up on one final integer division
//! 3. The core never reads the clock; business dates are supplied

// Module declarations
pub mod core;
pub mod day_end;
pub mod error;
pub mod events;
pub mod interest;
pub mod lifecycle;
pub mod models;
pub mod orchestrator;
pub mod sequence;
pub mod storage;
pub mod valuation;

// Re-exports for convenience
pub use crate::core::calendar::MonthRounding;
pub use error::{EngineError, ErrorKind};
pub use events::{AuditRecord, EventSink, MemorySink, SinkError};
pub use interest::{EffectiveRate, InterestPolicy, RateBook};
pub use lifecycle::{
    CreatePledgeRequest, LifecycleAction, LifecycleError, NewItem, RedemptionQuote, RedemptionRequest, RenewalQuote,
    RenewalRequest,
};
pub use models::{
    ActorContext, DailyTotals, Event, EventLog, GoldPriceSnapshot, ItemStatus, LedgerState, PaymentSplit, Pledge,
    PledgeItem, PledgeStatus, PriceSource, StoneDeduction,
};
pub use orchestrator::{EngineConfig, LedgerSnapshot, PawnEngine};
pub use sequence::{SequenceGenerator, SequenceKind};
pub use storage::{AssignOutcome, StorageError, StorageState};
pub use valuation::{ItemInput, PledgeValuation, ValuationError};
