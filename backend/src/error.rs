//! Engine-level error type
//!
//! Each component owns its error enum; [`EngineError`] composes them for
//! the transactional engine and maps every failure onto a small taxonomy
//! callers can act on (show a message, retry, or escalate).

use crate::day_end::DayEndError;
use crate::interest::InterestError;
use crate::lifecycle::LifecycleError;
use crate::sequence::SequenceError;
use crate::storage::StorageError;
use crate::valuation::ValuationError;
use thiserror::Error;

/// Caller-facing failure category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Input malformed; nothing was applied
    Validation,
    /// State machine forbids the change
    IllegalTransition,
    /// Slot contention; pick another slot or re-fetch availability
    SlotOccupied,
    /// Document number retry budget exhausted
    SequenceConflict,
    /// Invariant broken; should never happen in correct operation
    ConsistencyViolation,
    /// Concurrent day-end open/close
    Conflict,
    NotFound,
    Internal,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum EngineError {
    #[error(transparent)]
    Valuation(#[from] ValuationError),

    #[error(transparent)]
    Interest(#[from] InterestError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Sequence(#[from] SequenceError),

    #[error(transparent)]
    DayEnd(#[from] DayEndError),

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Snapshot validation failed: {0}")]
    SnapshotValidation(String),

    #[error("Ledger lock poisoned")]
    LockPoisoned,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Valuation(_) | EngineError::Interest(_) => ErrorKind::Validation,

            EngineError::Lifecycle(e) => match e {
                LifecycleError::IllegalTransition { .. } => ErrorKind::IllegalTransition,
                LifecycleError::NotFound(_) => ErrorKind::NotFound,
                LifecycleError::ConsistencyViolation(_) => ErrorKind::ConsistencyViolation,
                LifecycleError::Validation(_)
                | LifecycleError::PaymentMismatch { .. }
                | LifecycleError::BranchMismatch { .. } => ErrorKind::Validation,
            },

            EngineError::Storage(e) => match e {
                StorageError::SlotOccupied { .. } => ErrorKind::SlotOccupied,
                StorageError::SlotNotFound(_)
                | StorageError::ItemNotFound(_)
                | StorageError::BoxNotFound(_)
                | StorageError::VaultNotFound(_) => ErrorKind::NotFound,
                StorageError::ConsistencyViolation(_) => ErrorKind::ConsistencyViolation,
                StorageError::ItemAlreadyStored { .. }
                | StorageError::NotInSlot { .. }
                | StorageError::BranchMismatch { .. }
                | StorageError::SlotInactive(_)
                | StorageError::ItemNotStorable { .. }
                | StorageError::DuplicateCode(_)
                | StorageError::InvalidSlotCount(_) => ErrorKind::Validation,
            },

            EngineError::Sequence(e) => match e {
                SequenceError::Conflict { .. } => ErrorKind::SequenceConflict,
                SequenceError::UnknownBranch(_) => ErrorKind::NotFound,
                SequenceError::InvalidBranchCode(_) | SequenceError::MalformedNumber(_) => {
                    ErrorKind::Validation
                }
            },

            EngineError::DayEnd(e) => match e {
                DayEndError::AlreadyOpened { .. } | DayEndError::AlreadyClosed { .. } => {
                    ErrorKind::Conflict
                }
                DayEndError::NotOpened { .. } => ErrorKind::NotFound,
                DayEndError::DayClosed { .. } => ErrorKind::IllegalTransition,
            },

            EngineError::InvalidConfig(_) => ErrorKind::Validation,
            EngineError::SnapshotValidation(_) => ErrorKind::ConsistencyViolation,
            EngineError::Serialization(_) | EngineError::LockPoisoned => ErrorKind::Internal,
        }
    }

    /// Whether the caller may retry (possibly with different inputs)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SlotOccupied | ErrorKind::SequenceConflict | ErrorKind::Conflict
        )
    }
}
