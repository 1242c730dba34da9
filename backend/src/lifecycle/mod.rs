//! Pledge lifecycle state machine
//!
//! ```text
//!            renew                 redeem (last item)
//!   Active ─────────► Renewed ─────────────────────────► Redeemed
//!     │  ▲──── renew ───┘ │
//!     │ overdue batch      │ overdue batch
//!     ▼                    ▼
//!   Overdue ──── forfeit (after grace) ──► Forfeited ── last sale ──► Auctioned
//!
//!   any non-terminal ── cancel (no payments recorded) ──► Cancelled
//! ```
//!
//! Redeemed, Auctioned, and Cancelled are terminal. Every transition runs
//! inside an engine transaction and is followed by a full consistency
//! check before commit.

pub mod operations;

pub use operations::{
    CreatePledgeRequest, NewItem, RedemptionQuote, RedemptionRequest, RenewalQuote, RenewalRequest,
};

use crate::models::pledge::PledgeStatus;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle operation requested on a pledge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleAction {
    Renew,
    Redeem,
    ReleaseItems,
    MarkOverdue,
    Forfeit,
    ListForAuction,
    RecordAuctionSale,
    Cancel,
}

impl LifecycleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Renew => "renew",
            LifecycleAction::Redeem => "redeem",
            LifecycleAction::ReleaseItems => "release_items",
            LifecycleAction::MarkOverdue => "mark_overdue",
            LifecycleAction::Forfeit => "forfeit",
            LifecycleAction::ListForAuction => "list_for_auction",
            LifecycleAction::RecordAuctionSale => "record_auction_sale",
            LifecycleAction::Cancel => "cancel",
        }
    }
}

impl std::fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("Cannot {action} pledge {pledge_id} while {from}{}", detail_suffix(.detail))]
    IllegalTransition {
        pledge_id: String,
        from: PledgeStatus,
        action: LifecycleAction,
        detail: Option<String>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Payment of {cash} cash + {transfer} transfer does not match {expected}")]
    PaymentMismatch { expected: i64, cash: i64, transfer: i64 },

    #[error("Pledge {pledge_id} belongs to branch {pledge_branch}, caller acts for {actor_branch}")]
    BranchMismatch {
        pledge_id: String,
        pledge_branch: String,
        actor_branch: String,
    },

    #[error("Consistency violation: {0}")]
    ConsistencyViolation(String),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_ref().map(|d| format!(": {}", d)).unwrap_or_default()
}

/// Whether `action` is allowed from stored status `from`
///
/// Date rules (grace expiry for forfeit and renew) and payment rules
/// (cancel) are checked by the operations on top of this table.
pub fn can_transition(from: PledgeStatus, action: LifecycleAction) -> bool {
    use LifecycleAction as A;
    use PledgeStatus as S;

    match action {
        A::Renew | A::Redeem | A::Forfeit => from.is_open(),
        A::MarkOverdue => matches!(from, S::Active | S::Renewed),
        A::ListForAuction | A::RecordAuctionSale => from == S::Forfeited,
        A::ReleaseItems => from.is_open() || matches!(from, S::Redeemed | S::Forfeited | S::Auctioned),
        A::Cancel => !from.is_terminal(),
    }
}

/// Check the table, producing the caller-facing error on refusal
pub fn ensure_transition(
    pledge_id: &str,
    from: PledgeStatus,
    action: LifecycleAction,
) -> Result<(), LifecycleError> {
    if can_transition(from, action) {
        Ok(())
    } else {
        Err(LifecycleError::IllegalTransition {
            pledge_id: pledge_id.to_string(),
            from,
            action,
            detail: None,
        })
    }
}
