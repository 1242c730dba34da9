//! Audit and notification contracts
//!
//! - `types`: the audit record shape
//! - `handler`: the sink trait and post-commit dispatch

pub mod handler;
pub mod types;

pub use handler::{EventDispatcher, EventSink, MemorySink, SinkError};
pub use types::AuditRecord;
