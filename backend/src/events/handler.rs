//! Event sinks and post-commit dispatch
//!
//! Sinks are the audit, notification, and print collaborators. They are
//! called after a transaction commits; a failing sink is logged and
//! skipped and can never undo the committed change.

use crate::events::types::AuditRecord;
use crate::models::context::ActorContext;
use crate::models::event::{Event, EventLog};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Sink {sink} failed: {reason}")]
pub struct SinkError {
    pub sink: String,
    pub reason: String,
}

/// Receiver of committed events
pub trait EventSink: Send + Sync {
    fn name(&self) -> &str;

    fn publish(&self, event: &Event, ctx: &ActorContext) -> Result<(), SinkError>;
}

/// In-memory sink keeping every event and its audit record
#[derive(Debug, Default)]
pub struct MemorySink {
    log: Mutex<EventLog>,
    audit: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the events received so far
    pub fn events(&self) -> Vec<Event> {
        self.log
            .lock()
            .map(|log| log.events().to_vec())
            .unwrap_or_default()
    }

    /// Copy of the audit records received so far
    pub fn audit_records(&self) -> Vec<AuditRecord> {
        self.audit.lock().map(|a| a.clone()).unwrap_or_default()
    }

    pub fn count_of(&self, event_type: &str) -> usize {
        self.log
            .lock()
            .map(|log| log.events_of_type(event_type).len())
            .unwrap_or(0)
    }
}

impl EventSink for MemorySink {
    fn name(&self) -> &str {
        "memory"
    }

    fn publish(&self, event: &Event, ctx: &ActorContext) -> Result<(), SinkError> {
        let poisoned = || SinkError {
            sink: self.name().to_string(),
            reason: "lock poisoned".to_string(),
        };
        self.log.lock().map_err(|_| poisoned())?.log(event.clone());
        self.audit
            .lock()
            .map_err(|_| poisoned())?
            .push(AuditRecord::from_event(event, ctx));
        Ok(())
    }
}

/// Fan-out to registered sinks
#[derive(Default, Clone)]
pub struct EventDispatcher {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Deliver committed events to every sink
    ///
    /// Returns the number of failed deliveries.
    pub fn dispatch(&self, events: &[Event], ctx: &ActorContext) -> usize {
        let mut failures = 0;
        for event in events {
            for sink in &self.sinks {
                if let Err(e) = sink.publish(event, ctx) {
                    failures += 1;
                    warn!(
                        sink = sink.name(),
                        event_type = event.event_type(),
                        error = %e,
                        "Event sink failed; committed change kept"
                    );
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("sinks", &self.sinks.iter().map(|s| s.name().to_string()).collect::<Vec<_>>())
            .finish()
    }
}
