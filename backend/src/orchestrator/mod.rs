//! Orchestrator - transactional engine, configuration, and snapshots
//!
//! See `engine.rs` for the transaction model.

pub mod checkpoint;
pub mod config;
pub mod engine;

// Re-export main types for convenience
pub use checkpoint::{compute_config_hash, validate_snapshot, LedgerSnapshot, SNAPSHOT_SCHEMA_VERSION};
pub use config::EngineConfig;
pub use engine::PawnEngine;
