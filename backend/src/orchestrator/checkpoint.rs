//! Checkpoint - Save/Load Ledger State
//!
//! Serializes the complete ledger together with the hash of the config it
//! was produced under, so a restart resumes exactly where it stopped.
//!
//! # Critical Invariants
//!
//! - **Config Matching**: a snapshot only loads under the config it was saved with
//! - **Referential Integrity**: every record points at an existing pledge and item
//! - **Number Uniqueness**: every document number is in the issued index
//! - **Ledger Consistency**: [`LedgerState::check_consistency`] passes

use crate::error::EngineError;
use crate::models::state::LedgerState;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

/// Snapshot layout version; bump when the serialized shape changes
pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

// ============================================================================
// Snapshot Structure
// ============================================================================

/// Complete ledger snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub schema_version: u32,

    /// SHA-256 of the canonical engine config JSON
    pub config_hash: String,

    pub ledger: LedgerState,
}

impl LedgerSnapshot {
    pub fn new(config_hash: String, ledger: LedgerState) -> Self {
        Self {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            config_hash,
            ledger,
        }
    }

    pub fn to_json(&self) -> Result<String, EngineError> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::Serialization(format!("Snapshot serialization failed: {}", e)))
    }

    /// Parse and validate a snapshot
    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let snapshot: LedgerSnapshot = serde_json::from_str(json)
            .map_err(|e| EngineError::Serialization(format!("Snapshot parse failed: {}", e)))?;
        validate_snapshot(&snapshot)?;
        Ok(snapshot)
    }
}

// ============================================================================
// Config Hashing
// ============================================================================

/// Compute deterministic SHA256 hash of config
///
/// Uses canonical JSON serialization with sorted keys so the hash does not
/// depend on field order.
pub fn compute_config_hash<T: Serialize>(config: &T) -> Result<String, EngineError> {
    use serde_json::Value;
    use std::collections::BTreeMap;

    let value = serde_json::to_value(config)
        .map_err(|e| EngineError::Serialization(format!("Config serialization failed: {}", e)))?;

    // Recursively sort all object keys for canonical representation
    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| EngineError::Serialization(format!("Config serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// Validation Functions
// ============================================================================

/// Validate snapshot integrity
///
/// Checks:
/// - Schema version
/// - Renewal, redemption, and auction records reference known pledges/items
/// - Document numbers are unique and present in the issued index
/// - Full ledger consistency
pub fn validate_snapshot(snapshot: &LedgerSnapshot) -> Result<(), EngineError> {
    let fail = |msg: String| Err(EngineError::SnapshotValidation(msg));

    if snapshot.schema_version != SNAPSHOT_SCHEMA_VERSION {
        return fail(format!(
            "Unsupported schema version {} (expected {})",
            snapshot.schema_version, SNAPSHOT_SCHEMA_VERSION
        ));
    }

    let ledger = &snapshot.ledger;

    // 1. Referential integrity
    for renewal in ledger.renewals() {
        if ledger.pledge(&renewal.pledge_id).is_none() {
            return fail(format!(
                "Renewal {} references unknown pledge {}",
                renewal.renewal_no, renewal.pledge_id
            ));
        }
    }
    for redemption in ledger.redemptions() {
        if ledger.pledge(&redemption.pledge_id).is_none() {
            return fail(format!(
                "Redemption {} references unknown pledge {}",
                redemption.redemption_no, redemption.pledge_id
            ));
        }
        for item_id in &redemption.redeemed_item_ids {
            match ledger.item(item_id) {
                Some(item) if item.pledge_id() == redemption.pledge_id => {}
                _ => {
                    return fail(format!(
                        "Redemption {} references item {} outside its pledge",
                        redemption.redemption_no, item_id
                    ))
                }
            }
        }
    }
    for auction in ledger.auction_items() {
        match ledger.item(&auction.item_id) {
            Some(item) if item.pledge_id() == auction.pledge_id => {}
            _ => {
                return fail(format!(
                    "Auction item {} references item {} outside pledge {}",
                    auction.auction_no, auction.item_id, auction.pledge_id
                ))
            }
        }
    }

    // 2. Document number uniqueness
    let numbers = ledger
        .pledges()
        .flat_map(|p| [p.pledge_no(), p.receipt_no()])
        .chain(ledger.renewals().map(|r| r.renewal_no.as_str()))
        .chain(ledger.redemptions().map(|r| r.redemption_no.as_str()))
        .chain(ledger.auction_items().map(|a| a.auction_no.as_str()));

    let mut seen = BTreeSet::new();
    for number in numbers {
        if !seen.insert(number) {
            return fail(format!("Document number {} used twice", number));
        }
        if !ledger.sequences().is_issued(number) {
            return fail(format!("Document number {} missing from the issued index", number));
        }
    }

    // 3. Ledger consistency
    ledger
        .check_consistency()
        .map_err(EngineError::SnapshotValidation)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_config_hash_deterministic() {
        #[derive(Serialize)]
        struct TestConfig {
            value: i32,
            name: String,
        }

        let hash1 = compute_config_hash(&TestConfig {
            value: 42,
            name: "test".to_string(),
        })
        .unwrap();
        let hash2 = compute_config_hash(&TestConfig {
            value: 42,
            name: "test".to_string(),
        })
        .unwrap();

        assert_eq!(hash1, hash2, "Same config should produce same hash");
    }

    #[test]
    fn test_compute_config_hash_different_for_different_configs() {
        #[derive(Serialize)]
        struct TestConfig {
            value: i32,
        }

        let hash1 = compute_config_hash(&TestConfig { value: 42 }).unwrap();
        let hash2 = compute_config_hash(&TestConfig { value: 43 }).unwrap();

        assert_ne!(hash1, hash2, "Different configs should produce different hashes");
    }

    #[test]
    fn test_empty_ledger_snapshot_validates() {
        let snapshot = LedgerSnapshot::new("abc".to_string(), LedgerState::new());
        assert!(validate_snapshot(&snapshot).is_ok());

        let json = snapshot.to_json().unwrap();
        let restored = LedgerSnapshot::from_json(&json).unwrap();
        assert_eq!(restored.config_hash, "abc");
    }

    #[test]
    fn test_rejects_future_schema() {
        let mut snapshot = LedgerSnapshot::new("abc".to_string(), LedgerState::new());
        snapshot.schema_version = SNAPSHOT_SCHEMA_VERSION + 1;
        assert!(matches!(
            validate_snapshot(&snapshot),
            Err(EngineError::SnapshotValidation(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            LedgerSnapshot::from_json("{ not json"),
            Err(EngineError::Serialization(_))
        ));
    }
}
