//! Branch-scoped document numbering
//!
//! Numbers look like `PG-KL01-2024-0001`: a kind prefix, the branch code,
//! the year (for year-scoped kinds), and a zero-padded counter.
//!
//! # Critical Invariants
//!
//! 1. **Uniqueness**: every number handed out appears once in `issued`
//! 2. **Counter rows**: one counter per (branch, kind, year); `next` advances
//!    it while holding `&mut self`, so callers sharing a generator must
//!    serialize through a lock (the engine's ledger mutex)
//! 3. **Bounded retry**: a number already present in `issued` (imported via
//!    [`SequenceGenerator::reserve_existing`]) is skipped, at most
//!    `max_retries` times before [`SequenceError::Conflict`]

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Errors raised while issuing or reserving numbers
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SequenceError {
    #[error("Sequence conflict: {number} still taken after {attempts} attempt(s)")]
    Conflict { number: String, attempts: u32 },

    #[error("Invalid branch code: {0:?}")]
    InvalidBranchCode(String),

    #[error("No branch code registered for branch {0}")]
    UnknownBranch(String),

    #[error("Malformed document number: {0}")]
    MalformedNumber(String),
}

/// Kind of document being numbered
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceKind {
    Pledge,
    Receipt,
    Renewal,
    Redemption,
    Auction,
}

impl SequenceKind {
    pub const ALL: [SequenceKind; 5] = [
        SequenceKind::Pledge,
        SequenceKind::Receipt,
        SequenceKind::Renewal,
        SequenceKind::Redemption,
        SequenceKind::Auction,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            SequenceKind::Pledge => "PG",
            SequenceKind::Receipt => "RC",
            SequenceKind::Renewal => "RN",
            SequenceKind::Redemption => "RD",
            SequenceKind::Auction => "AU",
        }
    }

    /// Whether the counter restarts every calendar year
    pub fn is_year_scoped(&self) -> bool {
        !matches!(self, SequenceKind::Auction)
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.prefix() == prefix)
    }
}

/// Counter row key
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SequenceKey {
    pub branch_id: String,
    pub kind: SequenceKind,
    /// `None` for kinds that are not year-scoped
    pub year: Option<i32>,
}

impl SequenceKey {
    pub fn new(branch_id: &str, kind: SequenceKind, year: i32) -> Self {
        Self {
            branch_id: branch_id.to_string(),
            kind,
            year: kind.is_year_scoped().then_some(year),
        }
    }
}

/// Persisted counter row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SequenceCounter {
    pub key: SequenceKey,
    pub last_value: u32,
}

/// Serialized form (JSON maps need string keys, so counters become rows)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceSnapshot {
    pub branch_codes: BTreeMap<String, String>,
    pub counters: Vec<SequenceCounter>,
    pub issued: BTreeSet<String>,
}

/// Document number generator
///
/// # Example
///
/// ```rust
/// use pawnshop_core_rs::sequence::{SequenceGenerator, SequenceKind};
///
/// let mut seq = SequenceGenerator::new();
/// seq.register_branch("BR1", "KL01").unwrap();
///
/// let first = seq.next("BR1", SequenceKind::Pledge, 2024, 5).unwrap();
/// let second = seq.next("BR1", SequenceKind::Pledge, 2024, 5).unwrap();
/// assert_eq!(first, "PG-KL01-2024-0001");
/// assert_eq!(second, "PG-KL01-2024-0002");
///
/// // New year, new counter
/// let next_year = seq.next("BR1", SequenceKind::Pledge, 2025, 5).unwrap();
/// assert_eq!(next_year, "PG-KL01-2025-0001");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "SequenceSnapshot", into = "SequenceSnapshot")]
pub struct SequenceGenerator {
    /// branch_id -> short code printed in numbers
    branch_codes: BTreeMap<String, String>,
    counters: BTreeMap<SequenceKey, u32>,
    /// Unique index over every number handed out or imported
    issued: BTreeSet<String>,
}

impl SequenceGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or re-confirm) the code printed for a branch
    ///
    /// Codes are 2-10 uppercase ASCII letters or digits and must be unique
    /// across branches; changing a branch's code after numbers were issued
    /// is rejected.
    pub fn register_branch(&mut self, branch_id: &str, code: &str) -> Result<(), SequenceError> {
        let valid = (2..=10).contains(&code.len())
            && code
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
        if !valid {
            return Err(SequenceError::InvalidBranchCode(code.to_string()));
        }

        if let Some((other, _)) = self
            .branch_codes
            .iter()
            .find(|(id, c)| c.as_str() == code && id.as_str() != branch_id)
        {
            return Err(SequenceError::InvalidBranchCode(format!(
                "{} already used by branch {}",
                code, other
            )));
        }

        if let Some(existing) = self.branch_codes.get(branch_id) {
            if existing != code && self.counters.keys().any(|k| k.branch_id == branch_id) {
                return Err(SequenceError::InvalidBranchCode(format!(
                    "branch {} already numbers documents as {}",
                    branch_id, existing
                )));
            }
        }

        self.branch_codes
            .insert(branch_id.to_string(), code.to_string());
        Ok(())
    }

    pub fn branch_code(&self, branch_id: &str) -> Option<&str> {
        self.branch_codes.get(branch_id).map(String::as_str)
    }

    /// Issue the next number for (branch, kind, year)
    ///
    /// `year` is ignored for kinds that are not year-scoped.
    pub fn next(
        &mut self,
        branch_id: &str,
        kind: SequenceKind,
        year: i32,
        max_retries: u32,
    ) -> Result<String, SequenceError> {
        let code = self
            .branch_codes
            .get(branch_id)
            .cloned()
            .ok_or_else(|| SequenceError::UnknownBranch(branch_id.to_string()))?;
        let key = SequenceKey::new(branch_id, kind, year);

        let mut attempts = 0;
        loop {
            let value = self.counters.get(&key).copied().unwrap_or(0) + 1;
            self.counters.insert(key.clone(), value);
            attempts += 1;

            let number = format_number(kind, &code, key.year, value);
            if self.issued.insert(number.clone()) {
                debug!(branch_id, number = %number, attempts, "Issued document number");
                return Ok(number);
            }

            warn!(branch_id, number = %number, attempts, "Document number already taken, retrying");
            if attempts > max_retries {
                return Err(SequenceError::Conflict { number, attempts });
            }
        }
    }

    /// Register a number issued outside this generator (e.g. imported records)
    ///
    /// Only the unique index is touched; the counter catches up through the
    /// retry path of [`SequenceGenerator::next`]. Returns `false` if the
    /// number was already known.
    pub fn reserve_existing(&mut self, number: &str) -> Result<bool, SequenceError> {
        let parsed = parse_number(number)?;
        if !self.branch_codes.values().any(|c| c == &parsed.code) {
            return Err(SequenceError::UnknownBranch(parsed.code));
        }
        Ok(self.issued.insert(number.to_string()))
    }

    pub fn is_issued(&self, number: &str) -> bool {
        self.issued.contains(number)
    }

    /// Last value handed out for a key (0 when none)
    pub fn last_value(&self, branch_id: &str, kind: SequenceKind, year: i32) -> u32 {
        self.counters
            .get(&SequenceKey::new(branch_id, kind, year))
            .copied()
            .unwrap_or(0)
    }

    /// Check that every counter points at a number present in the unique index
    pub fn check_counters(&self) -> Result<(), String> {
        for (key, value) in &self.counters {
            if *value == 0 {
                continue;
            }
            let code = self
                .branch_codes
                .get(&key.branch_id)
                .ok_or_else(|| format!("Counter for unknown branch {}", key.branch_id))?;
            let number = format_number(key.kind, code, key.year, *value);
            if !self.issued.contains(&number) {
                return Err(format!("Counter points at unissued number {}", number));
            }
        }
        Ok(())
    }
}

impl From<SequenceSnapshot> for SequenceGenerator {
    fn from(snapshot: SequenceSnapshot) -> Self {
        Self {
            branch_codes: snapshot.branch_codes,
            counters: snapshot
                .counters
                .into_iter()
                .map(|row| (row.key, row.last_value))
                .collect(),
            issued: snapshot.issued,
        }
    }
}

impl From<SequenceGenerator> for SequenceSnapshot {
    fn from(generator: SequenceGenerator) -> Self {
        Self {
            branch_codes: generator.branch_codes,
            counters: generator
                .counters
                .into_iter()
                .map(|(key, last_value)| SequenceCounter { key, last_value })
                .collect(),
            issued: generator.issued,
        }
    }
}

fn format_number(kind: SequenceKind, code: &str, year: Option<i32>, value: u32) -> String {
    match year {
        Some(year) => format!("{}-{}-{}-{:04}", kind.prefix(), code, year, value),
        None => format!("{}-{}-{:04}", kind.prefix(), code, value),
    }
}

struct ParsedNumber {
    code: String,
}

fn parse_number(number: &str) -> Result<ParsedNumber, SequenceError> {
    let malformed = || SequenceError::MalformedNumber(number.to_string());
    let parts: Vec<&str> = number.split('-').collect();

    let kind = parts
        .first()
        .and_then(|p| SequenceKind::from_prefix(p))
        .ok_or_else(malformed)?;

    let expected_parts = if kind.is_year_scoped() { 4 } else { 3 };
    if parts.len() != expected_parts {
        return Err(malformed());
    }
    if kind.is_year_scoped() && parts[2].parse::<i32>().is_err() {
        return Err(malformed());
    }
    let counter = parts[expected_parts - 1];
    if counter.len() < 4 || counter.parse::<u32>().is_err() {
        return Err(malformed());
    }

    Ok(ParsedNumber {
        code: parts[1].to_string(),
    })
}
