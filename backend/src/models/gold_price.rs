//! Gold price snapshots and their correction audit trail
//!
//! A snapshot is the `{purity_code: price_per_gram}` table supplied by the
//! price collaborator (API fetch, cache, or manual entry). Pledges copy the
//! snapshot they were valued with, so later corrections never change an
//! existing pledge.
//!
//! CRITICAL: Prices are i64 minor units per gram

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where a price snapshot came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    Primary,
    Secondary,
    Manual,
}

impl PriceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PriceSource::Primary => "primary",
            PriceSource::Secondary => "secondary",
            PriceSource::Manual => "manual",
        }
    }
}

/// Price per gram for each purity code, as of one date
///
/// # Example
/// ```
/// use chrono::NaiveDate;
/// use pawnshop_core_rs::models::{GoldPriceSnapshot, PriceSource};
///
/// let snapshot = GoldPriceSnapshot::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(), PriceSource::Manual)
///     .with_price("999", 30_000)
///     .with_price("916", 27_500);
///
/// assert_eq!(snapshot.price_for("916"), Some(27_500));
/// assert_eq!(snapshot.price_for("750"), None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldPriceSnapshot {
    pub price_date: NaiveDate,
    pub source: PriceSource,
    /// purity_code -> price per gram (i64 minor units)
    pub prices: BTreeMap<String, i64>,
}

impl GoldPriceSnapshot {
    pub fn new(price_date: NaiveDate, source: PriceSource) -> Self {
        Self {
            price_date,
            source,
            prices: BTreeMap::new(),
        }
    }

    /// Add or replace a purity price (builder pattern)
    pub fn with_price(mut self, purity_code: &str, price_per_gram: i64) -> Self {
        self.prices.insert(purity_code.to_string(), price_per_gram);
        self
    }

    /// Price per gram for a purity code
    pub fn price_for(&self, purity_code: &str) -> Option<i64> {
        self.prices.get(purity_code).copied()
    }
}

/// One price correction for one purity on one date
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoldPriceAudit {
    pub price_date: NaiveDate,
    pub purity_code: String,
    pub old_price: Option<i64>,
    pub new_price: Option<i64>,
    pub old_source: PriceSource,
    pub new_source: PriceSource,
    pub changed_by: String,
}

/// Daily price snapshots plus the audit trail of overwrites
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GoldPriceBook {
    snapshots: BTreeMap<NaiveDate, GoldPriceSnapshot>,
    audit: Vec<GoldPriceAudit>,
}

impl GoldPriceBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the snapshot for its date
    ///
    /// Replacing an existing snapshot appends one audit row per purity whose
    /// price was added, changed, or removed. Returns the number of rows
    /// appended.
    pub fn record(&mut self, snapshot: GoldPriceSnapshot, changed_by: &str) -> usize {
        let mut corrections = 0;

        if let Some(previous) = self.snapshots.get(&snapshot.price_date) {
            let purities: std::collections::BTreeSet<&String> = previous
                .prices
                .keys()
                .chain(snapshot.prices.keys())
                .collect();

            for purity in purities {
                let old_price = previous.prices.get(purity).copied();
                let new_price = snapshot.prices.get(purity).copied();
                if old_price != new_price {
                    self.audit.push(GoldPriceAudit {
                        price_date: snapshot.price_date,
                        purity_code: purity.clone(),
                        old_price,
                        new_price,
                        old_source: previous.source,
                        new_source: snapshot.source,
                        changed_by: changed_by.to_string(),
                    });
                    corrections += 1;
                }
            }
        }

        self.snapshots.insert(snapshot.price_date, snapshot);
        corrections
    }

    /// Snapshot recorded for exactly this date
    pub fn on(&self, date: NaiveDate) -> Option<&GoldPriceSnapshot> {
        self.snapshots.get(&date)
    }

    /// Most recent snapshot on or before this date
    pub fn latest_as_of(&self, date: NaiveDate) -> Option<&GoldPriceSnapshot> {
        self.snapshots.range(..=date).next_back().map(|(_, s)| s)
    }

    pub fn audit_trail(&self) -> &[GoldPriceAudit] {
        &self.audit
    }

    pub fn snapshots(&self) -> impl Iterator<Item = &GoldPriceSnapshot> {
        self.snapshots.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, day).unwrap()
    }

    #[test]
    fn test_first_record_has_no_audit() {
        let mut book = GoldPriceBook::new();
        let n = book.record(
            GoldPriceSnapshot::new(d(1), PriceSource::Primary).with_price("999", 30_000),
            "u1",
        );
        assert_eq!(n, 0);
        assert!(book.audit_trail().is_empty());
    }

    #[test]
    fn test_overwrite_audits_changed_purities_only() {
        let mut book = GoldPriceBook::new();
        book.record(
            GoldPriceSnapshot::new(d(1), PriceSource::Primary)
                .with_price("999", 30_000)
                .with_price("916", 27_000),
            "u1",
        );
        let n = book.record(
            GoldPriceSnapshot::new(d(1), PriceSource::Manual)
                .with_price("999", 30_000)
                .with_price("916", 27_400),
            "u2",
        );

        assert_eq!(n, 1);
        let row = &book.audit_trail()[0];
        assert_eq!(row.purity_code, "916");
        assert_eq!(row.old_price, Some(27_000));
        assert_eq!(row.new_price, Some(27_400));
        assert_eq!(row.new_source, PriceSource::Manual);
        assert_eq!(book.on(d(1)).unwrap().price_for("916"), Some(27_400));
    }

    #[test]
    fn test_latest_as_of_picks_previous_day() {
        let mut book = GoldPriceBook::new();
        book.record(GoldPriceSnapshot::new(d(1), PriceSource::Primary).with_price("999", 1), "u");
        book.record(GoldPriceSnapshot::new(d(3), PriceSource::Primary).with_price("999", 3), "u");

        assert_eq!(book.latest_as_of(d(2)).unwrap().price_date, d(1));
        assert_eq!(book.latest_as_of(d(5)).unwrap().price_date, d(3));
        assert!(book.latest_as_of(NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()).is_none());
    }
}
