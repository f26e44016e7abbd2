//! Quote records and snapshots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Latest observed price for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRecord {
    pub symbol: String,
    pub price: f64,
    /// Percent change over the trailing 24 hours.
    #[serde(rename = "change24h")]
    pub change_24h: f64,
    #[serde(rename = "observedAt")]
    pub observed_at: DateTime<Utc>,
}

/// Immutable view of the cache at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteSnapshot {
    pub records: Vec<QuoteRecord>,
    #[serde(rename = "fetchedAt")]
    pub fetched_at: Option<DateTime<Utc>>,
    pub stale: bool,
}

impl QuoteSnapshot {
    /// Snapshot served before any refresh has succeeded.
    pub fn empty() -> Self {
        Self {
            records: Vec::new(),
            fetched_at: None,
            stale: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a record by symbol, case-insensitively.
    pub fn get(&self, symbol: &str) -> Option<&QuoteRecord> {
        self.records
            .iter()
            .find(|r| r.symbol.eq_ignore_ascii_case(symbol))
    }
}
