//! Quote cache with swap-on-refresh semantics.
//!
//! The current snapshot lives behind an `Arc` that is replaced wholesale on
//! every successful refresh, so readers always see records from exactly one
//! fetch. Staleness is derived at read time from wall-clock age.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use aurora_core::QuoteSettings;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::QuoteError;
use crate::fetcher::QuoteFetcher;
use crate::types::{QuoteRecord, QuoteSnapshot};

/// Records from one successful fetch.
struct StoredSnapshot {
    records: Vec<QuoteRecord>,
    fetched_at: Option<DateTime<Utc>>,
}

impl StoredSnapshot {
    fn view(&self, now: DateTime<Utc>, stale_threshold: Duration) -> QuoteSnapshot {
        let stale = match self.fetched_at {
            Some(fetched_at) => {
                let age = (now - fetched_at).to_std().unwrap_or(Duration::ZERO);
                age > stale_threshold
            }
            None => true,
        };
        QuoteSnapshot {
            records: self.records.clone(),
            fetched_at: self.fetched_at,
            stale,
        }
    }
}

/// Thread-safe cache of the latest quote snapshot.
pub struct QuoteCache {
    fetcher: Arc<dyn QuoteFetcher>,
    symbols: Vec<String>,
    stale_threshold: Duration,
    current: RwLock<Arc<StoredSnapshot>>,
    /// Serializes writers; held across the fetch.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl QuoteCache {
    pub fn new(fetcher: Arc<dyn QuoteFetcher>, symbols: Vec<String>, stale_threshold: Duration) -> Self {
        let symbols = symbols
            .into_iter()
            .map(|s| s.trim().to_ascii_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        Self {
            fetcher,
            symbols,
            stale_threshold,
            current: RwLock::new(Arc::new(StoredSnapshot {
                records: Vec::new(),
                fetched_at: None,
            })),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn from_settings(fetcher: Arc<dyn QuoteFetcher>, settings: &QuoteSettings) -> Self {
        Self::new(fetcher, settings.symbols.clone(), settings.stale_threshold)
    }

    /// Symbols this cache tracks.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    pub fn stale_threshold(&self) -> Duration {
        self.stale_threshold
    }

    /// Latest snapshot, with staleness computed against the current time.
    pub fn read(&self) -> QuoteSnapshot {
        self.read_at(Utc::now())
    }

    /// Latest snapshot, with staleness computed against `now`.
    pub fn read_at(&self, now: DateTime<Utc>) -> QuoteSnapshot {
        let stored = self.current.read().clone();
        stored.view(now, self.stale_threshold)
    }

    /// Fetch, validate and publish a new snapshot.
    ///
    /// On failure the previous snapshot stays in place.
    pub async fn refresh(&self) -> Result<QuoteSnapshot, QuoteError> {
        let _writer = self.refresh_lock.lock().await;

        let fetched = self.fetcher.fetch_quotes(&self.symbols).await?;
        let records = validate_records(fetched, &self.symbols)?;
        let now = Utc::now();

        let stored = Arc::new(StoredSnapshot {
            records,
            fetched_at: Some(now),
        });
        {
            let mut current = self.current.write();
            if current.fetched_at.is_some_and(|prev| prev > now) {
                return Ok(current.view(now, self.stale_threshold));
            }
            *current = stored.clone();
        }

        debug!("Quote snapshot refreshed ({} records)", stored.records.len());
        Ok(stored.view(now, self.stale_threshold))
    }

    /// Refresh synchronously within `timeout`, else serve the last snapshot.
    pub async fn read_or_refresh(&self, timeout: Duration) -> QuoteSnapshot {
        match tokio::time::timeout(timeout, self.refresh()).await {
            Ok(Ok(snapshot)) => snapshot,
            Ok(Err(e)) => {
                warn!("On-demand quote refresh failed: {}", e);
                self.read()
            }
            Err(_) => {
                warn!("{}", QuoteError::Timeout(timeout));
                self.read()
            }
        }
    }
}

/// Normalize and check fetched records, ordering them like `symbols`.
fn validate_records(
    fetched: Vec<QuoteRecord>,
    symbols: &[String],
) -> Result<Vec<QuoteRecord>, QuoteError> {
    if fetched.is_empty() {
        return Err(QuoteError::Invalid("no records returned".into()));
    }

    let mut seen = HashSet::new();
    let mut records = Vec::with_capacity(fetched.len());
    for mut record in fetched {
        record.symbol = record.symbol.trim().to_ascii_uppercase();
        if !record.price.is_finite() || record.price <= 0.0 {
            return Err(QuoteError::Invalid(format!(
                "price for {} is {}",
                record.symbol, record.price
            )));
        }
        if !record.change_24h.is_finite() {
            return Err(QuoteError::Invalid(format!(
                "24h change for {} is not finite",
                record.symbol
            )));
        }
        if !seen.insert(record.symbol.clone()) {
            return Err(QuoteError::Invalid(format!("duplicate symbol {}", record.symbol)));
        }
        records.push(record);
    }

    records.sort_by_key(|r| {
        symbols
            .iter()
            .position(|s| *s == r.symbol)
            .unwrap_or(usize::MAX)
    });
    Ok(records)
}
