//! Background workers: quote refresh loop and rate-limit map eviction.

use std::sync::Arc;
use std::time::Duration;

use aurora_market::{run_periodic, BackoffPolicy};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::state::AppState;

/// How often idle rate-limit entries are swept.
pub const EVICTION_INTERVAL: Duration = Duration::from_secs(600);

/// Start the quote refresh loop.
///
/// After every attempt, successful or not, the current snapshot is
/// published to ticker subscribers. Runs until `stop` flips to `true`.
pub fn start_quote_worker(state: Arc<AppState>, stop: watch::Receiver<bool>) -> JoinHandle<()> {
    let policy = BackoffPolicy::from(&state.config.quotes);

    tokio::spawn(async move {
        info!(
            "Quote refresh worker started ({} symbols, every {:?})",
            state.quotes.symbols().len(),
            policy.interval
        );

        let cache = state.quotes.clone();
        run_periodic(
            policy,
            stop,
            || {
                let cache = cache.clone();
                async move { cache.refresh().await }
            },
            |snapshot| {
                debug!("Publishing {} quotes", snapshot.records.len());
                state.publish_quotes(snapshot);
            },
            |e, delay| {
                warn!("Quote refresh failed: {} (retrying in {:?})", e, delay);
                state.publish_quotes(state.quotes.read());
            },
        )
        .await;

        info!("Quote refresh worker stopped");
    })
}

/// Start the periodic sweep of idle rate-limit entries.
pub fn start_eviction_worker(
    state: Arc<AppState>,
    mut stop: watch::Receiver<bool>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        // The first tick completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let evicted = state.rate_limiter.evict_idle(every);
                    if evicted > 0 {
                        debug!("Evicted {} idle rate-limit entries", evicted);
                    }
                }
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use aurora_chat::ProviderRegistry;
    use aurora_core::AuroraConfig;
    use aurora_market::{QuoteCache, QuoteError, QuoteFetcher, QuoteRecord};
    use chrono::Utc;

    use super::*;

    /// Succeeds on odd calls, fails on even ones.
    struct FlakyFetcher {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl QuoteFetcher for FlakyFetcher {
        async fn fetch_quotes(&self, _symbols: &[String]) -> Result<Vec<QuoteRecord>, QuoteError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n % 2 == 0 {
                return Err(QuoteError::Request("connection reset".into()));
            }
            Ok(vec![QuoteRecord {
                symbol: "BTC".into(),
                price: 60000.0 + n as f64,
                change_24h: 0.5,
                observed_at: Utc::now(),
            }])
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_publishes_after_every_attempt() {
        let mut config = AuroraConfig::default();
        config.quotes.symbols = vec!["BTC".into()];
        config.quotes.refresh_interval = Duration::from_secs(60);

        let fetcher = Arc::new(FlakyFetcher {
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(QuoteCache::from_settings(fetcher.clone(), &config.quotes));
        let state = Arc::new(AppState::new(config, ProviderRegistry::new(), cache));
        let mut ticker = state.ticker.subscribe();

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = start_quote_worker(state.clone(), stop_rx);

        // Success, then a failure that republishes the last good snapshot.
        let first = ticker.recv().await.unwrap();
        assert_eq!(first.records[0].price, 60001.0);
        let second = ticker.recv().await.unwrap();
        assert_eq!(second.records[0].price, 60001.0);
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);

        stop_tx.send(true).unwrap();
        worker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_eviction_worker_stops_on_signal() {
        let config = AuroraConfig::default();
        let cache = Arc::new(QuoteCache::from_settings(
            Arc::new(FlakyFetcher {
                calls: AtomicUsize::new(0),
            }),
            &config.quotes,
        ));
        let state = Arc::new(AppState::new(config, ProviderRegistry::new(), cache));
        assert!(state.rate_limiter.allow("idle-client"));

        let (stop_tx, stop_rx) = watch::channel(false);
        let worker = start_eviction_worker(state.clone(), stop_rx, Duration::from_secs(1));

        stop_tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
