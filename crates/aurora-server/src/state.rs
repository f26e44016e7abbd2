//! Shared application state.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use aurora_chat::{ProviderRegistry, RateLimiter, RelayEngine};
use aurora_core::AuroraConfig;
use aurora_market::{QuoteCache, QuoteSnapshot};
use tokio::sync::broadcast;

/// Snapshots buffered per ticker subscriber before it starts lagging.
const TICKER_CAPACITY: usize = 16;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    pub config: AuroraConfig,
    pub engine: Arc<RelayEngine>,
    pub quotes: Arc<QuoteCache>,
    pub rate_limiter: RateLimiter,
    /// Quote snapshots published after every refresh attempt.
    pub ticker: broadcast::Sender<QuoteSnapshot>,
    connections: AtomicUsize,
}

impl AppState {
    pub fn new(config: AuroraConfig, registry: ProviderRegistry, quotes: Arc<QuoteCache>) -> Self {
        let engine = RelayEngine::new(registry, &config.relay).with_quotes(quotes.clone());
        let rate_limiter = RateLimiter::new(config.relay.min_request_interval);
        let (ticker, _) = broadcast::channel(TICKER_CAPACITY);

        Self {
            config,
            engine: Arc::new(engine),
            quotes,
            rate_limiter,
            ticker,
            connections: AtomicUsize::new(0),
        }
    }

    /// Open WebSocket connections.
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }

    /// Count a connection until the returned guard is dropped.
    pub fn track_connection(self: &Arc<Self>) -> ConnectionGuard {
        self.connections.fetch_add(1, Ordering::Relaxed);
        ConnectionGuard {
            state: self.clone(),
        }
    }

    /// Publish `snapshot` to ticker subscribers, if there are any.
    pub fn publish_quotes(&self, snapshot: QuoteSnapshot) {
        // No receivers is the normal idle case.
        let _ = self.ticker.send(snapshot);
    }
}

pub struct ConnectionGuard {
    state: Arc<AppState>,
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.state.connections.fetch_sub(1, Ordering::Relaxed);
    }
}
