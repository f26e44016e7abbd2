//! Shared fixtures: scripted providers, a static quote feed and app state.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aurora_chat::{FragmentStream, ProviderClient, ProviderError, ProviderKind, ProviderRegistry};
use aurora_core::AuroraConfig;
use aurora_market::{QuoteCache, QuoteError, QuoteFetcher, QuoteRecord};
use aurora_server::AppState;
use chrono::Utc;

/// Provider that replays fixed fragments.
pub struct ScriptedProvider {
    kind: ProviderKind,
    script: Vec<Result<String, ProviderError>>,
    hang: bool,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    pub fn replying(kind: ProviderKind, fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            hang: false,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(kind: ProviderKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: vec![Err(ProviderError::upstream(kind, "API error 502"))],
            hang: false,
            calls: AtomicUsize::new(0),
        })
    }

    /// Sends `fragments`, then never finishes.
    pub fn stalling(kind: ProviderKind, fragments: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            kind,
            script: fragments.iter().map(|f| Ok(f.to_string())).collect(),
            hang: true,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for ScriptedProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        "mock-model"
    }

    fn is_configured(&self) -> bool {
        true
    }

    fn stream_generate(&self, _prompt: &str) -> FragmentStream {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let items = futures::stream::iter(self.script.clone());
        if self.hang {
            return Box::pin(futures::StreamExt::chain(items, futures::stream::pending()));
        }
        Box::pin(items)
    }
}

/// Quote feed with a fixed BTC price.
pub struct StaticFetcher {
    pub calls: AtomicUsize,
}

#[async_trait]
impl QuoteFetcher for StaticFetcher {
    async fn fetch_quotes(&self, _symbols: &[String]) -> Result<Vec<QuoteRecord>, QuoteError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![QuoteRecord {
            symbol: "BTC".into(),
            price: 68000.0,
            change_24h: 1.5,
            observed_at: Utc::now(),
        }])
    }
}

pub struct Fixture {
    pub state: Arc<AppState>,
    pub fetcher: Arc<StaticFetcher>,
}

/// App state with Gemini as default and OpenAI as fallback.
pub fn fixture(providers: &[Arc<ScriptedProvider>], min_interval: Duration) -> Fixture {
    let mut config = AuroraConfig::default();
    config.relay.min_request_interval = min_interval;
    config.quotes.symbols = vec!["BTC".into()];

    let mut registry = ProviderRegistry::new();
    for provider in providers {
        registry.register(provider.clone());
    }

    let fetcher = Arc::new(StaticFetcher {
        calls: AtomicUsize::new(0),
    });
    let quotes = Arc::new(QuoteCache::from_settings(fetcher.clone(), &config.quotes));

    Fixture {
        state: Arc::new(AppState::new(config, registry, quotes)),
        fetcher,
    }
}
