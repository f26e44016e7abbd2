//! External LLM provider clients.
//!
//! Every backend implements [`ProviderClient`]: a streaming call yielding
//! text fragments and a one-shot call built on top of it. OpenAI and Groq
//! share a wire format; Anthropic and Gemini each have their own.

mod anthropic;
mod gemini;
mod openai;
mod sse;

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use aurora_core::ProviderKind;
use futures::Stream;
use reqwest::Client;
use tokio_stream::StreamExt;
use tracing::info;

pub use anthropic::AnthropicClient;
pub use gemini::GeminiClient;
pub use openai::OpenAiCompatClient;

use crate::config::ProviderSettings;
use crate::error::{ProviderError, ProviderResult};

/// Lazily produced text fragments; finite and not restartable.
///
/// An `Err` item is always the last item.
pub type FragmentStream = Pin<Box<dyn Stream<Item = Result<String, ProviderError>> + Send>>;

/// Uniform interface over text-generation backends.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Whether credentials are present.
    fn is_configured(&self) -> bool;

    /// Start a streaming generation for `prompt`.
    fn stream_generate(&self, prompt: &str) -> FragmentStream;

    /// Generate the full reply for `prompt`.
    async fn generate_once(&self, prompt: &str) -> ProviderResult {
        collect_fragments(self.kind(), self.stream_generate(prompt)).await
    }
}

/// Concatenate a fragment stream into one reply.
pub async fn collect_fragments(provider: ProviderKind, mut stream: FragmentStream) -> ProviderResult {
    let mut full = String::new();
    while let Some(fragment) = stream.next().await {
        full.push_str(&fragment?);
    }
    if full.trim().is_empty() {
        return Err(ProviderError::EmptyResponse { provider });
    }
    Ok(full)
}

/// Stream that immediately fails with `error`.
pub(crate) fn failed_stream(error: ProviderError) -> FragmentStream {
    Box::pin(tokio_stream::once(Err(error)))
}

/// Provider clients keyed by identity, resolved once at startup.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn ProviderClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a client for every known provider.
    ///
    /// Providers without credentials are still registered; they fail with a
    /// config error without touching the network.
    pub fn from_settings(settings: &ProviderSettings, timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(timeout)
            .build()
            .unwrap_or_default();

        let mut registry = Self::new();
        for kind in ProviderKind::all() {
            let provider: Arc<dyn ProviderClient> = match kind {
                ProviderKind::OpenAI | ProviderKind::Groq => Arc::new(OpenAiCompatClient::new(
                    *kind,
                    client.clone(),
                    settings,
                    timeout,
                )),
                ProviderKind::Anthropic => {
                    Arc::new(AnthropicClient::new(client.clone(), settings, timeout))
                }
                ProviderKind::Gemini => Arc::new(GeminiClient::new(client.clone(), settings, timeout)),
            };
            registry.register(provider);
        }

        info!(
            "Provider registry ready (configured: {:?})",
            registry
                .clients
                .values()
                .filter(|c| c.is_configured())
                .map(|c| c.kind())
                .collect::<Vec<_>>()
        );
        registry
    }

    /// Add or replace the client for its provider kind.
    pub fn register(&mut self, client: Arc<dyn ProviderClient>) {
        self.clients.insert(client.kind(), client);
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn ProviderClient>> {
        self.clients.get(&kind).cloned()
    }

    pub fn contains(&self, kind: ProviderKind) -> bool {
        self.clients.contains_key(&kind)
    }

    pub fn is_configured(&self, kind: ProviderKind) -> bool {
        self.clients.get(&kind).is_some_and(|c| c.is_configured())
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_collect_fragments() {
        let ok: FragmentStream = Box::pin(tokio_stream::iter(vec![
            Ok("Hel".to_string()),
            Ok("lo".to_string()),
        ]));
        assert_eq!(collect_fragments(ProviderKind::Groq, ok).await.unwrap(), "Hello");

        let blank: FragmentStream = Box::pin(tokio_stream::iter(vec![Ok("  ".to_string())]));
        let err = collect_fragments(ProviderKind::Groq, blank).await.unwrap_err();
        assert_eq!(err.kind(), crate::ProviderErrorKind::EmptyResponse);
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_without_network() {
        let registry =
            ProviderRegistry::from_settings(&ProviderSettings::default(), Duration::from_secs(5));
        assert_eq!(registry.len(), ProviderKind::all().len());

        for kind in ProviderKind::all() {
            assert!(!registry.is_configured(*kind));
            let client = registry.get(*kind).unwrap();
            let err = client.generate_once("hi").await.unwrap_err();
            assert_eq!(err.kind(), crate::ProviderErrorKind::Config);
            assert_eq!(err.provider(), *kind);
        }
    }
}
