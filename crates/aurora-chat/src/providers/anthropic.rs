//! Anthropic Messages API.

use std::time::Duration;

use async_trait::async_trait;
use aurora_core::ProviderKind;
use reqwest::Client;
use serde_json::json;
use tracing::debug;

use super::sse::{sse_fragments, SseEvent};
use super::{failed_stream, FragmentStream, ProviderClient};
use crate::config::ProviderSettings;
use crate::error::ProviderError;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

pub struct AnthropicClient {
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    temperature: f64,
    max_tokens: usize,
    timeout: Duration,
}

impl AnthropicClient {
    pub fn new(client: Client, settings: &ProviderSettings, timeout: Duration) -> Self {
        Self {
            client,
            url: ANTHROPIC_URL.to_string(),
            api_key: settings.anthropic_api_key.clone(),
            model: settings.anthropic_model.clone(),
            system_prompt: settings.system_prompt.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for AnthropicClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn stream_generate(&self, prompt: &str) -> FragmentStream {
        let Some(api_key) = &self.api_key else {
            return failed_stream(ProviderError::missing_key(ProviderKind::Anthropic));
        };

        let body = json!({
            "model": self.model,
            "system": self.system_prompt,
            "messages": [{"role": "user", "content": prompt}],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        debug!("Streaming from Anthropic with model {}", self.model);

        let request = self
            .client
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&body);

        sse_fragments(ProviderKind::Anthropic, request, self.timeout, decode_event)
    }
}

fn decode_event(data: &str) -> SseEvent {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseEvent::Skip;
    };
    match parsed["type"].as_str() {
        Some("content_block_delta") => match parsed["delta"]["text"].as_str() {
            Some(text) => SseEvent::Text(text.to_string()),
            None => SseEvent::Skip,
        },
        Some("message_stop") => SseEvent::Done,
        Some("error") => SseEvent::Error(
            parsed["error"]["message"]
                .as_str()
                .unwrap_or("unknown error")
                .to_string(),
        ),
        _ => SseEvent::Skip,
    }
}
