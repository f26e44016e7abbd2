//! OpenAI-compatible chat completions (OpenAI, Groq).

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

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const GROQ_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

pub struct OpenAiCompatClient {
    kind: ProviderKind,
    client: Client,
    url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    temperature: f64,
    max_tokens: usize,
    timeout: Duration,
}

impl OpenAiCompatClient {
    pub fn new(kind: ProviderKind, client: Client, settings: &ProviderSettings, timeout: Duration) -> Self {
        let url = match kind {
            ProviderKind::Groq => GROQ_URL,
            _ => OPENAI_URL,
        };
        Self {
            kind,
            client,
            url: url.to_string(),
            api_key: settings.api_key(kind).map(str::to_string),
            model: settings.model(kind).to_string(),
            system_prompt: settings.system_prompt.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
        }
    }

    /// Point the client at a different completions endpoint.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for OpenAiCompatClient {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn stream_generate(&self, prompt: &str) -> FragmentStream {
        let Some(api_key) = &self.api_key else {
            return failed_stream(ProviderError::missing_key(self.kind));
        };

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": prompt},
            ],
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "stream": true,
        });

        debug!("Streaming from {} with model {}", self.url, self.model);

        let request = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body);

        sse_fragments(self.kind, request, self.timeout, decode_event)
    }
}

fn decode_event(data: &str) -> SseEvent {
    if data.trim() == "[DONE]" {
        return SseEvent::Done;
    }
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseEvent::Skip;
    };
    if let Some(message) = parsed["error"]["message"].as_str() {
        return SseEvent::Error(message.to_string());
    }
    match parsed["choices"][0]["delta"]["content"].as_str() {
        Some(content) => SseEvent::Text(content.to_string()),
        None => SseEvent::Skip,
    }
}
