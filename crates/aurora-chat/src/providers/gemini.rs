//! Google Gemini `streamGenerateContent`.

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

const GEMINI_BASE: &str = "https://generativelanguage.googleapis.com";

pub struct GeminiClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
    system_prompt: String,
    temperature: f64,
    max_tokens: usize,
    timeout: Duration,
}

impl GeminiClient {
    pub fn new(client: Client, settings: &ProviderSettings, timeout: Duration) -> Self {
        Self {
            client,
            base_url: GEMINI_BASE.to_string(),
            api_key: settings.gemini_api_key.clone(),
            model: settings.gemini_model.clone(),
            system_prompt: settings.system_prompt.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
            timeout,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl ProviderClient for GeminiClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn stream_generate(&self, prompt: &str) -> FragmentStream {
        let Some(api_key) = &self.api_key else {
            return failed_stream(ProviderError::missing_key(ProviderKind::Gemini));
        };

        let url = format!(
            "{}/v1beta/models/{}:streamGenerateContent",
            self.base_url.trim_end_matches('/'),
            self.model
        );
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "systemInstruction": {"parts": [{"text": self.system_prompt}]},
            "generationConfig": {
                "temperature": self.temperature,
                "maxOutputTokens": self.max_tokens,
            },
        });

        debug!("Streaming from Gemini with model {}", self.model);

        let request = self
            .client
            .post(url)
            .query(&[("alt", "sse"), ("key", api_key.as_str())])
            .json(&body);

        sse_fragments(ProviderKind::Gemini, request, self.timeout, decode_event)
    }
}

fn decode_event(data: &str) -> SseEvent {
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseEvent::Skip;
    };
    if let Some(message) = parsed["error"]["message"].as_str() {
        return SseEvent::Error(message.to_string());
    }

    let text: String = parsed["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect()
        })
        .unwrap_or_default();

    if text.is_empty() {
        SseEvent::Skip
    } else {
        SseEvent::Text(text)
    }
}

#[cfg(test)]
mod tests {
    use axum::extract::Query;
    use axum::http::header;
    use axum::response::IntoResponse;
    use axum::routing::post;
    use axum::Router;
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_decode_event() {
        assert_eq!(
            decode_event(r#"{"candidates":[{"content":{"parts":[{"text":"a"},{"text":"b"}],"role":"model"}}]}"#),
            SseEvent::Text("ab".into())
        );
        assert_eq!(
            decode_event(r#"{"candidates":[{"finishReason":"STOP"}]}"#),
            SseEvent::Skip
        );
        assert_eq!(
            decode_event(r#"{"error":{"code":429,"message":"quota"}}"#),
            SseEvent::Error("quota".into())
        );
    }

    #[tokio::test]
    async fn test_streams_with_key_in_query() {
        let app = Router::new().route(
            "/v1beta/models/{model}",
            post(|Query(params): Query<HashMap<String, String>>| async move {
                let body = if params.get("key").map(String::as_str) == Some("g-test")
                    && params.get("alt").map(String::as_str) == Some("sse")
                {
                    "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"ok\"}]}}]}\n\n"
                } else {
                    "data: {\"error\":{\"message\":\"bad key\"}}\n\n"
                };
                ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let settings = ProviderSettings {
            gemini_api_key: Some("g-test".into()),
            ..ProviderSettings::default()
        };
        let client = GeminiClient::new(Client::new(), &settings, Duration::from_secs(5))
            .with_base_url(format!("http://{}", addr));

        assert_eq!(client.generate_once("hello").await.unwrap(), "ok");
    }
}
