//! Shared SSE plumbing for the streaming provider APIs.

use std::time::Duration;

use aurora_core::ProviderKind;
use reqwest::RequestBuilder;
use tokio_stream::StreamExt;
use tracing::{debug, error};

use super::FragmentStream;
use crate::error::ProviderError;

/// Longest upstream error body echoed into an error message.
const MAX_ERROR_BODY: usize = 300;

/// One decoded `data:` payload.
#[derive(Debug, PartialEq)]
pub(crate) enum SseEvent {
    Text(String),
    Done,
    Error(String),
    Skip,
}

/// Splits a byte stream into `data:` payloads.
///
/// Bytes are buffered until a full line arrives so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Default)]
pub(crate) struct SseLines {
    buffer: Vec<u8>,
}

impl SseLines {
    pub(crate) fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut payloads = Vec::new();

        while let Some(line_end) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=line_end).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim();

            if line.is_empty() || line.starts_with(':') {
                continue;
            }
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }

        payloads
    }

    /// Any trailing line left when the body ends without a newline.
    pub(crate) fn finish(&mut self) -> Vec<String> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        self.push(b"\n")
    }
}

/// Map a transport error onto the provider taxonomy.
pub(crate) fn request_error(
    provider: ProviderKind,
    e: reqwest::Error,
    timeout: Duration,
) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout {
            provider,
            after: timeout,
        }
    } else {
        ProviderError::upstream(provider, format!("Request failed: {}", e))
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

/// Send `request` and turn its SSE body into text fragments.
///
/// Dropping the returned stream drops the response and abandons the
/// upstream request.
pub(crate) fn sse_fragments(
    provider: ProviderKind,
    request: RequestBuilder,
    timeout: Duration,
    decode: fn(&str) -> SseEvent,
) -> FragmentStream {
    Box::pin(async_stream::stream! {
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                yield Err(request_error(provider, e, timeout));
                return;
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            yield Err(ProviderError::upstream(
                provider,
                format!("API error {}: {}", status, truncate(&body)),
            ));
            return;
        }

        let mut body = response.bytes_stream();
        let mut lines = SseLines::default();

        loop {
            let (payloads, ended) = match body.next().await {
                Some(Ok(bytes)) => (lines.push(&bytes), false),
                Some(Err(e)) => {
                    yield Err(request_error(provider, e, timeout));
                    return;
                }
                None => (lines.finish(), true),
            };

            for data in payloads {
                match decode(&data) {
                    SseEvent::Text(text) => {
                        if !text.is_empty() {
                            yield Ok(text);
                        }
                    }
                    SseEvent::Done => {
                        debug!("{} stream finished", provider);
                        return;
                    }
                    SseEvent::Error(message) => {
                        error!("{} stream error: {}", provider, message);
                        yield Err(ProviderError::upstream(provider, message));
                        return;
                    }
                    SseEvent::Skip => {}
                }
            }

            if ended {
                return;
            }
        }
    })
}
