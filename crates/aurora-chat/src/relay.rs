//! Relay engine: dispatches a chat request to a provider and streams the
//! reply back as ordered chunks, failing over once on recoverable errors.
//!
//! Lifecycle per request:
//!
//! ```text
//! Received -> Dispatched(p) -> Streaming(p) -> Completed
//!                           \-> FailedOverTo(q) -> Streaming(q) -> Completed
//!                                                \-> Exhausted
//! ```
//!
//! plus `Cancelled` whenever the consumer drops its receiver.

use std::sync::Arc;
use std::time::Duration;

use aurora_core::{ProviderKind, RelaySettings};
use aurora_market::QuoteCache;
use dashmap::DashSet;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::cleanup::{clean_text, TextCleaner};
use crate::error::{ProviderError, ProviderErrorKind, RelayError};
use crate::intent::price_reply;
use crate::providers::{ProviderClient, ProviderRegistry};
use crate::types::{ChatChunk, ChatRequest, ChunkKind, OneShotReply, RelayState};

pub const EMPTY_PROMPT_NOTICE: &str = "Please type a message and I'll do my best to help.";
pub const NOT_CONFIGURED_NOTICE: &str =
    "No AI provider is configured right now. Please try again later.";
pub const UPSTREAM_FAILED_NOTICE: &str =
    "The AI service is having trouble right now. Please try again in a moment.";
pub const TIMEOUT_NOTICE: &str = "The AI service took too long to respond. Please try again.";
pub const EMPTY_REPLY_NOTICE: &str =
    "Sorry, I couldn't come up with an answer to that. Could you rephrase it?";
pub const INTERRUPTED_NOTE: &str = "\n\n(The reply was interrupted. Please try again.)";
pub const RATE_LIMITED_NOTICE: &str =
    "You're sending messages too quickly. Please wait a moment and try again.";
pub const BUSY_NOTICE: &str =
    "Still working on your previous message. Please wait for it to finish.";

/// At most the first choice plus one failover.
const MAX_ATTEMPTS: usize = 2;

/// User-safe message for a request that ran out of providers.
///
/// Config errors only decide the message when nothing else went wrong, so a
/// real outage on the default provider is not reported as "not configured"
/// just because the fallback has no key.
fn failure_notice(errors: &[ProviderError]) -> (&'static str, ChunkKind) {
    let decisive = errors
        .iter()
        .rev()
        .find(|e| e.kind() != ProviderErrorKind::Config)
        .or(errors.last());

    match decisive.map(|e| e.kind()) {
        None | Some(ProviderErrorKind::Config) => (NOT_CONFIGURED_NOTICE, ChunkKind::Notice),
        Some(ProviderErrorKind::Upstream) => (UPSTREAM_FAILED_NOTICE, ChunkKind::Error),
        Some(ProviderErrorKind::Timeout) => (TIMEOUT_NOTICE, ChunkKind::Error),
        Some(ProviderErrorKind::EmptyResponse) => (EMPTY_REPLY_NOTICE, ChunkKind::Notice),
    }
}

/// Numbers and sends the chunks of one reply.
struct ChunkEmitter<'a> {
    tx: &'a mpsc::Sender<ChatChunk>,
    request_id: &'a str,
    sequence: u64,
}

impl<'a> ChunkEmitter<'a> {
    fn new(tx: &'a mpsc::Sender<ChatChunk>, request_id: &'a str) -> Self {
        Self {
            tx,
            request_id,
            sequence: 0,
        }
    }

    /// Returns `false` once the consumer is gone.
    async fn send(&mut self, text: String, kind: ChunkKind, is_final: bool) -> bool {
        let chunk = ChatChunk {
            request_id: self.request_id.to_string(),
            sequence: self.sequence,
            text,
            is_final,
            kind,
        };
        self.sequence += 1;
        self.tx.send(chunk).await.is_ok()
    }

    async fn closed(&self) {
        self.tx.closed().await
    }
}

/// How one provider attempt ended.
enum Attempt {
    Completed,
    Cancelled,
    /// Nothing reached the consumer; another provider may be tried.
    Failed(ProviderError),
    /// Part of the reply was already sent.
    FailedAfterOutput(ProviderError),
}

/// Removes a request id from the in-flight set when the request ends.
struct InFlightGuard<'a> {
    in_flight: &'a DashSet<String>,
    request_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.in_flight.remove(&self.request_id);
    }
}

pub struct RelayEngine {
    registry: ProviderRegistry,
    order: Vec<ProviderKind>,
    provider_timeout: Duration,
    text_cleanup: bool,
    quotes: Option<Arc<QuoteCache>>,
    in_flight: DashSet<String>,
}

impl RelayEngine {
    pub fn new(registry: ProviderRegistry, settings: &RelaySettings) -> Self {
        Self {
            registry,
            order: settings.provider_order(),
            provider_timeout: settings.provider_timeout,
            text_cleanup: settings.text_cleanup,
            quotes: None,
            in_flight: DashSet::new(),
        }
    }

    /// Answer short price questions from `quotes` without calling a provider.
    pub fn with_quotes(mut self, quotes: Arc<QuoteCache>) -> Self {
        self.quotes = Some(quotes);
        self
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn default_provider(&self) -> Option<ProviderKind> {
        self.order.first().copied()
    }

    /// Number of requests currently being relayed.
    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Providers to try, in order: the hint if registered, then the
    /// configured order. Never more than one failover.
    pub fn plan(&self, hint: Option<ProviderKind>) -> Vec<ProviderKind> {
        let mut plan = Vec::with_capacity(MAX_ATTEMPTS);
        for kind in hint.into_iter().chain(self.order.iter().copied()) {
            if plan.len() == MAX_ATTEMPTS {
                break;
            }
            if !plan.contains(&kind) && self.registry.contains(kind) {
                plan.push(kind);
            }
        }
        plan
    }

    fn track(&self, request_id: &str) -> Result<InFlightGuard<'_>, RelayError> {
        if !self.in_flight.insert(request_id.to_string()) {
            return Err(RelayError::DuplicateRequest(request_id.to_string()));
        }
        Ok(InFlightGuard {
            in_flight: &self.in_flight,
            request_id: request_id.to_string(),
        })
    }

    fn quick_reply(&self, text: &str) -> Option<String> {
        let quotes = self.quotes.as_ref()?;
        price_reply(text, &quotes.read())
    }

    /// Relay `request`, sending its chunks to `tx`.
    ///
    /// Exactly one chunk has `is_final` set and it is the last one sent,
    /// unless the consumer goes away first. Dropping the receiver cancels
    /// the upstream call.
    pub async fn run(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<ChatChunk>,
    ) -> Result<RelayState, RelayError> {
        let _guard = self.track(&request.id)?;
        let mut out = ChunkEmitter::new(&tx, &request.id);
        debug!("Request {} {}", request.id, RelayState::Received);

        if request.text.trim().is_empty() {
            return Ok(self
                .finish(&mut out, EMPTY_PROMPT_NOTICE.into(), ChunkKind::Notice, RelayState::Completed)
                .await);
        }

        if let Some(reply) = self.quick_reply(&request.text) {
            debug!("Request {} answered from quote cache", request.id);
            return Ok(self
                .finish(&mut out, reply, ChunkKind::Text, RelayState::Completed)
                .await);
        }

        let mut errors = Vec::new();
        for (attempt, kind) in self.plan(request.provider_hint).into_iter().enumerate() {
            let Some(provider) = self.registry.get(kind) else {
                continue;
            };
            let state = if attempt == 0 {
                RelayState::Dispatched(kind)
            } else {
                RelayState::FailedOverTo(kind)
            };
            debug!("Request {} {}", request.id, state);

            match self.stream_from(provider.as_ref(), &request, &mut out).await {
                Attempt::Completed => {
                    info!("Request {} completed by {}", request.id, kind);
                    return Ok(RelayState::Completed);
                }
                Attempt::Cancelled => {
                    info!("Request {} cancelled by consumer", request.id);
                    return Ok(RelayState::Cancelled);
                }
                Attempt::FailedAfterOutput(e) => {
                    warn!("Request {} interrupted mid-reply: {}", request.id, e);
                    return Ok(self
                        .finish(&mut out, INTERRUPTED_NOTE.into(), ChunkKind::Error, RelayState::Exhausted)
                        .await);
                }
                Attempt::Failed(e) => {
                    warn!("Request {} failed on {}: {}", request.id, kind, e);
                    errors.push(e);
                }
            }
        }

        let (notice, kind) = failure_notice(&errors);
        Ok(self
            .finish(&mut out, notice.into(), kind, RelayState::Exhausted)
            .await)
    }

    /// Send the final chunk and settle on `state`.
    async fn finish(
        &self,
        out: &mut ChunkEmitter<'_>,
        text: String,
        kind: ChunkKind,
        state: RelayState,
    ) -> RelayState {
        let state = if out.send(text, kind, true).await {
            state
        } else {
            RelayState::Cancelled
        };
        debug!("Request {} {}", out.request_id, state);
        state
    }

    async fn stream_from(
        &self,
        provider: &dyn ProviderClient,
        request: &ChatRequest,
        out: &mut ChunkEmitter<'_>,
    ) -> Attempt {
        let kind = provider.kind();
        let mut stream = provider.stream_generate(&request.text);
        let mut cleaner = self.text_cleanup.then(TextCleaner::new);
        let mut emitted = false;

        let failed = |emitted: bool, e: ProviderError| {
            if emitted {
                Attempt::FailedAfterOutput(e)
            } else {
                Attempt::Failed(e)
            }
        };

        loop {
            let next = tokio::select! {
                _ = out.closed() => return Attempt::Cancelled,
                next = tokio::time::timeout(self.provider_timeout, stream.next()) => next,
            };

            let fragment = match next {
                Err(_) => {
                    return failed(
                        emitted,
                        ProviderError::Timeout {
                            provider: kind,
                            after: self.provider_timeout,
                        },
                    )
                }
                Ok(None) => break,
                Ok(Some(Err(e))) => return failed(emitted, e),
                Ok(Some(Ok(fragment))) => fragment,
            };

            let text = match cleaner.as_mut() {
                Some(cleaner) => cleaner.push(&fragment),
                None => fragment,
            };
            if text.is_empty() || (!emitted && text.trim().is_empty()) {
                continue;
            }
            if !emitted {
                debug!("Request {} {}", request.id, RelayState::Streaming(kind));
                emitted = true;
            }
            if !out.send(text, ChunkKind::Text, false).await {
                return Attempt::Cancelled;
            }
        }

        let tail = cleaner.as_mut().map(TextCleaner::finish).unwrap_or_default();
        if !emitted && tail.trim().is_empty() {
            return Attempt::Failed(ProviderError::EmptyResponse { provider: kind });
        }
        if out.send(tail, ChunkKind::Text, true).await {
            Attempt::Completed
        } else {
            Attempt::Cancelled
        }
    }

    /// Produce the whole reply at once, with the same provider plan and
    /// failover as [`RelayEngine::run`].
    pub async fn complete(&self, request: ChatRequest) -> Result<OneShotReply, RelayError> {
        let _guard = self.track(&request.id)?;
        let reply = |text: String, kind: ChunkKind, provider: Option<ProviderKind>, state| OneShotReply {
            request_id: request.id.clone(),
            reply: text,
            kind,
            provider,
            state,
        };

        if request.text.trim().is_empty() {
            return Ok(reply(EMPTY_PROMPT_NOTICE.into(), ChunkKind::Notice, None, RelayState::Completed));
        }
        if let Some(text) = self.quick_reply(&request.text) {
            return Ok(reply(text, ChunkKind::Text, None, RelayState::Completed));
        }

        let mut errors = Vec::new();
        for kind in self.plan(request.provider_hint) {
            let Some(provider) = self.registry.get(kind) else {
                continue;
            };
            debug!("Request {} one-shot via {}", request.id, kind);

            let result = match tokio::time::timeout(self.provider_timeout, provider.generate_once(&request.text)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::Timeout {
                    provider: kind,
                    after: self.provider_timeout,
                }),
            };

            match result {
                Ok(text) => {
                    let text = if self.text_cleanup { clean_text(&text) } else { text };
                    let text = text.trim();
                    if text.is_empty() {
                        errors.push(ProviderError::EmptyResponse { provider: kind });
                        continue;
                    }
                    info!("Request {} completed by {}", request.id, kind);
                    return Ok(reply(text.to_string(), ChunkKind::Text, Some(kind), RelayState::Completed));
                }
                Err(e) => {
                    warn!("Request {} failed on {}: {}", request.id, kind, e);
                    errors.push(e);
                }
            }
        }

        let (notice, kind) = failure_notice(&errors);
        Ok(reply(notice.into(), kind, None, RelayState::Exhausted))
    }
}
