//! Chat types shared by the relay engine and the transport adapters.

use std::fmt;

use aurora_core::ProviderKind;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Inbound chat message as sent by clients.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatInput {
    #[serde(default, alias = "message")]
    pub text: String,
    #[serde(default, rename = "providerHint")]
    pub provider_hint: Option<String>,
}

impl ChatInput {
    /// Turn the input into a request owned by `client_id`.
    ///
    /// Unknown provider hints are ignored.
    pub fn into_request(self, client_id: &str) -> ChatRequest {
        let provider_hint = self
            .provider_hint
            .as_deref()
            .and_then(|hint| match hint.parse::<ProviderKind>() {
                Ok(kind) => Some(kind),
                Err(_) => {
                    debug!("Ignoring unknown provider hint {:?}", hint);
                    None
                }
            });
        ChatRequest::new(client_id, self.text, provider_hint)
    }
}

/// One chat request, from receipt to completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub id: String,
    pub client_id: String,
    pub text: String,
    pub provider_hint: Option<ProviderKind>,
}

impl ChatRequest {
    pub fn new(client_id: &str, text: impl Into<String>, provider_hint: Option<ProviderKind>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: client_id.to_string(),
            text: text.into(),
            provider_hint,
        }
    }
}

/// What a chunk's text represents, so clients can style failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    /// Reply text.
    Text,
    /// Informational message produced by the relay itself.
    Notice,
    /// User-safe failure message.
    Error,
    RateLimited,
}

/// One ordered fragment of a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChunk {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub sequence: u64,
    pub text: String,
    #[serde(rename = "isFinal")]
    pub is_final: bool,
    pub kind: ChunkKind,
}

impl ChatChunk {
    /// A single-chunk reply that ends the request immediately.
    pub fn terminal(request_id: &str, text: impl Into<String>, kind: ChunkKind) -> Self {
        Self {
            request_id: request_id.to_string(),
            sequence: 0,
            text: text.into(),
            is_final: true,
            kind,
        }
    }
}

/// Lifecycle of a relayed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "provider", rename_all = "snake_case")]
pub enum RelayState {
    Received,
    Dispatched(ProviderKind),
    Streaming(ProviderKind),
    FailedOverTo(ProviderKind),
    Completed,
    Exhausted,
    /// The consumer went away before the reply finished.
    Cancelled,
}

impl RelayState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RelayState::Completed | RelayState::Exhausted | RelayState::Cancelled
        )
    }
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayState::Received => write!(f, "received"),
            RelayState::Dispatched(p) => write!(f, "dispatched({})", p),
            RelayState::Streaming(p) => write!(f, "streaming({})", p),
            RelayState::FailedOverTo(p) => write!(f, "failed_over_to({})", p),
            RelayState::Completed => write!(f, "completed"),
            RelayState::Exhausted => write!(f, "exhausted"),
            RelayState::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Complete reply for the one-shot endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct OneShotReply {
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub reply: String,
    pub kind: ChunkKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<ProviderKind>,
    #[serde(skip)]
    pub state: RelayState,
}
