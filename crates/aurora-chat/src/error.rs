//! Provider and relay errors.

use std::time::Duration;

use aurora_core::ProviderKind;
use serde::Serialize;
use thiserror::Error;

/// Coarse classification used for failover decisions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderErrorKind {
    Config,
    Upstream,
    Timeout,
    EmptyResponse,
}

#[derive(Error, Debug, Clone)]
pub enum ProviderError {
    #[error("{provider} is not configured: {message}")]
    Config {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} upstream error: {message}")]
    Upstream {
        provider: ProviderKind,
        message: String,
    },

    #[error("{provider} timed out after {after:?}")]
    Timeout {
        provider: ProviderKind,
        after: Duration,
    },

    #[error("{provider} returned an empty response")]
    EmptyResponse { provider: ProviderKind },
}

impl ProviderError {
    pub fn missing_key(provider: ProviderKind) -> Self {
        Self::Config {
            provider,
            message: "no API key".into(),
        }
    }

    pub fn upstream(provider: ProviderKind, message: impl Into<String>) -> Self {
        Self::Upstream {
            provider,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ProviderErrorKind {
        match self {
            ProviderError::Config { .. } => ProviderErrorKind::Config,
            ProviderError::Upstream { .. } => ProviderErrorKind::Upstream,
            ProviderError::Timeout { .. } => ProviderErrorKind::Timeout,
            ProviderError::EmptyResponse { .. } => ProviderErrorKind::EmptyResponse,
        }
    }

    pub fn provider(&self) -> ProviderKind {
        match self {
            ProviderError::Config { provider, .. }
            | ProviderError::Upstream { provider, .. }
            | ProviderError::Timeout { provider, .. }
            | ProviderError::EmptyResponse { provider } => *provider,
        }
    }
}

/// Outcome of a one-shot provider call.
pub type ProviderResult = Result<String, ProviderError>;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Request {0} is already in flight")]
    DuplicateRequest(String),
}
