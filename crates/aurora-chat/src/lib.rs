//! Provider relay: streams chat replies from external LLM providers.
//!
//! Requests enter through the [`RateLimiter`], are dispatched by the
//! [`RelayEngine`] to a provider from the [`ProviderRegistry`] (failing over
//! once on recoverable errors), and leave as ordered [`ChatChunk`]s.

pub mod cleanup;
pub mod config;
pub mod error;
pub mod intent;
pub mod providers;
pub mod rate_limit;
pub mod relay;
pub mod types;

pub use aurora_core::ProviderKind;
pub use config::ProviderSettings;
pub use error::{ProviderError, ProviderErrorKind, ProviderResult, RelayError};
pub use providers::{FragmentStream, ProviderClient, ProviderRegistry};
pub use rate_limit::RateLimiter;
pub use relay::RelayEngine;
pub use types::*;
