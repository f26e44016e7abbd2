//! Aurora Core: configuration, provider identifiers and shared errors.

pub mod config;
pub mod error;
pub mod provider;

pub use config::{AuroraConfig, QuoteSettings, RelaySettings};
pub use error::{Error, Result};
pub use provider::ProviderKind;
