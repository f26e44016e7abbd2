//! Process configuration, read once at startup from the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::provider::ProviderKind;

pub const DEFAULT_PORT: u16 = 5000;
pub const DEFAULT_QUOTE_SYMBOLS: &[&str] = &["BTC", "ETH", "SOL", "BNB"];
pub const DEFAULT_QUOTE_API_BASE: &str = "https://api.binance.com";

/// Relay engine and rate limiter settings.
#[derive(Debug, Clone, Serialize)]
pub struct RelaySettings {
    pub default_provider: ProviderKind,
    /// Alternate provider tried once after a recoverable failure.
    pub fallback_provider: Option<ProviderKind>,
    pub min_request_interval: Duration,
    /// Upper bound on connect and inter-fragment waits for one provider call.
    pub provider_timeout: Duration,
    pub text_cleanup: bool,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            default_provider: ProviderKind::Gemini,
            fallback_provider: Some(ProviderKind::OpenAI),
            min_request_interval: Duration::from_millis(1200),
            provider_timeout: Duration::from_secs(60),
            text_cleanup: true,
        }
    }
}

impl RelaySettings {
    /// Ordered provider list: default first, then the fallback if distinct.
    pub fn provider_order(&self) -> Vec<ProviderKind> {
        let mut order = vec![self.default_provider];
        if let Some(fallback) = self.fallback_provider {
            if fallback != self.default_provider {
                order.push(fallback);
            }
        }
        order
    }
}

/// Quote cache and refresh loop settings.
#[derive(Debug, Clone, Serialize)]
pub struct QuoteSettings {
    pub symbols: Vec<String>,
    pub refresh_interval: Duration,
    pub stale_threshold: Duration,
    pub backoff_ceiling: Duration,
    pub backoff_step: Duration,
    pub on_demand_timeout: Duration,
    pub api_base: String,
    /// Quote currency appended to each symbol when querying pairs.
    pub currency: String,
}

impl Default for QuoteSettings {
    fn default() -> Self {
        Self {
            symbols: DEFAULT_QUOTE_SYMBOLS.iter().map(|s| s.to_string()).collect(),
            refresh_interval: Duration::from_secs(60),
            stale_threshold: Duration::from_secs(300),
            backoff_ceiling: Duration::from_secs(120),
            backoff_step: Duration::from_secs(15),
            on_demand_timeout: Duration::from_millis(3000),
            api_base: DEFAULT_QUOTE_API_BASE.to_string(),
            currency: "USDT".to_string(),
        }
    }
}

/// Top-level Aurora configuration.
#[derive(Debug, Clone, Serialize)]
pub struct AuroraConfig {
    /// HTTP server port.
    pub port: u16,
    pub relay: RelaySettings,
    pub quotes: QuoteSettings,
    /// Optional JSON file with provider credentials and models.
    pub provider_config_path: PathBuf,
}

impl Default for AuroraConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            relay: RelaySettings::default(),
            quotes: QuoteSettings::default(),
            provider_config_path: PathBuf::from("data/providers.json"),
        }
    }
}

impl AuroraConfig {
    /// Create configuration from environment and defaults.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary variable lookup.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(port) = get("PORT") {
            config.port = parse_number(&port, "PORT")?;
        }

        let relay = &mut config.relay;
        if let Some(p) = get("AURORA_DEFAULT_PROVIDER") {
            relay.default_provider = p.parse()?;
        }
        if let Some(p) = get("AURORA_FALLBACK_PROVIDER") {
            relay.fallback_provider = match p.trim().to_ascii_lowercase().as_str() {
                "none" | "off" => None,
                other => Some(other.parse()?),
            };
        }
        if let Some(ms) = get("AURORA_MIN_REQUEST_INTERVAL_MS") {
            relay.min_request_interval =
                Duration::from_millis(parse_number(&ms, "AURORA_MIN_REQUEST_INTERVAL_MS")?);
        }
        if let Some(secs) = get("AURORA_PROVIDER_TIMEOUT_SECS") {
            relay.provider_timeout = positive_secs(&secs, "AURORA_PROVIDER_TIMEOUT_SECS")?;
        }
        if let Some(flag) = get("AURORA_TEXT_CLEANUP") {
            relay.text_cleanup = parse_bool(&flag, "AURORA_TEXT_CLEANUP")?;
        }

        let quotes = &mut config.quotes;
        if let Some(symbols) = get("AURORA_QUOTE_SYMBOLS") {
            quotes.symbols = symbols
                .split(',')
                .map(|s| s.trim().to_ascii_uppercase())
                .filter(|s| !s.is_empty())
                .collect();
            if quotes.symbols.is_empty() {
                return Err(Error::Config("AURORA_QUOTE_SYMBOLS is empty".into()));
            }
        }
        if let Some(secs) = get("AURORA_QUOTE_REFRESH_SECS") {
            quotes.refresh_interval = positive_secs(&secs, "AURORA_QUOTE_REFRESH_SECS")?;
        }
        if let Some(secs) = get("AURORA_QUOTE_STALE_SECS") {
            quotes.stale_threshold = positive_secs(&secs, "AURORA_QUOTE_STALE_SECS")?;
        }
        if let Some(secs) = get("AURORA_QUOTE_BACKOFF_CEILING_SECS") {
            quotes.backoff_ceiling = positive_secs(&secs, "AURORA_QUOTE_BACKOFF_CEILING_SECS")?;
        }
        if let Some(secs) = get("AURORA_QUOTE_BACKOFF_STEP_SECS") {
            quotes.backoff_step =
                Duration::from_secs(parse_number(&secs, "AURORA_QUOTE_BACKOFF_STEP_SECS")?);
        }
        if let Some(ms) = get("AURORA_QUOTE_ON_DEMAND_TIMEOUT_MS") {
            quotes.on_demand_timeout =
                Duration::from_millis(parse_number(&ms, "AURORA_QUOTE_ON_DEMAND_TIMEOUT_MS")?);
        }
        if let Some(base) = get("AURORA_QUOTE_API_BASE") {
            quotes.api_base = base.trim_end_matches('/').to_string();
        }
        if let Some(currency) = get("AURORA_QUOTE_CURRENCY") {
            quotes.currency = currency.trim().to_ascii_uppercase();
        }

        if let Some(path) = get("AURORA_PROVIDER_CONFIG") {
            config.provider_config_path = PathBuf::from(path);
        }

        if config.relay.fallback_provider == Some(config.relay.default_provider) {
            tracing::warn!(
                "Fallback provider {} equals the default; failover disabled",
                config.relay.default_provider
            );
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(value: &str, key: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| Error::Config(format!("{} must be a number, got {:?}", key, value)))
}

fn positive_secs(value: &str, key: &str) -> Result<Duration> {
    let secs: u64 = parse_number(value, key)?;
    if secs == 0 {
        return Err(Error::Config(format!("{} must be greater than zero", key)));
    }
    Ok(Duration::from_secs(secs))
}

fn parse_bool(value: &str, key: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::Config(format!("{} must be a boolean, got {:?}", key, value))),
    }
}
