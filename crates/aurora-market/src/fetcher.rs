//! Market-data collaborators.
//!
//! `HttpQuoteFetcher` talks to a Binance-compatible 24h ticker endpoint.
//! Anything else can plug in through [`QuoteFetcher`].

use std::time::Duration;

use async_trait::async_trait;
use aurora_core::QuoteSettings;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::error::QuoteError;
use crate::types::QuoteRecord;

/// Fetches current prices for a set of symbols.
#[async_trait]
pub trait QuoteFetcher: Send + Sync {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<QuoteRecord>, QuoteError>;
}

/// Fetcher for `GET /api/v3/ticker/24hr?symbols=[...]`.
pub struct HttpQuoteFetcher {
    client: Client,
    api_base: String,
    currency: String,
}

impl HttpQuoteFetcher {
    pub fn new(client: Client, api_base: &str, currency: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            currency: currency.to_ascii_uppercase(),
        }
    }

    pub fn from_settings(settings: &QuoteSettings) -> Self {
        let client = Client::builder()
            .timeout(settings.on_demand_timeout.max(Duration::from_secs(10)))
            .build()
            .unwrap_or_default();
        Self::new(client, &settings.api_base, &settings.currency)
    }
}

#[async_trait]
impl QuoteFetcher for HttpQuoteFetcher {
    async fn fetch_quotes(&self, symbols: &[String]) -> Result<Vec<QuoteRecord>, QuoteError> {
        let pairs: Vec<String> = symbols
            .iter()
            .map(|s| format!("{}{}", s.to_ascii_uppercase(), self.currency))
            .collect();
        let pairs_param = serde_json::to_string(&pairs)
            .map_err(|e| QuoteError::Request(e.to_string()))?;

        let url = format!("{}/api/v3/ticker/24hr", self.api_base);
        debug!("Fetching {} quotes from {}", pairs.len(), url);

        let response = self
            .client
            .get(&url)
            .query(&[("symbols", pairs_param)])
            .send()
            .await
            .map_err(|e| QuoteError::Request(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| QuoteError::Request(e.to_string()))?;

        if !status.is_success() {
            return Err(QuoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        parse_ticker_payload(&body, &self.currency)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    last_price: String,
    price_change_percent: String,
    #[serde(default)]
    close_time: Option<i64>,
}

/// Map a 24h ticker array into quote records.
pub fn parse_ticker_payload(body: &str, currency: &str) -> Result<Vec<QuoteRecord>, QuoteError> {
    let tickers: Vec<Ticker24h> =
        serde_json::from_str(body).map_err(|e| QuoteError::Malformed(e.to_string()))?;

    tickers
        .into_iter()
        .map(|t| {
            let price: f64 = t
                .last_price
                .parse()
                .map_err(|_| QuoteError::Malformed(format!("bad price for {}", t.symbol)))?;
            let change_24h: f64 = t.price_change_percent.parse().map_err(|_| {
                QuoteError::Malformed(format!("bad 24h change for {}", t.symbol))
            })?;
            let symbol = t
                .symbol
                .strip_suffix(currency)
                .unwrap_or(&t.symbol)
                .to_string();
            let observed_at = t
                .close_time
                .and_then(DateTime::<Utc>::from_timestamp_millis)
                .unwrap_or_else(Utc::now);
            Ok(QuoteRecord {
                symbol,
                price,
                change_24h,
                observed_at,
            })
        })
        .collect()
}
