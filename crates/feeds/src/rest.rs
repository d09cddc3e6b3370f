//! REST ticker fetcher.
//!
//! The ticker endpoint returns one JSON object keyed by opaque pair ids:
//! `{"1": {"primary_currency": "THB", "secondary_currency": "BTC",
//! "change": 1.2, "last_price": 1250000, "volume_24hours": 42.1}, ...}`

use crate::{FeedError, QuoteSource};
use async_trait::async_trait;
use pricebell_core::{Quote, QuoteBook};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Feed endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// Ticker endpoint URL.
    pub url: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: "https://bx.in.th/api/".to_string(),
            timeout_secs: 10,
        }
    }
}

/// Fetches all quotes from the ticker endpoint in a single request.
pub struct RestQuoteFetcher {
    client: reqwest::Client,
    url: String,
}

impl RestQuoteFetcher {
    pub fn new(config: &FeedConfig) -> Result<Self, FeedError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.url.clone(),
        })
    }
}

#[async_trait]
impl QuoteSource for RestQuoteFetcher {
    async fn fetch(&self) -> Result<QuoteBook, FeedError> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status.as_u16()));
        }

        let json: serde_json::Value = response.json().await?;
        let book = parse_quotes(&json)?;
        debug!(count = book.len(), "Fetched quotes");
        Ok(book)
    }
}

/// Parse a ticker response into a quote book.
///
/// Entries without both currency symbols are skipped. Numeric fields accept
/// numbers or numeric strings and default to 0 when absent.
pub fn parse_quotes(json: &serde_json::Value) -> Result<QuoteBook, FeedError> {
    let entries = json
        .as_object()
        .ok_or_else(|| FeedError::ParseError("expected a JSON object of pairs".to_string()))?;

    let mut quotes = Vec::with_capacity(entries.len());
    for (id, entry) in entries {
        let (Some(primary), Some(secondary)) = (
            entry["primary_currency"].as_str(),
            entry["secondary_currency"].as_str(),
        ) else {
            warn!(pair_id = %id, "Skipping pair without currency symbols");
            continue;
        };

        quotes.push(Quote::new(
            primary,
            secondary,
            number(&entry["change"]),
            number(&entry["last_price"]),
            number(&entry["volume_24hours"]),
        ));
    }

    Ok(QuoteBook::new(quotes))
}

fn number(value: &serde_json::Value) -> f64 {
    value
        .as_f64()
        .or_else(|| value.as_str().and_then(|s| s.parse::<f64>().ok()))
        .unwrap_or(0.0)
}
