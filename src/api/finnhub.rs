use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::adapter::{fetch_each, SourceAdapter, SourceError};
use super::http::{build_client, get_json};
use super::types::{present, DataSource, Quote};

pub const DEFAULT_BASE_URL: &str = "https://finnhub.io";

/// `/api/v1/quote` payload. Finnhub answers unknown symbols with all zeros.
#[derive(Debug, Deserialize)]
struct FinnhubQuote {
    #[serde(default)]
    c: Option<f64>,
    #[serde(default)]
    d: Option<f64>,
    #[serde(default)]
    dp: Option<f64>,
    #[serde(default)]
    h: Option<f64>,
    #[serde(default)]
    l: Option<f64>,
    #[serde(default)]
    o: Option<f64>,
    #[serde(default)]
    pc: Option<f64>,
    #[serde(default)]
    t: Option<i64>,
}

pub struct FinnhubClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl FinnhubClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    fn normalize(symbol: &str, raw: FinnhubQuote) -> Option<Quote> {
        let price = present(raw.c)?;
        let mut quote = Quote::new(symbol, price, DataSource::Finnhub);
        quote.open = present(raw.o);
        quote.high = present(raw.h);
        quote.low = present(raw.l);
        quote.previous_close = present(raw.pc);
        quote.change = raw.d.unwrap_or(0.0);
        quote.change_percent = raw.dp.unwrap_or(0.0);
        quote.timestamp = raw
            .t
            .filter(|t| *t > 0)
            .and_then(|t| Utc.timestamp_opt(t, 0).single());
        Some(quote.derive_change())
    }
}

#[async_trait]
impl SourceAdapter for FinnhubClient {
    fn id(&self) -> DataSource {
        DataSource::Finnhub
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, SourceError> {
        let token = self
            .api_key
            .clone()
            .ok_or_else(|| SourceError::Unavailable("FINNHUB_API_KEY not set".into()))?;

        let url = format!("{}/api/v1/quote", self.base_url);
        let raw: FinnhubQuote = get_json(
            &self.client,
            &url,
            &[("symbol", symbol.to_string()), ("token", token)],
        )
        .await?;

        Ok(Self::normalize(symbol, raw))
    }

    async fn fetch_batch(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Option<Quote>>, SourceError> {
        fetch_each(self, symbols).await
    }
}
