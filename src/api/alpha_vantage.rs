use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use super::adapter::{fetch_each, HistoryProvider, SourceAdapter, SourceError};
use super::http::{build_client, get_json};
use super::types::{present, Bar, DataSource, Quote};

pub const DEFAULT_BASE_URL: &str = "https://www.alphavantage.co";

#[derive(Debug, Deserialize)]
struct GlobalQuote {
    #[serde(rename = "01. symbol")]
    symbol: String,
    #[serde(rename = "02. open", default)]
    open: Option<String>,
    #[serde(rename = "03. high", default)]
    high: Option<String>,
    #[serde(rename = "04. low", default)]
    low: Option<String>,
    #[serde(rename = "05. price", default)]
    price: Option<String>,
    #[serde(rename = "06. volume", default)]
    volume: Option<String>,
    #[serde(rename = "08. previous close", default)]
    previous_close: Option<String>,
    #[serde(rename = "09. change", default)]
    change: Option<String>,
    #[serde(rename = "10. change percent", default)]
    change_percent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DailyBar {
    #[serde(rename = "1. open")]
    open: String,
    #[serde(rename = "2. high")]
    high: String,
    #[serde(rename = "3. low")]
    low: String,
    #[serde(rename = "4. close")]
    close: String,
    #[serde(rename = "5. volume")]
    volume: String,
}

fn num(raw: &Option<String>) -> Option<f64> {
    raw.as_deref()
        .and_then(|s| s.trim().trim_end_matches('%').parse::<f64>().ok())
}

/// Alpha Vantage signals throttling and bad keys with HTTP 200 and a
/// `Note` / `Information` / `Error Message` field instead of the payload.
fn check_envelope(body: &Value) -> Result<(), SourceError> {
    if let Some(note) = body.get("Note").or_else(|| body.get("Information")) {
        let text = note.as_str().unwrap_or_default().to_string();
        let lower = text.to_lowercase();
        if lower.contains("apikey") && lower.contains("invalid") {
            return Err(SourceError::Auth(text));
        }
        return Err(SourceError::RateLimited(text));
    }
    if let Some(msg) = body.get("Error Message") {
        return Err(SourceError::Http {
            status: 400,
            message: msg.as_str().unwrap_or_default().to_string(),
        });
    }
    Ok(())
}

/// Heavily throttled keyed provider. `GLOBAL_QUOTE` carries only a trading
/// day, never an intraday observation time, so quotes leave `timestamp` unset.
pub struct AlphaVantageClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl AlphaVantageClient {
    pub fn new(base_url: &str, api_key: Option<String>, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    async fn query(&self, function: &str, symbol: &str, extra: &[(&str, String)]) -> Result<Value, SourceError> {
        let key = self
            .api_key
            .clone()
            .ok_or_else(|| SourceError::Unavailable("ALPHA_VANTAGE_API_KEY not set".into()))?;

        let mut params = vec![
            ("function", function.to_string()),
            ("symbol", symbol.to_string()),
            ("apikey", key),
        ];
        params.extend(extra.iter().cloned());

        let url = format!("{}/query", self.base_url);
        let body: Value = get_json(&self.client, &url, &params).await?;
        check_envelope(&body)?;
        Ok(body)
    }

    fn normalize(symbol: &str, raw: GlobalQuote) -> Option<Quote> {
        let price = present(num(&raw.price))?;
        let requested = if raw.symbol.is_empty() { symbol } else { raw.symbol.as_str() };
        let mut quote = Quote::new(requested.to_uppercase(), price, DataSource::AlphaVantage);
        quote.open = present(num(&raw.open));
        quote.high = present(num(&raw.high));
        quote.low = present(num(&raw.low));
        quote.volume = present(num(&raw.volume));
        quote.previous_close = present(num(&raw.previous_close));
        quote.change = num(&raw.change).unwrap_or(0.0);
        quote.change_percent = num(&raw.change_percent).unwrap_or(0.0);
        Some(quote.derive_change())
    }
}

#[async_trait]
impl SourceAdapter for AlphaVantageClient {
    fn id(&self) -> DataSource {
        DataSource::AlphaVantage
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, SourceError> {
        let body = self.query("GLOBAL_QUOTE", symbol, &[]).await?;
        let Some(inner) = body.get("Global Quote") else {
            return Err(SourceError::Decode("missing 'Global Quote' object".into()));
        };
        // Unknown symbols come back as an empty object.
        if inner.as_object().map(|o| o.is_empty()).unwrap_or(true) {
            return Ok(None);
        }
        let raw: GlobalQuote =
            serde_json::from_value(inner.clone()).map_err(|e| SourceError::Decode(e.to_string()))?;
        Ok(Self::normalize(symbol, raw))
    }

    async fn fetch_batch(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Option<Quote>>, SourceError> {
        fetch_each(self, symbols).await
    }
}

#[async_trait]
impl HistoryProvider for AlphaVantageClient {
    fn id(&self) -> DataSource {
        DataSource::AlphaVantage
    }

    fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_history(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>, SourceError> {
        let size = if lookback_days > 100 { "full" } else { "compact" };
        let body = self
            .query("TIME_SERIES_DAILY", symbol, &[("outputsize", size.to_string())])
            .await?;

        let Some(series) = body.get("Time Series (Daily)") else {
            return Ok(Vec::new());
        };
        let series: BTreeMap<String, DailyBar> =
            serde_json::from_value(series.clone()).map_err(|e| SourceError::Decode(e.to_string()))?;

        let cutoff = Utc::now().date_naive() - chrono::Duration::days(i64::from(lookback_days));
        let mut bars = Vec::with_capacity(series.len());
        for (day, raw) in series {
            let date = NaiveDate::parse_from_str(&day, "%Y-%m-%d")
                .map_err(|e| SourceError::Decode(format!("bad date {}: {}", day, e)))?;
            if date < cutoff {
                continue;
            }
            let parse = |s: &str| {
                s.parse::<f64>()
                    .map_err(|e| SourceError::Decode(format!("bad number {}: {}", s, e)))
            };
            let Some(at) = date.and_hms_opt(21, 0, 0).map(|dt| Utc.from_utc_datetime(&dt)) else {
                continue;
            };
            bars.push(Bar::new(
                at,
                parse(&raw.open)?,
                parse(&raw.high)?,
                parse(&raw.low)?,
                parse(&raw.close)?,
                parse(&raw.volume)?,
            ));
        }
        // BTreeMap iteration over ISO dates is already chronological.
        Ok(bars)
    }
}
