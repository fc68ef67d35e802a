use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use super::adapter::{HistoryProvider, SourceAdapter, SourceError};
use super::http::{build_client, get_json};
use super::types::{present, Bar, DataSource, Quote};

pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteEnvelope {
    quote_response: QuoteResponse,
}

#[derive(Debug, Deserialize)]
struct QuoteResponse {
    #[serde(default)]
    result: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct YahooQuote {
    symbol: String,
    regular_market_price: Option<f64>,
    regular_market_volume: Option<f64>,
    regular_market_open: Option<f64>,
    regular_market_day_high: Option<f64>,
    regular_market_day_low: Option<f64>,
    regular_market_previous_close: Option<f64>,
    regular_market_change: Option<f64>,
    regular_market_change_percent: Option<f64>,
    regular_market_time: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartResponse,
}

#[derive(Debug, Deserialize)]
struct ChartResponse {
    #[serde(default)]
    result: Option<Vec<ChartResult>>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: ChartIndicators,
}

#[derive(Debug, Deserialize)]
struct ChartIndicators {
    #[serde(default)]
    quote: Vec<ChartQuote>,
}

#[derive(Debug, Default, Deserialize)]
struct ChartQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

/// Keyless Yahoo Finance client: true batch quotes plus daily chart history.
pub struct YahooClient {
    client: Client,
    base_url: String,
}

impl YahooClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn normalize(raw: YahooQuote) -> Option<Quote> {
        let price = present(raw.regular_market_price)?;
        let mut quote = Quote::new(raw.symbol.to_uppercase(), price, DataSource::Yahoo);
        quote.volume = present(raw.regular_market_volume);
        quote.open = present(raw.regular_market_open);
        quote.high = present(raw.regular_market_day_high);
        quote.low = present(raw.regular_market_day_low);
        quote.previous_close = present(raw.regular_market_previous_close);
        quote.change = raw.regular_market_change.unwrap_or(0.0);
        quote.change_percent = raw.regular_market_change_percent.unwrap_or(0.0);
        quote.timestamp = raw
            .regular_market_time
            .and_then(|t| Utc.timestamp_opt(t, 0).single());
        Some(quote.derive_change())
    }

    /// Zips the column-oriented chart payload into bars, dropping rows with
    /// any missing price field.
    fn bars_from_chart(result: ChartResult) -> Vec<Bar> {
        let q = result.indicators.quote.into_iter().next().unwrap_or_default();
        let mut bars: Vec<Bar> = result
            .timestamp
            .iter()
            .enumerate()
            .filter_map(|(i, ts)| {
                let at = |col: &Vec<Option<f64>>| col.get(i).copied().flatten();
                Some(Bar::new(
                    Utc.timestamp_opt(*ts, 0).single()?,
                    at(&q.open)?,
                    at(&q.high)?,
                    at(&q.low)?,
                    at(&q.close)?,
                    at(&q.volume).unwrap_or(0.0),
                ))
            })
            .collect();
        bars.sort_by_key(|b| b.timestamp);
        bars
    }
}

#[async_trait]
impl SourceAdapter for YahooClient {
    fn id(&self) -> DataSource {
        DataSource::Yahoo
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, SourceError> {
        let mut batch = self.fetch_batch(&[symbol.to_string()]).await?;
        Ok(batch.remove(symbol).flatten())
    }

    async fn fetch_batch(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Option<Quote>>, SourceError> {
        let url = format!("{}/v7/finance/quote", self.base_url);
        let envelope: QuoteEnvelope =
            get_json(&self.client, &url, &[("symbols", symbols.join(","))]).await?;

        let mut out: HashMap<String, Option<Quote>> =
            symbols.iter().map(|s| (s.clone(), None)).collect();
        for raw in envelope.quote_response.result {
            if let Some(quote) = Self::normalize(raw) {
                if let Some(slot) = out.get_mut(&quote.symbol) {
                    *slot = Some(quote);
                }
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl HistoryProvider for YahooClient {
    fn id(&self) -> DataSource {
        DataSource::Yahoo
    }

    fn is_available(&self) -> bool {
        true
    }

    async fn fetch_history(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>, SourceError> {
        let now = Utc::now();
        let start = now - ChronoDuration::days(i64::from(lookback_days));
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);
        let query = [
            ("period1", start.timestamp().to_string()),
            ("period2", now.timestamp().to_string()),
            ("interval", "1d".to_string()),
        ];

        let envelope: ChartEnvelope = match get_json(&self.client, &url, &query).await {
            Ok(envelope) => envelope,
            Err(SourceError::Http { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };

        Ok(envelope
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .map(Self::bars_from_chart)
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_batch_maps_present_and_missing_symbols() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v7/finance/quote"))
            .and(query_param("symbols", "AAPL,MSFT"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "quoteResponse": {
                    "result": [{
                        "symbol": "AAPL",
                        "regularMarketPrice": 150.0,
                        "regularMarketVolume": 1_000_000,
                        "regularMarketOpen": 149.0,
                        "regularMarketDayHigh": 151.0,
                        "regularMarketDayLow": 148.0,
                        "regularMarketPreviousClose": 147.5,
                        "regularMarketChange": 2.5,
                        "regularMarketChangePercent": 1.69,
                        "regularMarketTime": 1_700_000_000
                    }],
                    "error": null
                }
            })))
            .mount(&server)
            .await;

        let client = YahooClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let out = client
            .fetch_batch(&["AAPL".to_string(), "MSFT".to_string()])
            .await
            .unwrap();

        let aapl = out["AAPL"].as_ref().unwrap();
        assert_eq!(aapl.price, 150.0);
        assert_eq!(aapl.volume, Some(1_000_000.0));
        assert_eq!(aapl.source, DataSource::Yahoo);
        assert!(out["MSFT"].is_none());
    }

    #[tokio::test]
    async fn test_history_skips_null_rows() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v8/finance/chart/AAPL"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "chart": {
                    "result": [{
                        "timestamp": [1_700_000_000, 1_700_086_400, 1_700_172_800],
                        "indicators": { "quote": [{
                            "open":   [100.0, null, 102.0],
                            "high":   [101.0, 102.0, 103.0],
                            "low":    [99.0, 100.0, 101.0],
                            "close":  [100.5, 101.5, 102.5],
                            "volume": [1000, 1100, null]
                        }]}
                    }],
                    "error": null
                }
            })))
            .mount(&server)
            .await;

        let client = YahooClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        let bars = client.fetch_history("AAPL", 30).await.unwrap();

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[0].close, 100.5);
        assert_eq!(bars[1].close, 102.5);
        assert_eq!(bars[1].volume, 0.0);
        assert!(bars[0].timestamp < bars[1].timestamp);
    }

    #[tokio::test]
    async fn test_history_unknown_symbol_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_string("Not Found"))
            .mount(&server)
            .await;

        let client = YahooClient::new(&server.uri(), Duration::from_secs(5)).unwrap();
        assert!(client.fetch_history("NOPE", 30).await.unwrap().is_empty());
    }
}
