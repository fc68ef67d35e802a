use async_trait::async_trait;
use chrono::Utc;
use market_decision_engine::acquisition::LiveDataManager;
use market_decision_engine::api::{
    DataSource, FinnhubClient, Quote, RateLimitConfig, SourceAdapter, SourceError, YahooClient,
};
use market_decision_engine::core::config::AcquisitionConfig;
use market_decision_engine::core::{EngineError, EngineMetrics};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_test::{assert_err, assert_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Scripted source: serves fresh quotes at a fixed price, or always fails.
struct StubSource {
    id: DataSource,
    price: Option<f64>,
    calls: AtomicUsize,
}

impl StubSource {
    fn serving(id: DataSource, price: f64) -> Self {
        Self { id, price: Some(price), calls: AtomicUsize::new(0) }
    }

    fn failing(id: DataSource) -> Self {
        Self { id, price: None, calls: AtomicUsize::new(0) }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceAdapter for StubSource {
    fn id(&self) -> DataSource {
        self.id
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
        self.calls.fetch_add(1, Ordering::SeqCst);
        let price = self
            .price
            .ok_or_else(|| SourceError::Transport("connection reset".into()))?;

        Ok(symbols
            .iter()
            .map(|s| {
                let mut quote = Quote::new(s.as_str(), price, self.id);
                quote.timestamp = Some(Utc::now());
                (s.clone(), Some(quote))
            })
            .collect())
    }
}

fn fast_config() -> AcquisitionConfig {
    AcquisitionConfig {
        max_retries: 1,
        retry_base_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..Default::default()
    }
}

fn new_manager() -> LiveDataManager {
    LiveDataManager::new(&fast_config(), Arc::new(EngineMetrics::new().unwrap()))
}

#[tokio::test]
async fn unhealthy_primary_fails_over_to_secondary() {
    let a = Arc::new(StubSource::failing(DataSource::Finnhub));
    let b = Arc::new(StubSource::serving(DataSource::Yahoo, 150.0));

    let mut manager = new_manager();
    manager.add_source(a.clone(), 1, RateLimitConfig::default()).await;
    manager.add_source(b.clone(), 2, RateLimitConfig::default()).await;

    // A succeeded once, then tripped the error threshold: unhealthy and
    // still inside its recovery cooldown.
    let monitor = manager.connection_monitor();
    monitor.record_success(DataSource::Finnhub).await;
    for _ in 0..5 {
        monitor
            .record_error(DataSource::Finnhub, &SourceError::Transport("reset".into()))
            .await;
    }
    let before = manager.connection_status().await;
    assert!(!before[&DataSource::Finnhub].healthy);
    assert!(!before[&DataSource::Finnhub].can_retry);

    let quotes = assert_ok!(manager.fetch_quotes(&["AAPL".to_string()], None).await);

    assert_eq!(quotes.len(), 1);
    assert_eq!(quotes["AAPL"].price, 150.0);
    assert_eq!(quotes["AAPL"].source, DataSource::Yahoo);

    let after = manager.connection_status().await;
    assert_eq!(a.calls(), 0);
    assert_eq!(
        after[&DataSource::Finnhub].error_count,
        before[&DataSource::Finnhub].error_count
    );
    assert!(after[&DataSource::Yahoo].last_success.is_some());
    assert!(after[&DataSource::Yahoo].healthy);
}

#[tokio::test]
async fn failing_primary_accumulates_errors_until_unhealthy() {
    let a = Arc::new(StubSource::failing(DataSource::Finnhub));
    let b = Arc::new(StubSource::serving(DataSource::Yahoo, 10.0));

    let mut manager = new_manager();
    manager.add_source(a.clone(), 1, RateLimitConfig::default()).await;
    manager.add_source(b.clone(), 2, RateLimitConfig::default()).await;

    // Distinct symbols so every request misses the cache.
    for i in 0..5 {
        let symbol = format!("SYM{}", i);
        manager.fetch_quotes(&[symbol], None).await.unwrap();
    }

    let status = manager.connection_status().await;
    assert_eq!(status[&DataSource::Finnhub].error_count, 5);
    assert!(!status[&DataSource::Finnhub].healthy);
    // The threshold flip starts the recovery cooldown.
    assert!(!status[&DataSource::Finnhub].can_retry);
    // Transport errors are retried once inside each attempt.
    assert_eq!(a.calls(), 10);
    assert_eq!(b.calls(), 5);
}

#[tokio::test]
async fn every_source_down_is_unsatisfiable() {
    let mut manager = new_manager();
    manager
        .add_source(Arc::new(StubSource::failing(DataSource::Finnhub)), 1, RateLimitConfig::default())
        .await;
    manager
        .add_source(Arc::new(StubSource::failing(DataSource::Yahoo)), 2, RateLimitConfig::default())
        .await;

    let err = assert_err!(
        manager
            .fetch_quotes(&["MSFT".to_string(), "AAPL".to_string()], None)
            .await
    );

    assert_eq!(
        err,
        EngineError::UnsatisfiableRequest {
            symbols: vec!["AAPL".into(), "MSFT".into()]
        }
    );
    assert_eq!(manager.cache().len().await, 0);
}

#[tokio::test]
async fn concurrent_requests_share_cache_and_limits() {
    let source = Arc::new(StubSource::serving(DataSource::Yahoo, 42.0));
    let mut manager = new_manager();
    manager
        .add_source(source.clone(), 1, RateLimitConfig::new(1_000, 60))
        .await;
    let manager = Arc::new(manager);

    // Warm the cache, then hammer it.
    manager.fetch_quotes(&["IBM".to_string()], None).await.unwrap();

    let started = Instant::now();
    let handles: Vec<_> = (0..50)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move { manager.fetch_quotes(&["IBM".to_string()], None).await })
        })
        .collect();

    for handle in handles {
        let quotes = handle.await.unwrap().unwrap();
        assert_eq!(quotes["IBM"].price, 42.0);
    }

    println!("50 cached requests served in {:?}", started.elapsed());
    assert_eq!(source.calls(), 1);
}

fn yahoo_payload(symbol: &str, price: f64) -> serde_json::Value {
    json!({
        "quoteResponse": {
            "result": [{
                "symbol": symbol,
                "regularMarketPrice": price,
                "regularMarketVolume": 2_000_000,
                "regularMarketOpen": price - 1.0,
                "regularMarketDayHigh": price + 1.0,
                "regularMarketDayLow": price - 2.0,
                "regularMarketTime": Utc::now().timestamp()
            }]
        }
    })
}

#[tokio::test]
async fn http_adapters_fail_over_on_server_errors() {
    let finnhub = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/quote"))
        .respond_with(ResponseTemplate::new(503))
        .expect(2)
        .mount(&finnhub)
        .await;

    let yahoo = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v7/finance/quote"))
        .respond_with(ResponseTemplate::new(200).set_body_json(yahoo_payload("AAPL", 187.5)))
        .expect(1)
        .mount(&yahoo)
        .await;

    let timeout = Duration::from_secs(5);
    let finnhub_client =
        FinnhubClient::new(&finnhub.uri(), Some("test-key".into()), timeout).unwrap();
    let yahoo_client = YahooClient::new(&yahoo.uri(), timeout).unwrap();

    let mut manager = new_manager();
    manager
        .add_source(Arc::new(finnhub_client), 1, RateLimitConfig::default())
        .await;
    manager
        .add_source(Arc::new(yahoo_client), 2, RateLimitConfig::default())
        .await;

    let quotes = manager
        .fetch_quotes(&["aapl".to_string()], None)
        .await
        .unwrap();
    assert_eq!(quotes["AAPL"].source, DataSource::Yahoo);
    assert_eq!(quotes["AAPL"].price, 187.5);

    let status = manager.connection_status().await;
    assert_eq!(status[&DataSource::Finnhub].error_count, 1);
    assert!(status[&DataSource::Finnhub]
        .last_error
        .as_deref()
        .unwrap_or_default()
        .contains("503"));
}

#[tokio::test]
async fn keyless_adapter_is_skipped_without_penalty() {
    let finnhub = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&finnhub)
        .await;

    let keyless = FinnhubClient::new(&finnhub.uri(), None, Duration::from_secs(5)).unwrap();
    let mut manager = new_manager();
    manager.add_source(Arc::new(keyless), 1, RateLimitConfig::default()).await;
    manager
        .add_source(Arc::new(StubSource::serving(DataSource::Yahoo, 99.0)), 2, RateLimitConfig::default())
        .await;

    let quotes = assert_ok!(manager.fetch_quotes(&["TSLA".to_string()], None).await);
    assert_eq!(quotes["TSLA"].source, DataSource::Yahoo);
    assert_eq!(manager.connection_status().await[&DataSource::Finnhub].error_count, 0);
}
