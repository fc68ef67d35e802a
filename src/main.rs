use anyhow::{bail, Context, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use market_decision_engine::acquisition::LiveDataManager;
use market_decision_engine::api::{AlphaVantageClient, DataSource, FinnhubClient, YahooClient};
use market_decision_engine::core::{logging, AppConfig, EngineMetrics, HealthChecker};
use market_decision_engine::strategy::DecisionEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = AppConfig::load()?;

    // Initialize logging
    logging::init_logging(&config.monitoring.log_level, &config.monitoring.log_format);

    tracing::info!("🚀 Market Decision Engine starting...");
    tracing::info!("Version: {}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Config: {}", config.digest());

    let symbols = config.engine.symbols();
    if symbols.is_empty() {
        bail!("engine.watchlist is empty");
    }

    let metrics = Arc::new(EngineMetrics::new().context("Failed to register metrics")?);
    let manager = Arc::new(build_manager(&config, metrics.clone()).await?);
    let engine = DecisionEngine::new(config.risk.clone()).with_metrics(metrics.clone());
    let health_checker = Arc::new(HealthChecker::new());

    // Operational endpoints
    let port = config.monitoring.http_port;
    tokio::spawn(start_http_server(
        health_checker.clone(),
        manager.clone(),
        metrics.clone(),
        port,
    ));
    tracing::info!("✅ Health, connections and metrics endpoints on port {}", port);

    let mut interval =
        tokio::time::interval(Duration::from_secs(config.engine.decision_interval_secs.max(1)));
    loop {
        tokio::select! {
            _ = interval.tick() => {
                run_cycle(&manager, &engine, &symbols, config.engine.history_days).await;
                sync_health(&manager, &health_checker).await;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("🛑 Shutdown requested");
                break;
            }
        }
    }

    Ok(())
}

/// Builds every enabled source from config. Sources without credentials are
/// still registered; they report themselves unavailable and get skipped.
async fn build_manager(config: &AppConfig, metrics: Arc<EngineMetrics>) -> Result<LiveDataManager> {
    let mut manager = LiveDataManager::new(&config.acquisition, metrics);
    let timeout = config.acquisition.attempt_timeout();

    for source in DataSource::ALL {
        let settings = config.sources.get(source);
        if !settings.enabled {
            tracing::info!("⏸️  {} disabled in config", source);
            continue;
        }
        let limit = settings.rate_limit();

        match source {
            DataSource::Finnhub => {
                let client = FinnhubClient::new(
                    &settings.base_url,
                    config.credentials.finnhub_api_key.clone(),
                    timeout,
                )
                .context("Failed to build Finnhub client")?;
                manager.add_source(Arc::new(client), settings.priority, limit).await;
            }
            DataSource::Yahoo => {
                let client = Arc::new(
                    YahooClient::new(&settings.base_url, timeout)
                        .context("Failed to build Yahoo client")?,
                );
                manager.add_source(client.clone(), settings.priority, limit).await;
                manager.add_history_provider(client, settings.priority, limit).await;
            }
            DataSource::AlphaVantage => {
                let client = Arc::new(
                    AlphaVantageClient::new(
                        &settings.base_url,
                        config.credentials.alpha_vantage_api_key.clone(),
                        timeout,
                    )
                    .context("Failed to build Alpha Vantage client")?,
                );
                manager.add_source(client.clone(), settings.priority, limit).await;
                manager.add_history_provider(client, settings.priority, limit).await;
            }
        }
    }

    Ok(manager)
}

/// One pass over the watchlist: quotes all-or-nothing, histories
/// concurrently, then one decision per symbol.
async fn run_cycle(
    manager: &LiveDataManager,
    engine: &DecisionEngine,
    symbols: &[String],
    history_days: u32,
) {
    let quotes = match manager.fetch_quotes(symbols, None).await {
        Ok(quotes) => quotes,
        Err(e) => {
            tracing::error!("❌ Watchlist cycle aborted: {}", e);
            return;
        }
    };

    let histories = join_all(
        symbols
            .iter()
            .map(|symbol| manager.fetch_history(symbol, history_days)),
    )
    .await;

    for (symbol, history) in symbols.iter().zip(histories) {
        let Some(quote) = quotes.get(symbol) else {
            continue;
        };
        let bars = match history {
            Ok(bars) => bars,
            Err(e) => {
                tracing::warn!("⚠️  Skipping decision for {}: {}", symbol, e);
                continue;
            }
        };

        match engine.get_decision(symbol, quote, &bars, None, None, None) {
            Ok(decision) => tracing::debug!("{}: {}", symbol, decision.reasoning),
            Err(e) => tracing::warn!("⚠️  No decision for {}: {}", symbol, e),
        }
    }

    let purged = manager.purge_cache().await;
    if purged > 0 {
        tracing::debug!("🧹 {} cache entries expired", purged);
    }
}

async fn sync_health(manager: &LiveDataManager, health_checker: &HealthChecker) {
    for (source, status) in manager.connection_status().await {
        health_checker
            .update_component(source.as_str(), status.healthy)
            .await;
    }

    let status = health_checker.get_status().await;
    tracing::info!(
        "Engine status: {} (uptime: {}s)",
        status.status,
        status.uptime_seconds
    );
}

async fn start_http_server(
    health_checker: Arc<HealthChecker>,
    manager: Arc<LiveDataManager>,
    metrics: Arc<EngineMetrics>,
    port: u16,
) {
    use warp::Filter;

    let health = warp::path("health")
        .and(warp::any().map(move || health_checker.clone()))
        .and_then(|checker: Arc<HealthChecker>| async move {
            let status = checker.get_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    let connections = warp::path("connections")
        .and(warp::any().map(move || manager.clone()))
        .and_then(|manager: Arc<LiveDataManager>| async move {
            let status = manager.connection_status().await;
            Ok::<_, warp::Rejection>(warp::reply::json(&status))
        });

    let metrics = warp::path("metrics")
        .and(warp::any().map(move || metrics.clone()))
        .map(|metrics: Arc<EngineMetrics>| metrics.render());

    warp::serve(health.or(connections).or(metrics))
        .run(([0, 0, 0, 0], port))
        .await;
}
