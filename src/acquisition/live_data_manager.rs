use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use super::cache::QuoteCache;
use super::quality::DataQualityValidator;
use crate::api::retry::with_backoff;
use crate::api::{
    Bar, ConnectionMonitor, DataSource, HistoryProvider, Quote, RateLimitConfig, RateLimiter,
    RetryPolicy, SourceAdapter, SourceError, SourceStatus,
};
use crate::core::config::{AcquisitionConfig, DEFAULT_REQUEST_DEADLINE_SECS};
use crate::core::{EngineError, EngineMetrics, QualityRejection};

struct RegisteredSource {
    adapter: Arc<dyn SourceAdapter>,
    priority: u8,
}

struct RegisteredHistory {
    provider: Arc<dyn HistoryProvider>,
    priority: u8,
}

/// Why a source was passed over for this attempt. Skips never count against
/// source health.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Gate {
    Open,
    Unavailable,
    Cooling,
    Throttled,
}

/// Multi-source acquisition with failover under the live-only contract:
/// a request either gets fresh data for every symbol or fails naming the
/// symbols nobody could serve.
pub struct LiveDataManager {
    sources: Vec<RegisteredSource>,
    history: Vec<RegisteredHistory>,
    rate_limiter: RateLimiter,
    monitor: ConnectionMonitor,
    cache: QuoteCache,
    validator: DataQualityValidator,
    retry: RetryPolicy,
    attempt_timeout: Duration,
    request_deadline: Duration,
    metrics: Arc<EngineMetrics>,
}

impl LiveDataManager {
    pub fn new(config: &AcquisitionConfig, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            sources: Vec::new(),
            history: Vec::new(),
            rate_limiter: RateLimiter::new(),
            monitor: ConnectionMonitor::new(config.error_threshold, config.recovery_cooldown()),
            cache: QuoteCache::new(config.cache_ttl()),
            validator: DataQualityValidator::new(config.missing_timestamp_expired),
            retry: config.retry_policy(),
            attempt_timeout: config.attempt_timeout(),
            request_deadline: config.request_deadline(),
            metrics,
        }
    }

    /// Registers a quote source. Lower priority values are tried first;
    /// equal priorities keep registration order.
    pub async fn add_source(
        &mut self,
        adapter: Arc<dyn SourceAdapter>,
        priority: u8,
        limit: RateLimitConfig,
    ) {
        let id = adapter.id();
        self.rate_limiter.configure(id, limit).await;
        self.sources.push(RegisteredSource { adapter, priority });
        self.sources.sort_by_key(|s| s.priority);
        tracing::info!("📡 Registered quote source {} (priority {})", id, priority);
    }

    /// History providers share the rate-limit window of the quote source
    /// with the same id.
    pub async fn add_history_provider(
        &mut self,
        provider: Arc<dyn HistoryProvider>,
        priority: u8,
        limit: RateLimitConfig,
    ) {
        let id = provider.id();
        self.rate_limiter.configure(id, limit).await;
        self.history.push(RegisteredHistory { provider, priority });
        self.history.sort_by_key(|h| h.priority);
        tracing::info!("📚 Registered history provider {} (priority {})", id, priority);
    }

    pub fn connection_monitor(&self) -> &ConnectionMonitor {
        &self.monitor
    }

    pub fn cache(&self) -> &QuoteCache {
        &self.cache
    }

    /// All-or-nothing quote fetch. `deadline` bounds the whole request and
    /// defaults to the configured request deadline.
    pub async fn fetch_quotes(
        &self,
        symbols: &[String],
        deadline: Option<Duration>,
    ) -> Result<HashMap<String, Quote>, EngineError> {
        let symbols = normalize_symbols(symbols)?;
        let deadline_at = self.deadline_from_now(deadline.unwrap_or(self.request_deadline));

        let mut result = HashMap::with_capacity(symbols.len());
        let mut remaining = Vec::new();
        for symbol in symbols {
            match self.cache.get_fresh(&symbol).await {
                Some(entry) => {
                    result.insert(symbol, entry.quote.clone());
                }
                None => remaining.push(symbol),
            }
        }
        self.metrics.record_cache(result.len(), remaining.len());

        if remaining.is_empty() {
            tracing::debug!("💾 Served {} quote(s) from cache", result.len());
            return Ok(result);
        }

        for registered in &self.sources {
            if remaining.is_empty() {
                break;
            }
            let adapter = &registered.adapter;
            let id = adapter.id();

            if self.gate(id, adapter.is_available()).await != Gate::Open {
                continue;
            }

            let Some(budget) = self.attempt_budget(deadline_at) else {
                tracing::warn!("⏰ Request deadline reached before trying {}", id);
                break;
            };

            let pending: &[String] = &remaining;
            let started = std::time::Instant::now();
            let outcome = tokio::time::timeout(
                budget,
                with_backoff(&self.retry, id, || adapter.fetch_batch(pending)),
            )
            .await
            .unwrap_or(Err(SourceError::Timeout(budget)));
            let elapsed = started.elapsed().as_secs_f64();

            let batch = match outcome {
                Ok(batch) => {
                    self.metrics.record_source_call(id, "success", elapsed);
                    self.monitor.record_success(id).await;
                    batch
                }
                Err(e) => {
                    self.metrics.record_source_call(id, outcome_label(&e), elapsed);
                    tracing::warn!("❌ {} failed for {:?}: {}", id, remaining, e);
                    self.monitor.record_error(id, &e).await;
                    continue;
                }
            };

            let satisfied = self.accept_batch(id, batch, &remaining, &mut result).await;
            if !satisfied.is_empty() {
                tracing::info!("✅ {} satisfied {:?}", id, satisfied);
                remaining.retain(|s| !satisfied.contains(s));
            }
        }

        if remaining.is_empty() {
            Ok(result)
        } else {
            self.metrics.record_unsatisfied();
            let err = EngineError::unsatisfiable(remaining);
            tracing::error!("🚫 {}", err);
            Err(err)
        }
    }

    /// Daily bars for `symbol`, oldest first, from the first history provider
    /// that has any.
    pub async fn fetch_history(
        &self,
        symbol: &str,
        lookback_days: u32,
    ) -> Result<Vec<Bar>, EngineError> {
        let symbol = normalize_symbol(symbol)?;
        if lookback_days == 0 {
            return Err(EngineError::DegenerateInput(
                "history lookback must be at least one day".into(),
            ));
        }
        let deadline_at = self.deadline_from_now(self.request_deadline);

        for registered in &self.history {
            let provider = &registered.provider;
            let id = provider.id();

            if self.gate(id, provider.is_available()).await != Gate::Open {
                continue;
            }
            let Some(budget) = self.attempt_budget(deadline_at) else {
                break;
            };

            let started = std::time::Instant::now();
            let outcome = tokio::time::timeout(
                budget,
                with_backoff(&self.retry, id, || {
                    provider.fetch_history(&symbol, lookback_days)
                }),
            )
            .await
            .unwrap_or(Err(SourceError::Timeout(budget)));
            let elapsed = started.elapsed().as_secs_f64();

            match outcome {
                Ok(bars) => {
                    self.metrics.record_source_call(id, "success", elapsed);
                    self.monitor.record_success(id).await;
                    if bars.is_empty() {
                        tracing::debug!("📭 {} has no history for {}", id, symbol);
                        continue;
                    }
                    tracing::debug!("📈 {} returned {} bars for {}", id, bars.len(), symbol);
                    return Ok(bars);
                }
                Err(e) => {
                    self.metrics.record_source_call(id, outcome_label(&e), elapsed);
                    tracing::warn!("❌ {} history failed for {}: {}", id, symbol, e);
                    self.monitor.record_error(id, &e).await;
                }
            }
        }

        self.metrics.record_unsatisfied();
        let err = EngineError::unsatisfiable([symbol]);
        tracing::error!("🚫 {}", err);
        Err(err)
    }

    /// Health snapshot of every registered source.
    pub async fn connection_status(&self) -> BTreeMap<DataSource, SourceStatus> {
        let ids: HashSet<DataSource> = self
            .sources
            .iter()
            .map(|s| s.adapter.id())
            .chain(self.history.iter().map(|h| h.provider.id()))
            .collect();

        let mut status = BTreeMap::new();
        for id in ids {
            let mut source_status = self.monitor.status(id).await;
            source_status.rate_limit_remaining = self.rate_limiter.remaining(id).await;
            status.insert(id, source_status);
        }
        status
    }

    pub async fn purge_cache(&self) -> usize {
        self.cache.purge_expired().await
    }

    async fn gate(&self, id: DataSource, available: bool) -> Gate {
        if !available {
            tracing::debug!("⏭️  Skipping {}: no credentials provisioned", id);
            return Gate::Unavailable;
        }
        let recovering = !self.monitor.is_healthy(id).await;
        if recovering && !self.monitor.can_retry(id).await {
            tracing::warn!("⏭️  Skipping {}: unhealthy and cooling down", id);
            return Gate::Cooling;
        }
        if !self.rate_limiter.allow(id).await {
            tracing::warn!("⏭️  Skipping {}: rate limit reached", id);
            return Gate::Throttled;
        }
        if recovering {
            self.monitor.start_recovery(id).await;
        }
        Gate::Open
    }

    /// Falls back to the configured deadline, then the default one, when
    /// `deadline` is too large to add to the clock.
    fn deadline_from_now(&self, deadline: Duration) -> tokio::time::Instant {
        let now = tokio::time::Instant::now();
        now.checked_add(deadline)
            .or_else(|| now.checked_add(self.request_deadline))
            .unwrap_or_else(|| now + Duration::from_secs(DEFAULT_REQUEST_DEADLINE_SECS))
    }

    fn attempt_budget(&self, deadline_at: tokio::time::Instant) -> Option<Duration> {
        let left = deadline_at.saturating_duration_since(tokio::time::Instant::now());
        if left.is_zero() {
            None
        } else {
            Some(left.min(self.attempt_timeout))
        }
    }

    /// Validates and caches what one completed call returned. Returns the
    /// symbols it satisfied.
    async fn accept_batch(
        &self,
        id: DataSource,
        batch: HashMap<String, Option<Quote>>,
        wanted: &[String],
        result: &mut HashMap<String, Quote>,
    ) -> HashSet<String> {
        let mut satisfied = HashSet::new();
        let now = Utc::now();

        for (symbol, quote) in batch {
            if !wanted.contains(&symbol) {
                continue;
            }
            let Some(mut quote) = quote else {
                tracing::debug!("📭 {} has no data for {}", id, symbol);
                continue;
            };
            // Providers may echo a different spelling (BRK-B for BRK.B).
            quote.symbol = symbol.clone();

            let quality = self.validator.validate(&quote, now);
            if !quality.is_acceptable() {
                let rejection = QualityRejection {
                    symbol: symbol.clone(),
                    provider: id,
                    freshness: quality.freshness,
                    age_secs: quality.age_secs,
                };
                tracing::warn!("🗑️  {}", rejection);
                self.metrics.record_rejection(id, quality.freshness);
                continue;
            }

            self.cache.insert(quote.clone(), quality).await;
            result.insert(symbol.clone(), quote);
            satisfied.insert(symbol);
        }

        satisfied
    }
}

fn outcome_label(err: &SourceError) -> &'static str {
    match err {
        SourceError::Timeout(_) => "timeout",
        SourceError::RateLimited(_) => "rate_limited",
        SourceError::Auth(_) => "auth",
        _ => "error",
    }
}

fn normalize_symbol(symbol: &str) -> Result<String, EngineError> {
    let symbol = symbol.trim().to_uppercase();
    if symbol.is_empty() {
        return Err(EngineError::DegenerateInput("blank symbol".into()));
    }
    Ok(symbol)
}

/// Trim, uppercase and de-duplicate, keeping first-seen order.
fn normalize_symbols(symbols: &[String]) -> Result<Vec<String>, EngineError> {
    if symbols.is_empty() {
        return Err(EngineError::DegenerateInput("empty symbol list".into()));
    }
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = normalize_symbol(symbol)?;
        if seen.insert(symbol.clone()) {
            out.push(symbol);
        }
    }
    Ok(out)
}
