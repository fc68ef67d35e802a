use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

use crate::acquisition::quality::Freshness;
use crate::api::DataSource;
use crate::strategy::Signal;

/// Prometheus instruments for the acquisition layer and the decision engine.
pub struct EngineMetrics {
    registry: Registry,
    source_requests: IntCounterVec,
    source_latency: HistogramVec,
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    quality_rejections: IntCounterVec,
    unsatisfied_requests: IntCounter,
    decisions: IntCounterVec,
}

impl EngineMetrics {
    pub fn new() -> prometheus::Result<Self> {
        let registry = Registry::new();

        let source_requests = IntCounterVec::new(
            Opts::new("mde_source_requests_total", "Provider calls by outcome"),
            &["source", "outcome"],
        )?;
        let source_latency = HistogramVec::new(
            HistogramOpts::new("mde_source_latency_seconds", "Provider call latency")
                .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["source"],
        )?;
        let cache_hits = IntCounter::new("mde_cache_hits_total", "Quote cache hits")?;
        let cache_misses = IntCounter::new("mde_cache_misses_total", "Quote cache misses")?;
        let quality_rejections = IntCounterVec::new(
            Opts::new("mde_quality_rejections_total", "Quotes discarded as not fresh"),
            &["source", "freshness"],
        )?;
        let unsatisfied_requests = IntCounter::new(
            "mde_unsatisfied_requests_total",
            "Quote requests failed under the live-only contract",
        )?;
        let decisions = IntCounterVec::new(
            Opts::new("mde_decisions_total", "Trading decisions produced"),
            &["signal"],
        )?;

        registry.register(Box::new(source_requests.clone()))?;
        registry.register(Box::new(source_latency.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(quality_rejections.clone()))?;
        registry.register(Box::new(unsatisfied_requests.clone()))?;
        registry.register(Box::new(decisions.clone()))?;

        Ok(Self {
            registry,
            source_requests,
            source_latency,
            cache_hits,
            cache_misses,
            quality_rejections,
            unsatisfied_requests,
            decisions,
        })
    }

    pub fn record_source_call(&self, source: DataSource, outcome: &str, seconds: f64) {
        self.source_requests
            .with_label_values(&[source.as_str(), outcome])
            .inc();
        self.source_latency
            .with_label_values(&[source.as_str()])
            .observe(seconds);
    }

    pub fn record_cache(&self, hits: usize, misses: usize) {
        self.cache_hits.inc_by(hits as u64);
        self.cache_misses.inc_by(misses as u64);
    }

    pub fn record_rejection(&self, source: DataSource, freshness: Freshness) {
        self.quality_rejections
            .with_label_values(&[source.as_str(), freshness.as_str()])
            .inc();
    }

    pub fn record_unsatisfied(&self) {
        self.unsatisfied_requests.inc();
    }

    pub fn record_decision(&self, signal: Signal) {
        self.decisions.with_label_values(&[signal.as_str()]).inc();
    }

    pub fn source_calls(&self, source: DataSource, outcome: &str) -> u64 {
        self.source_requests
            .with_label_values(&[source.as_str(), outcome])
            .get()
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits.get()
    }

    /// Prometheus text exposition of every registered metric.
    pub fn render(&self) -> String {
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&self.registry.gather(), &mut buffer) {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}
