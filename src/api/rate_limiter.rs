use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::types::DataSource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl RateLimitConfig {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window: Duration::from_secs(window_secs),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self::new(60, 60)
    }
}

#[derive(Debug)]
struct Window {
    config: RateLimitConfig,
    count: u32,
    reset_at: Instant,
}

/// Per-source fixed-window request counter. Never blocks: a `false` from
/// [`RateLimiter::allow`] means "skip this source for this attempt".
#[derive(Clone, Default)]
pub struct RateLimiter {
    windows: Arc<RwLock<HashMap<DataSource, Window>>>,
}

impl RateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    /// The first configuration for a source wins; later calls share its
    /// window and counter.
    pub async fn configure(&self, source: DataSource, config: RateLimitConfig) {
        let mut windows = self.windows.write().await;
        if let Some(existing) = windows.get(&source) {
            if existing.config != config {
                tracing::warn!(
                    "⚠️  {} already limited to {} requests / {:?}, ignoring {} / {:?}",
                    source,
                    existing.config.max_requests,
                    existing.config.window,
                    config.max_requests,
                    config.window
                );
            }
            return;
        }

        tracing::info!(
            "🛡️  Rate limit for {}: {} requests / {:?}",
            source,
            config.max_requests,
            config.window
        );
        windows.insert(
            source,
            Window {
                config,
                count: 0,
                reset_at: Instant::now(),
            },
        );
    }

    pub async fn allow(&self, source: DataSource) -> bool {
        self.allow_at(source, Instant::now()).await
    }

    /// Sources without a configured window are never throttled.
    pub async fn allow_at(&self, source: DataSource, now: Instant) -> bool {
        let mut windows = self.windows.write().await;
        let Some(window) = windows.get_mut(&source) else {
            return true;
        };

        if now.saturating_duration_since(window.reset_at) >= window.config.window {
            window.count = 0;
            window.reset_at = now;
        }

        if window.count >= window.config.max_requests {
            tracing::warn!(
                "⏳ {} rate limit reached ({}/{}), skipping",
                source,
                window.count,
                window.config.max_requests
            );
            return false;
        }

        window.count += 1;
        true
    }

    /// Requests left in the current window; `None` when unthrottled.
    pub async fn remaining(&self, source: DataSource) -> Option<u32> {
        let windows = self.windows.read().await;
        windows
            .get(&source)
            .map(|w| w.config.max_requests.saturating_sub(w.count))
    }
}
