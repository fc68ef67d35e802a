use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use super::adapter::SourceError;
use super::types::DataSource;

pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;
pub const DEFAULT_RECOVERY_COOLDOWN: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
struct SourceHealth {
    error_count: u32,
    recovery_attempts: u32,
    connection_status: bool,
    last_success: Option<Instant>,
    cooling_since: Option<Instant>,
    last_success_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

impl Default for SourceHealth {
    fn default() -> Self {
        Self {
            error_count: 0,
            recovery_attempts: 0,
            connection_status: true,
            last_success: None,
            cooling_since: None,
            last_success_at: None,
            last_error: None,
        }
    }
}

/// Snapshot returned by `get_connection_status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceStatus {
    pub healthy: bool,
    pub error_count: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub can_retry: bool,
    pub recovery_attempts: u32,
    pub last_error: Option<String>,
    /// Requests left in the source's rate-limit window, when throttled.
    pub rate_limit_remaining: Option<u32>,
}

/// Per-source health state machine: healthy until `error_threshold` errors
/// accumulate, then unhealthy until a recovery attempt succeeds. A recovery
/// attempt is allowed once `cooldown` has passed since the later of the last
/// success and the last failure while unhealthy.
#[derive(Clone)]
pub struct ConnectionMonitor {
    health: Arc<RwLock<HashMap<DataSource, SourceHealth>>>,
    error_threshold: u32,
    cooldown: Duration,
}

impl Default for ConnectionMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_THRESHOLD, DEFAULT_RECOVERY_COOLDOWN)
    }
}

impl ConnectionMonitor {
    pub fn new(error_threshold: u32, cooldown: Duration) -> Self {
        Self {
            health: Arc::new(RwLock::new(HashMap::new())),
            error_threshold: error_threshold.max(1),
            cooldown,
        }
    }

    pub async fn record_success(&self, source: DataSource) {
        self.record_success_at(source, Instant::now()).await
    }

    pub async fn record_success_at(&self, source: DataSource, now: Instant) {
        let mut health = self.health.write().await;
        let entry = health.entry(source).or_default();
        if !entry.connection_status {
            tracing::info!(
                "✅ {} recovered after {} recovery attempt(s)",
                source,
                entry.recovery_attempts
            );
        }
        entry.error_count = 0;
        entry.recovery_attempts = 0;
        entry.connection_status = true;
        entry.last_success = Some(now);
        entry.cooling_since = None;
        entry.last_success_at = Some(Utc::now());
        entry.last_error = None;
    }

    pub async fn record_error(&self, source: DataSource, err: &SourceError) {
        self.record_error_at(source, err, Instant::now()).await
    }

    pub async fn record_error_at(&self, source: DataSource, err: &SourceError, now: Instant) {
        let mut health = self.health.write().await;
        let entry = health.entry(source).or_default();
        entry.error_count += 1;
        entry.last_error = Some(err.to_string());

        if !entry.connection_status {
            // Failed recovery: start the cooldown over.
            entry.cooling_since = Some(now);
            tracing::warn!(
                "⚠️  {} still unhealthy after recovery attempt #{}: {}",
                source,
                entry.recovery_attempts,
                err
            );
        } else if entry.error_count >= self.error_threshold {
            entry.connection_status = false;
            entry.cooling_since = Some(now);
            tracing::error!(
                "🔴 {} marked unhealthy after {} errors (last: {})",
                source,
                entry.error_count,
                err
            );
        } else {
            tracing::warn!(
                "⚠️  {} error {}/{}: {}",
                source,
                entry.error_count,
                self.error_threshold,
                err
            );
        }
    }

    pub async fn is_healthy(&self, source: DataSource) -> bool {
        self.health
            .read()
            .await
            .get(&source)
            .map(|h| h.connection_status)
            .unwrap_or(true)
    }

    pub async fn can_retry(&self, source: DataSource) -> bool {
        self.can_retry_at(source, Instant::now()).await
    }

    pub async fn can_retry_at(&self, source: DataSource, now: Instant) -> bool {
        let health = self.health.read().await;
        let Some(entry) = health.get(&source) else {
            return true;
        };
        match entry.last_success.max(entry.cooling_since) {
            None => true,
            Some(since) => now.saturating_duration_since(since) >= self.cooldown,
        }
    }

    pub async fn start_recovery(&self, source: DataSource) {
        let mut health = self.health.write().await;
        let entry = health.entry(source).or_default();
        entry.recovery_attempts += 1;
        tracing::info!(
            "🔄 {} recovery attempt #{}",
            source,
            entry.recovery_attempts
        );
    }

    pub async fn status(&self, source: DataSource) -> SourceStatus {
        self.status_at(source, Instant::now()).await
    }

    pub async fn status_at(&self, source: DataSource, now: Instant) -> SourceStatus {
        let can_retry = self.can_retry_at(source, now).await;
        let health = self.health.read().await;
        let entry = health.get(&source).cloned().unwrap_or_default();
        SourceStatus {
            healthy: entry.connection_status,
            error_count: entry.error_count,
            last_success: entry.last_success_at,
            can_retry,
            recovery_attempts: entry.recovery_attempts,
            last_error: entry.last_error,
            rate_limit_remaining: None,
        }
    }
}
