use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub version: String,
    pub uptime_seconds: u64,
    pub components: BTreeMap<String, bool>,
}

/// Rolls per-source health up into a single service status.
#[derive(Clone)]
pub struct HealthChecker {
    start_time: std::time::Instant,
    components: Arc<RwLock<BTreeMap<String, bool>>>,
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            start_time: std::time::Instant::now(),
            components: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    pub async fn get_status(&self) -> HealthStatus {
        let components = self.components.read().await.clone();
        let healthy = components.values().filter(|h| **h).count();

        let status = if components.is_empty() || healthy == 0 {
            "unhealthy"
        } else if healthy == components.len() {
            "healthy"
        } else {
            "degraded"
        };

        HealthStatus {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
            components,
        }
    }

    pub async fn update_component(&self, component: &str, healthy: bool) {
        let mut components = self.components.write().await;
        let previous = components.insert(component.to_string(), healthy);
        if previous != Some(healthy) {
            tracing::info!(
                "{} component {} is now {}",
                if healthy { "🟢" } else { "🔴" },
                component,
                if healthy { "healthy" } else { "unhealthy" }
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_status_rollup() {
        let checker = HealthChecker::new();
        assert_eq!(checker.get_status().await.status, "unhealthy");

        checker.update_component("yahoo", true).await;
        checker.update_component("finnhub", true).await;
        assert_eq!(checker.get_status().await.status, "healthy");

        checker.update_component("finnhub", false).await;
        let status = checker.get_status().await;
        assert_eq!(status.status, "degraded");
        assert_eq!(status.components.get("finnhub"), Some(&false));
    }
}
