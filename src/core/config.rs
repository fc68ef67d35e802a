use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::env;
use std::time::Duration;

use crate::api::{DataSource, RateLimitConfig, RetryPolicy};
use crate::strategy::risk::RiskConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sources: SourcesConfig,
    pub acquisition: AcquisitionConfig,
    pub engine: EngineConfig,
    pub risk: RiskConfig,
    pub monitoring: MonitoringConfig,
    #[serde(skip)]
    pub credentials: Credentials,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourcesConfig {
    pub finnhub: SourceConfig,
    pub yahoo: SourceConfig,
    pub alpha_vantage: SourceConfig,
}

impl SourcesConfig {
    pub fn get(&self, source: DataSource) -> &SourceConfig {
        match source {
            DataSource::Finnhub => &self.finnhub,
            DataSource::Yahoo => &self.yahoo,
            DataSource::AlphaVantage => &self.alpha_vantage,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub enabled: bool,
    pub base_url: String,
    /// Lower value = tried first.
    pub priority: u8,
    pub max_requests: u32,
    pub window_secs: u64,
}

impl SourceConfig {
    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.max_requests, self.window_secs)
    }
}

pub const DEFAULT_REQUEST_DEADLINE_SECS: u64 = 45;

#[derive(Debug, Clone, Deserialize)]
pub struct AcquisitionConfig {
    pub cache_ttl_secs: u64,
    pub attempt_timeout_secs: u64,
    pub request_deadline_secs: u64,
    pub error_threshold: u32,
    pub recovery_cooldown_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,
    /// Treat quotes without an observation time as EXPIRED instead of
    /// assuming they were observed just now.
    pub missing_timestamp_expired: bool,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 60,
            attempt_timeout_secs: 30,
            request_deadline_secs: DEFAULT_REQUEST_DEADLINE_SECS,
            error_threshold: 5,
            recovery_cooldown_secs: 300,
            max_retries: 2,
            retry_base_delay_ms: 250,
            retry_max_delay_ms: 2000,
            missing_timestamp_expired: false,
        }
    }
}

impl AcquisitionConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_secs(self.attempt_timeout_secs)
    }

    pub fn request_deadline(&self) -> Duration {
        Duration::from_secs(self.request_deadline_secs)
    }

    pub fn recovery_cooldown(&self) -> Duration {
        Duration::from_secs(self.recovery_cooldown_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.retry_max_delay_ms),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Comma separated symbols, e.g. "AAPL,MSFT".
    pub watchlist: String,
    pub history_days: u32,
    pub decision_interval_secs: u64,
}

impl EngineConfig {
    pub fn symbols(&self) -> Vec<String> {
        self.watchlist
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: String,
}

/// Provider keys. Never deserialized from config files, never logged.
#[derive(Clone, Default)]
pub struct Credentials {
    pub finnhub_api_key: Option<String>,
    pub alpha_vantage_api_key: Option<String>,
}

impl Credentials {
    pub fn from_env() -> Self {
        Self {
            finnhub_api_key: env::var("FINNHUB_API_KEY").ok().filter(|k| !k.is_empty()),
            alpha_vantage_api_key: env::var("ALPHA_VANTAGE_API_KEY")
                .ok()
                .filter(|k| !k.is_empty()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("finnhub_api_key", &self.finnhub_api_key.as_ref().map(|_| "***"))
            .field(
                "alpha_vantage_api_key",
                &self.alpha_vantage_api_key.as_ref().map(|_| "***"),
            )
            .finish()
    }
}

impl AppConfig {
    /// Defaults, then `config/default` and `config/local` files, then
    /// `MDE__SECTION__KEY` environment variables.
    pub fn load() -> Result<Self> {
        dotenv::dotenv().ok();

        let config = Config::builder()
            // Sources
            .set_default("sources.finnhub.enabled", true)?
            .set_default("sources.finnhub.base_url", crate::api::finnhub::DEFAULT_BASE_URL)?
            .set_default("sources.finnhub.priority", 1)?
            .set_default("sources.finnhub.max_requests", 60)?
            .set_default("sources.finnhub.window_secs", 60)?
            .set_default("sources.yahoo.enabled", true)?
            .set_default("sources.yahoo.base_url", crate::api::yahoo::DEFAULT_BASE_URL)?
            .set_default("sources.yahoo.priority", 2)?
            .set_default("sources.yahoo.max_requests", 100)?
            .set_default("sources.yahoo.window_secs", 60)?
            .set_default("sources.alpha_vantage.enabled", true)?
            .set_default(
                "sources.alpha_vantage.base_url",
                crate::api::alpha_vantage::DEFAULT_BASE_URL,
            )?
            .set_default("sources.alpha_vantage.priority", 3)?
            .set_default("sources.alpha_vantage.max_requests", 5)?
            .set_default("sources.alpha_vantage.window_secs", 60)?
            // Acquisition
            .set_default("acquisition.cache_ttl_secs", 60)?
            .set_default("acquisition.attempt_timeout_secs", 30)?
            .set_default("acquisition.request_deadline_secs", 45)?
            .set_default("acquisition.error_threshold", 5)?
            .set_default("acquisition.recovery_cooldown_secs", 300)?
            .set_default("acquisition.max_retries", 2)?
            .set_default("acquisition.retry_base_delay_ms", 250)?
            .set_default("acquisition.retry_max_delay_ms", 2000)?
            .set_default("acquisition.missing_timestamp_expired", false)?
            // Engine
            .set_default("engine.watchlist", "AAPL,MSFT")?
            .set_default("engine.history_days", 120)?
            .set_default("engine.decision_interval_secs", 300)?
            // Risk
            .set_default("risk.max_position_fraction", 0.25)?
            .set_default("risk.base_position_fraction", 0.5)?
            .set_default("risk.low_confidence_threshold", 0.6)?
            // Monitoring
            .set_default("monitoring.http_port", 3000)?
            .set_default("monitoring.log_level", "info")?
            .set_default("monitoring.log_format", "pretty")?
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix("MDE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to build configuration")?;

        let mut app: AppConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        app.credentials = Credentials::from_env();

        Ok(app)
    }

    /// One-line summary without secrets, for the startup log.
    pub fn digest(&self) -> String {
        let keyed = |k: &Option<String>| if k.is_some() { "set" } else { "missing" };
        format!(
            "watchlist={:?} ttl={}s deadline={}s finnhub_key={} alpha_vantage_key={} port={}",
            self.engine.symbols(),
            self.acquisition.cache_ttl_secs,
            self.acquisition.request_deadline_secs,
            keyed(&self.credentials.finnhub_api_key),
            keyed(&self.credentials.alpha_vantage_api_key),
            self.monitoring.http_port
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watchlist_parsing() {
        let engine = EngineConfig {
            watchlist: " aapl, MSFT,,tsla ".into(),
            history_days: 120,
            decision_interval_secs: 300,
        };
        assert_eq!(engine.symbols(), vec!["AAPL", "MSFT", "TSLA"]);
    }

    #[test]
    fn test_acquisition_defaults() {
        let acq = AcquisitionConfig::default();
        assert_eq!(acq.cache_ttl(), Duration::from_secs(60));
        assert_eq!(acq.attempt_timeout(), Duration::from_secs(30));
        assert_eq!(acq.recovery_cooldown(), Duration::from_secs(300));
        assert_eq!(acq.retry_policy(), RetryPolicy::default());
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let creds = Credentials {
            finnhub_api_key: Some("secret".into()),
            alpha_vantage_api_key: None,
        };
        let rendered = format!("{:?}", creds);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("***"));
    }
}
