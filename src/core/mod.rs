pub mod config;
pub mod error;
pub mod health;
pub mod logging;
pub mod metrics;

pub use config::AppConfig;
pub use error::{EngineError, QualityRejection};
pub use health::HealthChecker;
pub use metrics::EngineMetrics;
