pub mod adapter;
pub mod alpha_vantage;
pub mod connection_monitor;
pub mod finnhub;
mod http;
pub mod rate_limiter;
pub mod retry;
pub mod types;
pub mod yahoo;

pub use adapter::{HistoryProvider, SourceAdapter, SourceError};
pub use alpha_vantage::AlphaVantageClient;
pub use connection_monitor::{ConnectionMonitor, SourceStatus};
pub use finnhub::FinnhubClient;
pub use rate_limiter::{RateLimitConfig, RateLimiter};
pub use retry::RetryPolicy;
pub use types::*;
pub use yahoo::YahooClient;
