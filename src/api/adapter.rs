use async_trait::async_trait;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use super::types::{Bar, DataSource, Quote};

/// Failure talking to one provider. Recovered inside the acquisition layer
/// (fed to the connection monitor, triggers failover), never shown to callers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SourceError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("authentication rejected: {0}")]
    Auth(String),

    #[error("rate limited by provider: {0}")]
    RateLimited(String),

    #[error("could not decode provider payload: {0}")]
    Decode(String),

    #[error("attempt timed out after {0:?}")]
    Timeout(Duration),

    #[error("source unavailable: {0}")]
    Unavailable(String),
}

impl SourceError {
    /// Transient failures worth another attempt within the same request.
    pub fn is_retryable(&self) -> bool {
        match self {
            SourceError::Transport(_) | SourceError::Timeout(_) => true,
            SourceError::Http { status, .. } => *status >= 500,
            SourceError::Auth(_)
            | SourceError::RateLimited(_)
            | SourceError::Decode(_)
            | SourceError::Unavailable(_) => false,
        }
    }

    /// Maps a non-success HTTP status onto the taxonomy.
    pub fn from_status(status: StatusCode, body: String) -> Self {
        match status.as_u16() {
            401 | 403 => SourceError::Auth(body),
            429 => SourceError::RateLimited(body),
            code => SourceError::Http {
                status: code,
                message: body,
            },
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if err.is_timeout() {
            SourceError::Timeout(Duration::ZERO)
        } else if let Some(status) = err.status() {
            SourceError::from_status(status, err.to_string())
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

/// One external quote provider.
///
/// `Ok(None)` / a `None` map value means the provider has no data for that
/// symbol, which is not an error. Transport, auth and throttling problems are
/// reported as [`SourceError`].
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn id(&self) -> DataSource;

    /// False when the adapter has no credentials provisioned. Unavailable
    /// adapters are skipped without counting against their health.
    fn is_available(&self) -> bool;

    async fn fetch_quote(&self, symbol: &str) -> Result<Option<Quote>, SourceError>;

    async fn fetch_batch(
        &self,
        symbols: &[String],
    ) -> Result<HashMap<String, Option<Quote>>, SourceError>;
}

/// Daily OHLCV history provider. Bars come back oldest to newest.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    fn id(&self) -> DataSource;

    fn is_available(&self) -> bool;

    async fn fetch_history(&self, symbol: &str, lookback_days: u32) -> Result<Vec<Bar>, SourceError>;
}

/// Per-symbol fallback for providers without a batch endpoint. Symbols are
/// fetched one after another; the first hard error aborts the batch.
pub(crate) async fn fetch_each<A>(
    adapter: &A,
    symbols: &[String],
) -> Result<HashMap<String, Option<Quote>>, SourceError>
where
    A: SourceAdapter + ?Sized,
{
    let mut out = HashMap::with_capacity(symbols.len());
    for symbol in symbols {
        let quote = adapter.fetch_quote(symbol).await?;
        out.insert(symbol.clone(), quote);
    }
    Ok(out)
}
