use thiserror::Error;

use crate::acquisition::quality::Freshness;
use crate::api::DataSource;

/// Errors that escalate to callers of the engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// One or more symbols could not be served fresh by any source.
    #[error("no fresh data available for: {}", symbols.join(", "))]
    UnsatisfiableRequest { symbols: Vec<String> },

    /// Rejected before any network or compute work.
    #[error("degenerate input: {0}")]
    DegenerateInput(String),
}

impl EngineError {
    pub fn unsatisfiable<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut symbols: Vec<String> = symbols.into_iter().map(Into::into).collect();
        symbols.sort();
        EngineError::UnsatisfiableRequest { symbols }
    }
}

/// Data arrived but was too old to serve. Logged and counted, then handled
/// exactly like a source that had no data.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{symbol} from {provider} rejected as {freshness} ({age_secs}s old)")]
pub struct QualityRejection {
    pub symbol: String,
    pub provider: DataSource,
    pub freshness: Freshness,
    pub age_secs: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsatisfiable_lists_sorted_symbols() {
        let err = EngineError::unsatisfiable(["MSFT", "AAPL"]);
        assert_eq!(
            err,
            EngineError::UnsatisfiableRequest {
                symbols: vec!["AAPL".into(), "MSFT".into()]
            }
        );
        assert_eq!(err.to_string(), "no fresh data available for: AAPL, MSFT");
    }
}
