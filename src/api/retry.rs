use std::future::Future;
use std::time::Duration;

use super::adapter::SourceError;
use super::types::DataSource;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): base * 2^attempt, capped.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// retry budget is spent. Every provider call in the acquisition layer goes
/// through here.
pub async fn with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    source: DataSource,
    mut op: F,
) -> Result<T, SourceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SourceError>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    "🔁 {} attempt {} failed ({}), retrying in {:?}",
                    source,
                    attempt + 1,
                    e,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(4),
        }
    }

    #[test]
    fn test_exponential_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(500));
        assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(10), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_retries_transient_errors_until_success() {
        let calls = &AtomicU32::new(0);
        let result = with_backoff(&fast_policy(3), DataSource::Yahoo, move || async move {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(SourceError::Transport("reset".into()))
            } else {
                Ok(n)
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_budget() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(2), DataSource::Yahoo, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Http {
                status: 503,
                message: "unavailable".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let calls = &AtomicU32::new(0);
        let result: Result<(), _> = with_backoff(&fast_policy(5), DataSource::Finnhub, move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(SourceError::Auth("invalid token".into()))
        })
        .await;

        assert!(matches!(result, Err(SourceError::Auth(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
