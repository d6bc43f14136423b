//! Retry with exponential backoff around external calls
//!
//! Only `AppError::Network` is retried; schema and upstream failures are
//! returned on the first attempt.

use crate::config::RetryConfig;
use crate::errors::Result;
use crate::metrics;
use backoff::{future::retry, ExponentialBackoffBuilder};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Bounded retry policy
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    /// Single attempt, no backoff
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Tiny delays, for tests
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
            multiplier: 1.5,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms.max(config.initial_backoff_ms)),
            multiplier: config.multiplier.max(1.0),
        }
    }
}

/// Run `op` until it succeeds, fails permanently, or attempts run out
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, service: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let backoff = ExponentialBackoffBuilder::new()
        .with_initial_interval(policy.initial_backoff)
        .with_max_interval(policy.max_backoff)
        .with_multiplier(policy.multiplier)
        .with_max_elapsed_time(None)
        .build();

    let max_attempts = policy.max_attempts;
    let mut attempt = 0u32;

    retry(backoff, || {
        attempt += 1;
        let current = attempt;
        let call = op();
        async move {
            match call.await {
                Ok(value) => Ok(value),
                Err(err) if err.is_retryable() && current < max_attempts => {
                    warn!(
                        service = service,
                        attempt = current,
                        max_attempts = max_attempts,
                        error = %err,
                        "External call failed, retrying"
                    );
                    metrics::record_retry(service);
                    Err(backoff::Error::transient(err))
                }
                Err(err) => Err(backoff::Error::permanent(err)),
            }
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn network() -> AppError {
        AppError::Network {
            service: "planner".into(),
            message: "reset".into(),
        }
    }

    #[tokio::test]
    async fn test_retries_network_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&RetryPolicy::immediate(3), "planner", || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(network())
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(assert_ok!(result), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryPolicy::immediate(2), "planner", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(network())
        })
        .await;

        assert!(assert_err!(result).is_retryable());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_schema_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retry(&RetryPolicy::immediate(5), "planner", || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::SchemaValidation {
                service: "planner".into(),
                message: "bad shape".into(),
            })
        })
        .await;

        assert!(matches!(result, Err(AppError::SchemaValidation { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_policy_from_config_clamps() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            initial_backoff_ms: 500,
            max_backoff_ms: 100,
            multiplier: 0.5,
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.max_backoff, Duration::from_millis(500));
        assert_eq!(policy.multiplier, 1.0);
    }
}
