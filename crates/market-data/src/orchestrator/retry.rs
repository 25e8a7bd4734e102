//! Exponential-backoff retry around a single connector attempt.
//!
//! The policy wraps one connector's fetch; trying *other* connectors is
//! the orchestrator's job. Which errors are worth retrying comes from
//! [`FetchError::retry_class`]: transport failures and throttling are
//! retried with backoff, credential and schema failures propagate
//! immediately, and a valid empty result is never retried.

use std::future::Future;
use std::time::Duration;

use log::warn;

use crate::errors::{FetchError, RetryClass};

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BASE_DELAY: Duration = Duration::from_secs(1);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Retry policy configuration.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied to the delay after each retry.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Sleep before retry number `attempt + 1`.
    ///
    /// Pure function of the attempt index and the policy config, so the
    /// schedule is testable without a real clock:
    /// `base_delay * backoff_multiplier^attempt`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay
            .mul_f64(self.backoff_multiplier.powi(attempt as i32))
    }

    /// Run `op`, retrying on transient failures per the policy.
    pub async fn attempt<T, F, Fut>(&self, mut op: F) -> Result<T, FetchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, FetchError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    let retryable = e.retry_class() == RetryClass::WithBackoff;
                    if !retryable || attempt + 1 >= self.max_attempts {
                        return Err(e);
                    }

                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        "attempt {}/{} failed ({}), retrying in {:?}",
                        attempt + 1,
                        self.max_attempts,
                        e,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transport_error() -> FetchError {
        FetchError::Transport {
            connector: "TEST".to_string(),
            message: "connection reset".to_string(),
        }
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        };

        assert_eq!(policy.delay_for_attempt(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_then_success() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff_multiplier: 2.0,
        };

        let calls = AtomicU32::new(0);
        let start = tokio::time::Instant::now();

        let result: Result<u32, FetchError> = policy
            .attempt(|| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err(transport_error())
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // Backoff schedule: 100ms + 200ms between the three attempts
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_returns_last_error() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };

        let calls = AtomicU32::new(0);
        let result: Result<(), FetchError> = policy
            .attempt(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transport_error()) }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Transport { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let policy = RetryPolicy::default();

        let calls = AtomicU32::new(0);
        let result: Result<(), FetchError> = policy
            .attempt(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(FetchError::Auth {
                        connector: "TEST".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::Auth { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_data_not_retried() {
        let policy = RetryPolicy::default();

        let calls = AtomicU32::new(0);
        let result: Result<(), FetchError> = policy
            .attempt(|| {
                calls.fetch_add(1, Ordering::SeqCst);
                async {
                    Err(FetchError::NoData {
                        connector: "TEST".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(result, Err(FetchError::NoData { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_immediate_success() {
        let policy = RetryPolicy::default();
        let result: Result<u32, FetchError> = policy.attempt(|| async { Ok(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }
}
