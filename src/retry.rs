//! Bounded retry with linear backoff for read-only, low-stakes calls.
//!
//! Never used for anything that could create a duplicate server record; an
//! emergency trigger in particular is sent exactly once per user intent.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{duration_ms, DEFAULT_HISTORY_ATTEMPTS, DEFAULT_HISTORY_BACKOFF};

/// Errors that know whether a second attempt could help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RetryConfigError {
    #[error("max_attempts must be > 0")]
    ZeroAttempts,
    #[error("backoff_step_ms must be <= {max}")]
    StepTooLong { max: u64 },
}

const MAX_BACKOFF_STEP_MS: u64 = 60_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_HISTORY_ATTEMPTS,
            backoff_step_ms: u64::try_from(DEFAULT_HISTORY_BACKOFF.as_millis()).unwrap_or(500),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn once() -> Self {
        Self {
            max_attempts: 1,
            backoff_step_ms: 0,
        }
    }

    pub fn validate(&self) -> Result<(), RetryConfigError> {
        if self.max_attempts == 0 {
            return Err(RetryConfigError::ZeroAttempts);
        }
        if self.backoff_step_ms > MAX_BACKOFF_STEP_MS {
            return Err(RetryConfigError::StepTooLong {
                max: MAX_BACKOFF_STEP_MS,
            });
        }
        Ok(())
    }

    /// Delay after the `attempt`-th failure (1-based): `step * attempt`.
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.backoff_step_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up. The last error is returned.
pub async fn retry_with_backoff<T, E, F, Fut>(policy: RetryPolicy, label: &str, mut op: F) -> Result<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt < attempts && e.is_retryable() => {
                let delay = policy.delay_after(attempt);
                warn!(%label, attempt, delay_ms = duration_ms(delay), error = %e, "retrying");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!(%label, attempt, error = %e, "giving up");
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq)]
    enum TestError {
        Flaky,
        Fatal,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{self:?}")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            matches!(self, TestError::Flaky)
        }
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff_step_ms: 500,
        };
        assert_eq!(policy.delay_after(1), Duration::from_millis(500));
        assert_eq!(policy.delay_after(2), Duration::from_millis(1000));
    }

    #[test]
    fn test_huge_delay_logs_saturated_millis() {
        let policy = RetryPolicy {
            max_attempts: 2,
            backoff_step_ms: u64::MAX,
        };
        let delay = policy.delay_after(3);
        assert_eq!(delay, Duration::from_millis(u64::MAX));
        assert_eq!(duration_ms(delay), u64::MAX);
        assert_eq!(duration_ms(Duration::MAX), u64::MAX);
        assert_eq!(duration_ms(Duration::from_micros(2_500)), 2);
    }

    #[test]
    fn test_validate() {
        assert!(RetryPolicy::default().validate().is_ok());
        assert_eq!(
            RetryPolicy {
                max_attempts: 0,
                backoff_step_ms: 1
            }
            .validate(),
            Err(RetryConfigError::ZeroAttempts)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<u32, TestError> =
            retry_with_backoff(RetryPolicy::default(), "test", |attempt| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    if attempt < 3 {
                        Err(TestError::Flaky)
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;
        assert_eq!(result, Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), TestError> =
            retry_with_backoff(RetryPolicy::default(), "test", |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Flaky)
                }
            })
            .await;
        assert_eq!(result, Err(TestError::Flaky));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fatal_error_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<(), TestError> =
            retry_with_backoff(RetryPolicy::default(), "test", |_| {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(TestError::Fatal)
                }
            })
            .await;
        assert_eq!(result, Err(TestError::Fatal));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_linear_backoff() {
        let start = tokio::time::Instant::now();
        let _: Result<(), TestError> = retry_with_backoff(
            RetryPolicy {
                max_attempts: 3,
                backoff_step_ms: 500,
            },
            "test",
            |_| async { Err(TestError::Flaky) },
        )
        .await;
        // 500ms after the first failure, 1000ms after the second.
        assert!(start.elapsed() >= Duration::from_millis(1500));
    }
}
