//! Retry policy and executor

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

use crate::backoff::{BackoffCalculator, BackoffStrategy};

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_attempts: u32,

    /// Initial delay between retries
    #[serde(with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Maximum delay between retries
    #[serde(with = "humantime_serde")]
    pub max_delay: Duration,

    pub backoff_strategy: BackoffStrategy,

    /// Whether to add jitter to retry delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_strategy: BackoffStrategy::Exponential { base: 2.0 },
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a linear retry policy
    pub fn linear(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: delay,
            max_delay: delay.saturating_mul(max_attempts.max(1)),
            backoff_strategy: BackoffStrategy::Linear,
            jitter: false,
        }
    }

    /// Calculate delay for a specific attempt
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        BackoffCalculator::new(
            self.backoff_strategy.clone(),
            self.initial_delay,
            self.max_delay,
            self.jitter,
        )
        .calculate_delay(attempt)
    }
}

/// Trait for errors that can be retried
pub trait Retryable {
    /// Whether this error is retryable
    fn is_retryable(&self) -> bool;

    /// Custom retry delay for this error type
    fn retry_delay(&self) -> Option<Duration> {
        None
    }
}

/// Runs an async operation until it succeeds, hits a non-retryable error or
/// runs out of attempts
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn with_default_policy() -> Self {
        Self::new(RetryPolicy::default())
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute a function with retry logic
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        self.execute_with_context(|_attempt| f()).await
    }

    /// Execute a function with retry logic, passing the 1-indexed attempt number
    pub async fn execute_with_context<F, Fut, T, E>(&self, mut f: F) -> Result<T, RetryError<E>>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Retryable + Display,
    {
        let mut attempt = 1;

        loop {
            debug!(
                "Executing attempt {} of {}",
                attempt, self.policy.max_attempts
            );

            match f(attempt).await {
                Ok(result) => {
                    if attempt > 1 {
                        info!("Operation succeeded after {} attempts", attempt);
                    }
                    return Ok(result);
                }
                Err(error) => {
                    if !error.is_retryable() {
                        warn!("Operation failed with non-retryable error: {}", error);
                        return Err(RetryError::NonRetryableError(error));
                    }

                    if attempt >= self.policy.max_attempts {
                        warn!("Operation failed after {} attempts: {}", attempt, error);
                        return Err(RetryError::MaxAttemptsExceeded {
                            attempts: attempt,
                            last_error: error,
                        });
                    }

                    let delay = error
                        .retry_delay()
                        .unwrap_or_else(|| self.policy.delay_for_attempt(attempt));
                    warn!(
                        "Attempt {} failed: {}. Retrying in {:?}",
                        attempt, error, delay
                    );
                    sleep(delay).await;

                    attempt += 1;
                }
            }
        }
    }
}

/// Retry error types
#[derive(Debug, thiserror::Error)]
pub enum RetryError<E> {
    /// Maximum retry attempts exceeded
    #[error("Maximum retry attempts ({attempts}) exceeded. Last error: {last_error}")]
    MaxAttemptsExceeded { attempts: u32, last_error: E },

    /// Non-retryable error encountered
    #[error("Non-retryable error: {0}")]
    NonRetryableError(E),
}

impl<E> RetryError<E> {
    /// Get the underlying error
    pub fn into_inner(self) -> E {
        match self {
            RetryError::MaxAttemptsExceeded { last_error, .. } => last_error,
            RetryError::NonRetryableError(error) => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[derive(Debug, Clone)]
    struct TestError {
        retryable: bool,
        message: String,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.message)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(100),
            backoff_strategy: BackoffStrategy::Fixed,
            jitter: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_success_after_failures() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let executor = RetryExecutor::new(fast_policy(3));

        let result = executor
            .execute(|| {
                let count = counter_clone.fetch_add(1, Ordering::Relaxed);
                async move {
                    if count < 2 {
                        Err(TestError {
                            retryable: true,
                            message: "Temporary failure".to_string(),
                        })
                    } else {
                        Ok("Success".to_string())
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "Success");
        assert_eq!(counter.load(Ordering::Relaxed), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_max_attempts_exceeded() {
        let executor = RetryExecutor::new(fast_policy(2));

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| async {
                Err(TestError {
                    retryable: true,
                    message: "Always fails".to_string(),
                })
            })
            .await;

        match result.unwrap_err() {
            RetryError::MaxAttemptsExceeded {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 2);
                assert_eq!(last_error.message, "Always fails");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_non_retryable_error_stops_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();
        let executor = RetryExecutor::with_default_policy();

        let result: Result<(), RetryError<TestError>> = executor
            .execute(|| {
                counter_clone.fetch_add(1, Ordering::Relaxed);
                async {
                    Err(TestError {
                        retryable: false,
                        message: "Non-retryable".to_string(),
                    })
                }
            })
            .await;

        assert!(matches!(
            result.unwrap_err(),
            RetryError::NonRetryableError(_)
        ));
        assert_eq!(counter.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_execute_with_context() {
        let executor = RetryExecutor::new(RetryPolicy::linear(3, Duration::from_millis(5)));

        let result = executor
            .execute_with_context(|attempt| async move {
                if attempt < 3 {
                    Err(TestError {
                        retryable: true,
                        message: format!("Attempt {}", attempt),
                    })
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_linear_policy() {
        let policy = RetryPolicy::linear(3, Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(400));
        assert_eq!(policy.max_delay, Duration::from_millis(600));

        assert_eq!(RetryPolicy::linear(0, Duration::from_millis(1)).max_attempts, 1);
    }
}
