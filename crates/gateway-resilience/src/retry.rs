//! Retry policy with exponential backoff.
//!
//! Attempt 1 runs immediately. After a retryable failure the policy sleeps
//! `min(max_delay, min_delay * factor^(attempt-1))` plus jitter and tries
//! again, up to `max_attempts` in total. Terminal failures (backend 4xx)
//! stop the loop at once.

use gateway_core::GatewayError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay after the first failure
    pub min_delay: Duration,
    /// Upper bound for any single delay (before jitter)
    pub max_delay: Duration,
    /// Backoff factor
    pub factor: f64,
    /// Jitter as a fraction of the computed delay, added on top (0.0 - 1.0)
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
            jitter: 0.1,
        }
    }
}

/// Retry policy implementation
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy with the given configuration
    #[must_use]
    pub fn new(mut config: RetryConfig) -> Self {
        config.max_attempts = config.max_attempts.max(1);
        config.jitter = config.jitter.clamp(0.0, 1.0);
        Self { config }
    }

    /// Create with default configuration
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// A policy that never retries
    #[must_use]
    pub fn no_retry() -> Self {
        Self::new(RetryConfig {
            max_attempts: 1,
            ..Default::default()
        })
    }

    /// Backoff before the attempt following `attempt` (1-based), jitter
    /// excluded
    #[must_use]
    pub fn base_delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63) as i32;
        let min = self.config.min_delay.as_nanos() as f64;
        let delay = (min * self.config.factor.powi(exponent))
            .min(self.config.max_delay.as_nanos() as f64);
        Duration::from_nanos(delay.max(0.0) as u64)
    }

    /// Backoff before the attempt following `attempt` (1-based), with jitter
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_after(attempt);
        let jitter_range = base.as_nanos() as f64 * self.config.jitter;
        if jitter_range < 1.0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0.0..=jitter_range);
        base + Duration::from_nanos(jitter as u64)
    }

    /// Check if an error is retryable
    #[must_use]
    pub fn is_retryable(&self, error: &GatewayError) -> bool {
        error.is_retryable()
    }

    /// Execute an operation with retry logic.
    ///
    /// `target` only labels log events.
    pub async fn execute<F, Fut, T>(&self, target: &str, operation: F) -> RetryResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, GatewayError>>,
    {
        let max_attempts = self.config.max_attempts;
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(value) => {
                    debug!(attempt = attempt, target = %target, "Attempt succeeded");
                    return RetryResult::Success {
                        value,
                        attempts: attempt,
                    };
                }
                Err(error) if !self.is_retryable(&error) => {
                    debug!(
                        attempt = attempt,
                        target = %target,
                        error = %error,
                        "Attempt failed with terminal error"
                    );
                    return RetryResult::Terminal {
                        error,
                        attempts: attempt,
                    };
                }
                Err(error) if attempt >= max_attempts => {
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        target = %target,
                        error = %error,
                        "Attempt failed, retries exhausted"
                    );
                    return RetryResult::Exhausted {
                        error,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    let delay = self.delay_for_attempt(attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = max_attempts,
                        target = %target,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    /// Get the configuration
    #[must_use]
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded
    Success {
        /// Returned value
        value: T,
        /// Attempts made
        attempts: u32,
    },
    /// Every attempt failed with a retryable error
    Exhausted {
        /// The last error
        error: GatewayError,
        /// Attempts made
        attempts: u32,
    },
    /// An attempt failed with a terminal error
    Terminal {
        /// The error
        error: GatewayError,
        /// Attempts made
        attempts: u32,
    },
}

impl<T> RetryResult<T> {
    /// Convert to a Result
    pub fn into_result(self) -> Result<T, GatewayError> {
        match self {
            Self::Success { value, .. } => Ok(value),
            Self::Exhausted { error, .. } | Self::Terminal { error, .. } => Err(error),
        }
    }

    /// Number of attempts made
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Success { attempts, .. }
            | Self::Exhausted { attempts, .. }
            | Self::Terminal { attempts, .. } => *attempts,
        }
    }

    /// Check if the operation succeeded
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }
}

/// Builder for retry policy
#[derive(Debug, Default)]
pub struct RetryPolicyBuilder {
    config: RetryConfig,
}

impl RetryPolicyBuilder {
    /// Create a new builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set total attempts
    #[must_use]
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    /// Set the first delay
    #[must_use]
    pub fn min_delay(mut self, delay: Duration) -> Self {
        self.config.min_delay = delay;
        self
    }

    /// Set the delay cap
    #[must_use]
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    /// Set backoff factor
    #[must_use]
    pub fn factor(mut self, factor: f64) -> Self {
        self.config.factor = factor;
        self
    }

    /// Set jitter fraction
    #[must_use]
    pub fn jitter(mut self, jitter: f64) -> Self {
        self.config.jitter = jitter;
        self
    }

    /// Build the policy
    #[must_use]
    pub fn build(self) -> RetryPolicy {
        RetryPolicy::new(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicyBuilder::new()
            .max_attempts(max_attempts)
            .min_delay(Duration::from_millis(1))
            .max_delay(Duration::from_millis(5))
            .jitter(0.0)
            .build()
    }

    fn upstream_502() -> GatewayError {
        GatewayError::from_backend_status("svc", 502, Bytes::new())
    }

    #[test]
    fn test_exponential_delays_are_capped() {
        let policy = RetryPolicyBuilder::new()
            .min_delay(Duration::from_millis(100))
            .max_delay(Duration::from_millis(500))
            .factor(2.0)
            .jitter(0.0)
            .build();

        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_millis(400));
        assert_eq!(policy.delay_for_attempt(4), Duration::from_millis(500));
        assert_eq!(policy.delay_for_attempt(30), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_only_adds() {
        let policy = RetryPolicyBuilder::new()
            .min_delay(Duration::from_millis(100))
            .jitter(0.5)
            .build();

        for _ in 0..50 {
            let delay = policy.delay_for_attempt(1);
            assert!(delay >= Duration::from_millis(100));
            assert!(delay <= Duration::from_millis(151));
        }
    }

    #[tokio::test]
    async fn test_success_first_attempt() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = fast_policy(3)
            .execute("svc", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, GatewayError>("ok")
                }
            })
            .await;

        assert_eq!(result.attempts(), 1);
        assert_eq!(result.into_result().unwrap(), "ok");
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_failures_then_success() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = fast_policy(3)
            .execute("svc", || {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(upstream_502())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert!(result.is_success());
        assert_eq!(result.attempts(), 3);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausts_after_max_attempts() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = fast_policy(3)
            .execute("svc", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(upstream_502())
                }
            })
            .await;

        assert!(matches!(result, RetryResult::Exhausted { attempts: 3, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(result.into_result().unwrap_err().status_code(), 502);
    }

    #[tokio::test]
    async fn test_client_error_is_terminal() {
        let counter = Arc::new(AtomicU32::new(0));
        let c = counter.clone();

        let result = fast_policy(5)
            .execute("svc", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err::<(), _>(GatewayError::from_backend_status(
                        "svc",
                        404,
                        Bytes::from_static(b"missing"),
                    ))
                }
            })
            .await;

        assert!(matches!(result, RetryResult::Terminal { attempts: 1, .. }));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_sleeps_between_attempts() {
        let policy = RetryPolicyBuilder::new()
            .max_attempts(3)
            .min_delay(Duration::from_millis(100))
            .max_delay(Duration::from_secs(1))
            .jitter(0.0)
            .build();

        let start = tokio::time::Instant::now();
        let result = policy
            .execute("svc", || async {
                Err::<(), _>(GatewayError::connection("svc", "refused"))
            })
            .await;

        assert_eq!(result.attempts(), 3);
        // 100ms after attempt 1, 200ms after attempt 2
        assert!(start.elapsed() >= Duration::from_millis(300));
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let policy = RetryPolicyBuilder::new().max_attempts(0).build();
        assert_eq!(policy.config().max_attempts, 1);
    }
}
