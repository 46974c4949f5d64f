//! Generic retry executor with pluggable retry policies
//!
//! The executor owns the loop, the attempt budget and the backoff schedule;
//! whether a particular error is worth another attempt is decided by a
//! [`RetryPolicy`] that turns each error into a [`RetryDecision`]. Keeping
//! that decision as data lets callers classify errors in one place instead
//! of scattering retry logic through control flow.

use std::fmt;
use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use thiserror::Error;
use tracing::{debug, instrument, warn};

/// Errors that terminate a retry sequence
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// All retry attempts have been exhausted; `last` is the final failure
    #[error("All retry attempts exhausted after {attempts} tries: {last}")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        last: E,
    },

    /// The policy decided the error is not worth retrying
    #[error("Operation failed with non-retryable error after {attempts} attempt(s): {source}")]
    NonRetryable { attempts: u32, source: E },

    /// The retry configuration is invalid
    #[error("Invalid retry configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up (zero for configuration
    /// errors)
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::AttemptsExhausted { attempts, .. } | Self::NonRetryable { attempts, .. } => {
                *attempts
            }
            Self::InvalidConfiguration { .. } => 0,
        }
    }

    /// The last operation error, if any
    pub fn into_last_error(self) -> Option<E> {
        match self {
            Self::AttemptsExhausted { last, .. } => Some(last),
            Self::NonRetryable { source, .. } => Some(source),
            Self::InvalidConfiguration { .. } => None,
        }
    }
}

/// Result type for retry operations
pub type RetryResult<T, E> = Result<T, RetryError<E>>;

/// Outcome of a retry execution including result and summary statistics
#[derive(Debug)]
pub struct RetryOutcome<T, E> {
    pub result: RetryResult<T, E>,
    pub attempts: u32,
    pub total_delay: Duration,
    pub elapsed: Duration,
}

impl<T, E> RetryOutcome<T, E> {
    /// Consume the outcome and return only the result
    pub fn into_result(self) -> RetryResult<T, E> {
        self.result
    }
}

/// Trait for determining whether an error should be retried
pub trait RetryPolicy<E> {
    /// Decide what to do with `error`, raised by the zero-based `attempt`
    fn should_retry(&self, error: &E, attempt: u32) -> RetryDecision;
}

/// Decision for whether to retry an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the operation with the default backoff delay
    Retry,
    /// Retry the operation with a custom delay
    RetryAfter(Duration),
    /// Don't retry the operation
    Stop,
}

/// Backoff strategy for calculating retry delays
#[derive(Debug, Clone, PartialEq)]
pub enum BackoffStrategy {
    /// Fixed delay between retries
    Fixed(Duration),
    /// Exponential backoff: `initial_delay * base^attempt`, capped at
    /// `max_delay`
    Exponential { initial_delay: Duration, base: f64, max_delay: Duration },
}

impl BackoffStrategy {
    /// Calculate the delay to wait after the zero-based `attempt` failed
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { initial_delay, base, max_delay } => {
                let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
                let delay_ms = initial_delay.as_secs_f64() * 1000.0 * base.powi(exponent);
                let capped_ms = delay_ms.min(max_delay.as_secs_f64() * 1000.0).max(0.0);
                Duration::from_secs_f64(capped_ms / 1000.0)
            }
        }
    }

    /// Upper bound of any delay this strategy produces
    pub const fn max_delay(&self) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { max_delay, .. } => *max_delay,
        }
    }
}

/// Jitter applied on top of the backoff delay
#[derive(Debug, Clone, PartialEq)]
pub enum Jitter {
    /// No jitter
    None,
    /// Symmetric jitter: `delay ± delay * factor`, never negative
    Proportional { factor: f64 },
}

impl Jitter {
    /// Apply jitter to the calculated delay
    pub fn apply(&self, delay: Duration) -> Duration {
        let millis = delay.as_secs_f64() * 1000.0;
        if millis <= 0.0 {
            return delay;
        }

        let jittered = match self {
            Self::None => return delay,
            Self::Proportional { factor } => {
                let range = millis * factor.clamp(0.0, 1.0);
                if range <= 0.0 {
                    return delay;
                }
                millis + rand::thread_rng().gen_range(-range..=range)
            }
        };

        Duration::from_secs_f64(jittered.max(0.0) / 1000.0)
    }
}

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total number of attempts (initial try + retries)
    pub max_attempts: u32,
    /// Backoff strategy for calculating delays
    pub backoff: BackoffStrategy,
    /// Jitter type for randomizing delays
    pub jitter: Jitter,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffStrategy::Exponential {
                initial_delay: Duration::from_millis(100),
                base: 2.0,
                max_delay: Duration::from_secs(30),
            },
            jitter: Jitter::Proportional { factor: 0.2 },
        }
    }
}

impl RetryConfig {
    /// Create a configuration builder
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::new()
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `InvalidConfiguration` for a zero attempt budget or a
    /// non-positive exponential base.
    pub fn validate(&self) -> Result<(), RetryError<()>> {
        if self.max_attempts == 0 {
            return Err(RetryError::InvalidConfiguration {
                message: "max_attempts must be greater than 0".to_string(),
            });
        }

        if let BackoffStrategy::Exponential { base, initial_delay, max_delay } = &self.backoff {
            if *base <= 0.0 {
                return Err(RetryError::InvalidConfiguration {
                    message: "exponential base must be greater than 0".to_string(),
                });
            }
            if initial_delay > max_delay {
                return Err(RetryError::InvalidConfiguration {
                    message: format!(
                        "initial_delay ({initial_delay:?}) cannot be greater than max_delay ({max_delay:?})"
                    ),
                });
            }
        }

        Ok(())
    }

    /// Delay to wait after the zero-based `attempt` failed
    ///
    /// Jitter is applied before the cap, so the result never exceeds the
    /// strategy's maximum delay.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff.calculate_delay(attempt);
        self.jitter.apply(delay).min(self.backoff.max_delay())
    }
}

/// Builder for RetryConfig with fluent API
#[derive(Debug, Default)]
pub struct RetryConfigBuilder {
    config: RetryConfig,
}

impl RetryConfigBuilder {
    pub fn new() -> Self {
        Self { config: RetryConfig::default() }
    }

    pub const fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    pub const fn fixed_backoff(mut self, delay: Duration) -> Self {
        self.config.backoff = BackoffStrategy::Fixed(delay);
        self
    }

    pub const fn exponential_backoff(
        mut self,
        initial_delay: Duration,
        base: f64,
        max_delay: Duration,
    ) -> Self {
        self.config.backoff = BackoffStrategy::Exponential { initial_delay, base, max_delay };
        self
    }

    pub fn no_jitter(mut self) -> Self {
        self.config.jitter = Jitter::None;
        self
    }

    pub fn proportional_jitter(mut self, factor: f64) -> Self {
        self.config.jitter = Jitter::Proportional { factor };
        self
    }

    /// Validate and build the configuration
    ///
    /// # Errors
    /// See [`RetryConfig::validate`].
    pub fn build(self) -> Result<RetryConfig, RetryError<()>> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// The main retry executor
#[derive(Debug, Clone)]
pub struct RetryExecutor<P> {
    config: RetryConfig,
    policy: P,
}

impl<P> RetryExecutor<P> {
    /// Create a new retry executor with the given configuration and policy
    pub const fn new(config: RetryConfig, policy: P) -> Self {
        Self { config, policy }
    }

    /// Create with default configuration
    pub fn with_policy(policy: P) -> Self {
        Self::new(RetryConfig::default(), policy)
    }

    pub const fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an operation with retry logic
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> RetryResult<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.execute_with_outcome(operation).await.into_result()
    }

    /// Execute an operation with retry logic and return outcome statistics
    ///
    /// The policy is consulted before the attempt budget, so a
    /// non-retryable error is always reported as `NonRetryable`, even on the
    /// last attempt.
    #[instrument(skip_all, fields(max_attempts = self.config.max_attempts))]
    pub async fn execute_with_outcome<F, Fut, T, E>(&self, mut operation: F) -> RetryOutcome<T, E>
    where
        P: RetryPolicy<E>,
        E: fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let start = Instant::now();
        let max_attempts = self.config.max_attempts.max(1);
        let mut total_delay = Duration::ZERO;
        let mut attempt: u32 = 0;

        loop {
            let attempt_number = attempt + 1;
            debug!(attempt = attempt_number, max_attempts, "Executing operation");

            let error = match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Operation succeeded after retries");
                    }
                    return RetryOutcome {
                        result: Ok(value),
                        attempts: attempt_number,
                        total_delay,
                        elapsed: start.elapsed(),
                    };
                }
                Err(error) => error,
            };

            let delay = match self.policy.should_retry(&error, attempt) {
                RetryDecision::Stop => {
                    debug!(attempt = attempt_number, error = %error, "Retry policy stopped retries");
                    return RetryOutcome {
                        result: Err(RetryError::NonRetryable {
                            attempts: attempt_number,
                            source: error,
                        }),
                        attempts: attempt_number,
                        total_delay,
                        elapsed: start.elapsed(),
                    };
                }
                RetryDecision::Retry => self.config.delay_for(attempt),
                RetryDecision::RetryAfter(custom) => custom,
            };

            if attempt_number >= max_attempts {
                warn!(attempts = attempt_number, error = %error, "All retry attempts exhausted");
                return RetryOutcome {
                    result: Err(RetryError::AttemptsExhausted {
                        attempts: attempt_number,
                        last: error,
                    }),
                    attempts: attempt_number,
                    total_delay,
                    elapsed: start.elapsed(),
                };
            }

            warn!(attempt = attempt_number, delay = ?delay, error = %error, "Operation failed, retrying");
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            total_delay += delay;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Flaky(&'static str);

    /// Retries everything except the listed error codes
    struct RetryUnless(&'static [&'static str]);

    impl RetryPolicy<Flaky> for RetryUnless {
        fn should_retry(&self, error: &Flaky, _attempt: u32) -> RetryDecision {
            if self.0.contains(&error.0) {
                RetryDecision::Stop
            } else {
                RetryDecision::Retry
            }
        }
    }

    impl fmt::Display for Flaky {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl std::error::Error for Flaky {}

    fn quick_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .fixed_backoff(Duration::from_millis(1))
            .no_jitter()
            .build()
            .unwrap()
    }

    #[test]
    fn test_exponential_backoff_doubles_and_caps() {
        let backoff = BackoffStrategy::Exponential {
            initial_delay: Duration::from_millis(100),
            base: 2.0,
            max_delay: Duration::from_millis(500),
        };

        assert_eq!(backoff.calculate_delay(0), Duration::from_millis(100));
        assert_eq!(backoff.calculate_delay(1), Duration::from_millis(200));
        assert_eq!(backoff.calculate_delay(2), Duration::from_millis(400));
        assert_eq!(backoff.calculate_delay(3), Duration::from_millis(500));
        assert_eq!(backoff.calculate_delay(u32::MAX), Duration::from_millis(500));
    }

    #[test]
    fn test_proportional_jitter_stays_in_range() {
        let jitter = Jitter::Proportional { factor: 0.2 };
        let base = Duration::from_millis(1000);

        let mut spread = (base, base);
        for _ in 0..500 {
            let delay = jitter.apply(base);
            assert!(delay >= Duration::from_millis(799), "delay too small: {delay:?}");
            assert!(delay <= Duration::from_millis(1201), "delay too large: {delay:?}");
            spread = (spread.0.min(delay), spread.1.max(delay));
        }
        // The full ±20% range is used
        assert!(spread.0 < Duration::from_millis(900) && spread.1 > Duration::from_millis(1100));
        assert_eq!(jitter.apply(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_jittered_delay_respects_the_cap() {
        let config = RetryConfig::builder()
            .exponential_backoff(Duration::from_millis(100), 2.0, Duration::from_millis(400))
            .proportional_jitter(0.5)
            .build()
            .unwrap();

        for _ in 0..200 {
            assert!(config.delay_for(5) <= Duration::from_millis(400));
            assert!(config.delay_for(0) >= Duration::from_millis(49));
        }
    }

    #[test]
    fn test_config_validation() {
        assert!(RetryConfig::builder().max_attempts(0).build().is_err());
        assert!(RetryConfig::builder()
            .exponential_backoff(Duration::from_secs(2), 2.0, Duration::from_secs(1))
            .build()
            .is_err());
        assert!(RetryConfig::builder()
            .exponential_backoff(Duration::from_millis(1), 0.0, Duration::from_secs(1))
            .build()
            .is_err());
        assert!(RetryConfig::builder().max_attempts(5).build().is_ok());
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let executor = RetryExecutor::new(quick_config(4), RetryUnless(&[]));
        let calls = Arc::new(AtomicU32::new(0));

        let outcome = executor
            .execute_with_outcome(|| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 3 {
                        Err(Flaky("503"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(outcome.attempts, 4);
        assert_eq!(outcome.result.unwrap(), "done");
    }

    #[tokio::test]
    async fn test_exhaustion_keeps_last_error() {
        let executor = RetryExecutor::new(quick_config(3), RetryUnless(&[]));
        let calls = Arc::new(AtomicU32::new(0));

        let result: RetryResult<(), Flaky> = executor
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    let n = calls.fetch_add(1, Ordering::SeqCst);
                    Err(if n < 2 { Flaky("timeout") } else { Flaky("502") })
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(RetryError::AttemptsExhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, Flaky("502"));
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_stop_decision_makes_one_attempt() {
        let executor = RetryExecutor::new(quick_config(5), RetryUnless(&["404"]));
        let calls = Arc::new(AtomicU32::new(0));

        let result: RetryResult<(), Flaky> = executor
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(Flaky("404"))
                }
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(RetryError::NonRetryable { attempts: 1, .. })));
    }

    #[tokio::test]
    async fn test_non_retryable_on_last_attempt_is_not_exhaustion() {
        let executor = RetryExecutor::new(quick_config(1), RetryUnless(&["400"]));
        let result: RetryResult<(), Flaky> = executor.execute(|| async { Err(Flaky("400")) }).await;
        assert!(matches!(result, Err(RetryError::NonRetryable { .. })));
    }

    #[tokio::test]
    async fn test_retry_after_uses_custom_delay() {
        struct Immediate;
        impl RetryPolicy<Flaky> for Immediate {
            fn should_retry(&self, _error: &Flaky, _attempt: u32) -> RetryDecision {
                RetryDecision::RetryAfter(Duration::ZERO)
            }
        }

        let config = RetryConfig::builder()
            .max_attempts(2)
            .fixed_backoff(Duration::from_secs(60))
            .build()
            .unwrap();
        let executor = RetryExecutor::new(config, Immediate);

        let outcome = executor
            .execute_with_outcome(|| async { Err::<(), _>(Flaky("401")) })
            .await;
        assert_eq!(outcome.attempts, 2);
        assert_eq!(outcome.total_delay, Duration::ZERO);
    }
}
