//! Retry policy for backend operations
//!
//! Maps every [`ApiError`] to a [`RetryDecision`] and turns the executor's
//! terminal outcome back into an `ApiError`:
//!
//! | error                                   | idempotent        | non-idempotent          |
//! |-----------------------------------------|-------------------|-------------------------|
//! | `Server` (5xx), `Connect`               | retry w/ backoff  | retry w/ backoff        |
//! | `Timeout`, `Network`                    | retry w/ backoff  | stop, `AmbiguousOutcome`|
//! | `Auth` (first occurrence)               | retry immediately | retry immediately       |
//! | `Auth` (again), everything else         | stop              | stop                    |
//!
//! Exhausting the attempt budget yields `ApiError::Sync`.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use guildsync_common::{RetryConfig, RetryDecision, RetryError, RetryExecutor, RetryPolicy};
use guildsync_domain::ClientConfig;
use tracing::debug;

use super::errors::ApiError;
use crate::http::Idempotency;

/// Multiplier between consecutive backoff delays
const BACKOFF_BASE: f64 = 2.0;
/// Symmetric jitter applied to each backoff delay (±20 %)
const JITTER_FACTOR: f64 = 0.2;

/// Per-operation retry classification
///
/// Create one per logical operation; it remembers whether the single
/// credential-refresh retry has been spent.
#[derive(Debug)]
pub struct ApiRetryPolicy {
    idempotency: Idempotency,
    auth_retried: AtomicBool,
}

impl ApiRetryPolicy {
    pub const fn new(idempotency: Idempotency) -> Self {
        Self { idempotency, auth_retried: AtomicBool::new(false) }
    }

    /// Errors after which a non-idempotent write may or may not have landed
    const fn is_ambiguous(error: &ApiError) -> bool {
        matches!(error, ApiError::Timeout(_) | ApiError::Network(_))
    }
}

impl RetryPolicy<ApiError> for ApiRetryPolicy {
    fn should_retry(&self, error: &ApiError, _attempt: u32) -> RetryDecision {
        match error {
            ApiError::Auth { .. } => {
                if self.auth_retried.swap(true, Ordering::AcqRel) {
                    RetryDecision::Stop
                } else {
                    RetryDecision::RetryAfter(Duration::ZERO)
                }
            }
            e if !self.idempotency.is_idempotent() && Self::is_ambiguous(e) => RetryDecision::Stop,
            e if e.is_transient() => RetryDecision::Retry,
            _ => RetryDecision::Stop,
        }
    }
}

/// Backoff schedule derived from the client configuration
pub fn retry_config(config: &ClientConfig) -> RetryConfig {
    RetryConfig {
        max_attempts: config.max_retry_attempts.max(1),
        backoff: guildsync_common::BackoffStrategy::Exponential {
            initial_delay: config.retry_base_delay,
            base: BACKOFF_BASE,
            max_delay: config.retry_max_delay,
        },
        jitter: guildsync_common::Jitter::Proportional { factor: JITTER_FACTOR },
    }
}

/// Run `operation` under the retry policy for `idempotency`
///
/// `operation` performs exactly one attempt; on `Auth` it is expected to
/// have invalidated the credential it used before returning the error.
///
/// # Errors
/// - `Sync { attempts, source }` when the budget runs out
/// - `AmbiguousOutcome` for a non-idempotent operation whose request may
///   have been applied
/// - any non-retryable error unchanged
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    name: &str,
    idempotency: Idempotency,
    operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    let executor = RetryExecutor::new(config.clone(), ApiRetryPolicy::new(idempotency));
    let outcome = executor.execute_with_outcome(operation).await;
    if outcome.attempts > 1 {
        debug!(operation = name, attempts = outcome.attempts, total_delay = ?outcome.total_delay, "Retried operation finished");
    }
    outcome.result.map_err(|err| into_api_error(err, name, idempotency))
}

fn into_api_error(err: RetryError<ApiError>, name: &str, idempotency: Idempotency) -> ApiError {
    match err {
        RetryError::NonRetryable { source, .. }
            if !idempotency.is_idempotent() && ApiRetryPolicy::is_ambiguous(&source) =>
        {
            ApiError::AmbiguousOutcome { operation: name.to_string(), cause: Box::new(source) }
        }
        RetryError::NonRetryable { source, .. } => source,
        RetryError::AttemptsExhausted { attempts, last } => {
            ApiError::Sync { attempts, source: Box::new(last) }
        }
        RetryError::InvalidConfiguration { message } => ApiError::Config(message),
    }
}
