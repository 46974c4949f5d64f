//! Client configuration
//!
//! [`ClientConfig`] is the single configuration surface of the sync client.
//! It can be deserialized from TOML/JSON files (durations in milliseconds)
//! or assembled from environment variables by the infra loader.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_API_BASE_URL, DEFAULT_BATCH_CONCURRENCY, DEFAULT_BATCH_SIZE,
    DEFAULT_MAX_CONCURRENT_REQUESTS, DEFAULT_MAX_RETRY_ATTEMPTS, DEFAULT_REQUEST_TIMEOUT,
    DEFAULT_RETRY_BASE_DELAY, DEFAULT_RETRY_MAX_DELAY, DEFAULT_TOKEN_REFRESH_FLOOR,
    DEFAULT_TOKEN_REFRESH_RATIO, MAX_RETRY_ATTEMPTS_LIMIT,
};
use crate::errors::{DomainError, Result};
use crate::utils::duration_millis;

/// Configuration for one sync client instance
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClientConfig {
    /// Backend root, e.g. `https://bot-api.example.com/api`
    pub api_base_url: String,
    /// API key exchanged for bearer credentials at `/token`
    pub api_key: Option<String>,
    /// Use the fixed local sentinel credential instead of a token exchange
    pub local_mode: bool,
    /// Connection pool size (max in-flight requests)
    pub max_concurrent_requests: usize,
    /// Per-request timeout
    #[serde(with = "duration_millis", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// Total attempts per logical operation (initial try + retries)
    pub max_retry_attempts: u32,
    /// Maximum entities per sync batch
    pub batch_size: usize,
    /// Batches submitted in parallel by one sync run
    pub batch_concurrency: usize,
    #[serde(with = "duration_millis", rename = "retry_base_delay_ms")]
    pub retry_base_delay: Duration,
    #[serde(with = "duration_millis", rename = "retry_max_delay_ms")]
    pub retry_max_delay: Duration,
    /// Refresh credentials when less than this much validity remains
    #[serde(with = "duration_millis", rename = "token_refresh_floor_ms")]
    pub token_refresh_floor: Duration,
    /// Refresh credentials when less than this fraction of their lifetime
    /// remains (whichever of floor and ratio is larger wins)
    pub token_refresh_ratio: f64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            api_key: None,
            local_mode: false,
            max_concurrent_requests: DEFAULT_MAX_CONCURRENT_REQUESTS,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            max_retry_attempts: DEFAULT_MAX_RETRY_ATTEMPTS,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_concurrency: DEFAULT_BATCH_CONCURRENCY,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            retry_max_delay: DEFAULT_RETRY_MAX_DELAY,
            token_refresh_floor: DEFAULT_TOKEN_REFRESH_FLOOR,
            token_refresh_ratio: DEFAULT_TOKEN_REFRESH_RATIO,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("local_mode", &self.local_mode)
            .field("max_concurrent_requests", &self.max_concurrent_requests)
            .field("request_timeout", &self.request_timeout)
            .field("max_retry_attempts", &self.max_retry_attempts)
            .field("batch_size", &self.batch_size)
            .field("batch_concurrency", &self.batch_concurrency)
            .field("retry_base_delay", &self.retry_base_delay)
            .field("retry_max_delay", &self.retry_max_delay)
            .field("token_refresh_floor", &self.token_refresh_floor)
            .field("token_refresh_ratio", &self.token_refresh_ratio)
            .finish()
    }
}

impl ClientConfig {
    /// Configuration for local testing against a backend that accepts the
    /// sentinel credential.
    #[must_use]
    pub fn local(api_base_url: impl Into<String>) -> Self {
        Self { api_base_url: api_base_url.into(), local_mode: true, ..Self::default() }
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns `DomainError::Config` describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let base = url::Url::parse(&self.api_base_url).map_err(|e| {
            DomainError::Config(format!("api_base_url '{}' is not a valid URL: {e}", self.api_base_url))
        })?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(DomainError::Config(format!(
                "api_base_url must use http or https, got '{}'",
                base.scheme()
            )));
        }

        if !self.local_mode && self.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(DomainError::Config(
                "api_key is required unless local_mode is enabled".to_string(),
            ));
        }

        if self.max_concurrent_requests == 0 {
            return Err(DomainError::Config(
                "max_concurrent_requests must be greater than 0".to_string(),
            ));
        }

        if self.request_timeout.is_zero() {
            return Err(DomainError::Config("request_timeout must be greater than 0".to_string()));
        }

        if !(1..=MAX_RETRY_ATTEMPTS_LIMIT).contains(&self.max_retry_attempts) {
            return Err(DomainError::Config(format!(
                "max_retry_attempts must be between 1 and {MAX_RETRY_ATTEMPTS_LIMIT}, got {}",
                self.max_retry_attempts
            )));
        }

        if self.batch_size == 0 {
            return Err(DomainError::Config("batch_size must be greater than 0".to_string()));
        }

        if self.batch_concurrency == 0 {
            return Err(DomainError::Config("batch_concurrency must be greater than 0".to_string()));
        }

        if self.retry_base_delay > self.retry_max_delay {
            return Err(DomainError::Config(format!(
                "retry_base_delay ({:?}) cannot be greater than retry_max_delay ({:?})",
                self.retry_base_delay, self.retry_max_delay
            )));
        }

        if !(0.0..1.0).contains(&self.token_refresh_ratio) {
            return Err(DomainError::Config(format!(
                "token_refresh_ratio must be in [0, 1), got {}",
                self.token_refresh_ratio
            )));
        }

        Ok(())
    }

    /// Base URL without a trailing slash, ready for path concatenation
    #[must_use]
    pub fn normalized_base_url(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}
