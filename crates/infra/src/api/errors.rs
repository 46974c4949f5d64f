//! API-specific error types
//!
//! Provides error classification for API operations with retry metadata.
//! `ApiError` is `Clone` so a single credential refresh result can be handed
//! to every caller waiting on it.

use std::time::Duration;

use guildsync_common::BulkheadError;
use guildsync_domain::DomainError;
use thiserror::Error;

/// Maximum number of response-body characters kept in an error message
const MAX_ERROR_BODY_CHARS: usize = 512;

/// Categories of API errors for retry logic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorCategory {
    /// 401/403 on a resource call - retry once after a credential refresh
    Authentication,
    /// Token endpoint rejected the API key - non-retryable
    CredentialsRejected,
    /// Server errors (5xx) and timeouts - retryable
    Server,
    /// Client errors (4xx except auth) and undecodable responses -
    /// non-retryable
    Client,
    /// Network/connection errors - retryable
    Network,
    /// A write may or may not have been applied
    Ambiguous,
    /// Retry budget exhausted
    Exhausted,
    /// Local configuration or lifecycle errors - non-retryable
    Local,
}

/// API operation errors
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    #[error("Authentication failed ({status}): {message}")]
    Auth { status: u16, message: String },

    #[error("Credentials rejected: {0}")]
    CredentialsRejected(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Client error ({status}): {message}")]
    Client { status: u16, message: String },

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Outcome of {operation} is unknown: {cause}")]
    AmbiguousOutcome { operation: String, cause: Box<ApiError> },

    #[error("Sync failed after {attempts} attempt(s): {source}")]
    Sync {
        attempts: u32,
        #[source]
        source: Box<ApiError>,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Client is closed")]
    Closed,

    /// A retry was skipped because the sync run was cancelled
    #[error("Operation cancelled")]
    Cancelled,
}

impl ApiError {
    /// Map a non-success HTTP status to the matching error
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = truncate(body);
        match status {
            401 | 403 => Self::Auth { status, message },
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    /// Classify a transport-level failure reported by `reqwest`
    pub fn from_transport(err: &reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            Self::Timeout(timeout)
        } else if err.is_connect() {
            Self::Connect(err.to_string())
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else if err.is_builder() {
            Self::Config(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }

    /// Get the error category for this error
    pub const fn category(&self) -> ApiErrorCategory {
        match self {
            Self::Auth { .. } => ApiErrorCategory::Authentication,
            Self::CredentialsRejected(_) => ApiErrorCategory::CredentialsRejected,
            Self::Timeout(_) | Self::Server { .. } => ApiErrorCategory::Server,
            Self::Client { .. } | Self::Decode(_) => ApiErrorCategory::Client,
            Self::Connect(_) | Self::Network(_) => ApiErrorCategory::Network,
            Self::AmbiguousOutcome { .. } => ApiErrorCategory::Ambiguous,
            Self::Sync { .. } => ApiErrorCategory::Exhausted,
            Self::Config(_) | Self::Closed | Self::Cancelled => ApiErrorCategory::Local,
        }
    }

    /// Whether retrying the same request can plausibly succeed
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Server { .. } | Self::Connect(_) | Self::Network(_)
        )
    }

    /// HTTP status carried by the error, if the backend answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Server { status, .. } | Self::Client { status, .. } => {
                Some(*status)
            }
            Self::AmbiguousOutcome { cause, .. } => cause.status(),
            Self::Sync { source, .. } => source.status(),
            _ => None,
        }
    }

    /// The innermost error, looking through `Sync` and `AmbiguousOutcome`
    pub fn root_cause(&self) -> &Self {
        match self {
            Self::Sync { source, .. } => source.root_cause(),
            Self::AmbiguousOutcome { cause, .. } => cause.root_cause(),
            other => other,
        }
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<BulkheadError> for ApiError {
    fn from(err: BulkheadError) -> Self {
        match err {
            BulkheadError::Closed => Self::Closed,
        }
    }
}

fn truncate(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_ERROR_BODY_CHARS {
        return trimmed.to_string();
    }
    let mut message: String = trimmed.chars().take(MAX_ERROR_BODY_CHARS).collect();
    message.push_str("...");
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Auth { status: 401, .. }));
        assert!(matches!(ApiError::from_status(403, ""), ApiError::Auth { status: 403, .. }));
        assert!(matches!(ApiError::from_status(503, "down"), ApiError::Server { status: 503, .. }));
        assert!(matches!(ApiError::from_status(404, ""), ApiError::Client { status: 404, .. }));
        assert!(matches!(ApiError::from_status(429, ""), ApiError::Client { status: 429, .. }));
    }

    #[test]
    fn test_error_categories() {
        assert_eq!(
            ApiError::Auth { status: 401, message: String::new() }.category(),
            ApiErrorCategory::Authentication
        );
        assert_eq!(ApiError::Timeout(Duration::from_secs(1)).category(), ApiErrorCategory::Server);
        assert_eq!(ApiError::Connect("refused".into()).category(), ApiErrorCategory::Network);
        assert_eq!(ApiError::Decode("bad".into()).category(), ApiErrorCategory::Client);
        assert_eq!(ApiError::Closed.category(), ApiErrorCategory::Local);
    }

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ApiError::from_status(502, "").is_transient());
        assert!(ApiError::Network("reset".into()).is_transient());
        assert!(!ApiError::from_status(400, "").is_transient());
        assert!(!ApiError::from_status(401, "").is_transient());
        assert!(!ApiError::CredentialsRejected("bad key".into()).is_transient());
    }

    #[test]
    fn test_root_cause_and_status_look_through_wrappers() {
        let err = ApiError::Sync { attempts: 3, source: Box::new(ApiError::from_status(503, "")) };
        assert_eq!(err.status(), Some(503));
        assert!(matches!(err.root_cause(), ApiError::Server { status: 503, .. }));
        assert_eq!(err.to_string(), "Sync failed after 3 attempt(s): Server error (503): ");
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let ApiError::Client { message, .. } = ApiError::from_status(400, &body) else {
            panic!("expected client error");
        };
        assert_eq!(message.len(), MAX_ERROR_BODY_CHARS + 3);
    }

    #[test]
    fn test_bulkhead_errors_convert() {
        assert!(matches!(ApiError::from(BulkheadError::Closed), ApiError::Closed));
        assert!(matches!(
            ApiError::from(DomainError::InvalidInput("no id".into())),
            ApiError::Config(_)
        ));
    }
}
