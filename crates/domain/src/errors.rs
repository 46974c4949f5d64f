//! Error types used throughout the domain layer

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for domain-level validation
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "message")]
pub enum DomainError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, DomainError>;
