//! Backend API surface
//!
//! [`ApiClient`] is the entry point. The retry policy and error taxonomy
//! are shared with the batch engine in [`crate::sync`].

pub mod client;
pub mod endpoints;
pub mod errors;
pub mod retry;

pub use client::{ApiClient, ApiClientBuilder};
pub use errors::{ApiError, ApiErrorCategory};
pub use retry::{retry_config, with_retry, ApiRetryPolicy};
