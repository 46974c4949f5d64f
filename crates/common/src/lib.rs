//! Common utilities shared across GuildSync crates.
//!
//! Currently this is the resilience toolkit: a policy-driven retry executor
//! with exponential backoff and jitter, and a bulkhead that bounds the
//! number of concurrent operations.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod resilience;

pub use resilience::{
    BackoffStrategy, Bulkhead, BulkheadConfig, BulkheadError, BulkheadMetrics, BulkheadPermit,
    Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError, RetryExecutor,
    RetryOutcome, RetryPolicy, RetryResult,
};
