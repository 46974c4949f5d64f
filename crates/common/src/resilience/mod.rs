//! Resilience patterns for fault tolerance
//!
//! This module provides **generic, reusable** building blocks:
//! - **Retry**: a retry executor whose retriability decision is delegated to
//!   a [`RetryPolicy`], with exponential backoff and jitter
//! - **Bulkhead**: a FIFO counting semaphore that bounds concurrent
//!   operations and reports utilization
//!
//! Both are generic over the caller's error type; the HTTP-specific
//! classification lives in `guildsync-infra`.

pub mod bulkhead;
pub mod retry;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadError, BulkheadMetrics, BulkheadPermit};
pub use retry::{
    BackoffStrategy, Jitter, RetryConfig, RetryConfigBuilder, RetryDecision, RetryError,
    RetryExecutor, RetryOutcome, RetryPolicy, RetryResult,
};
