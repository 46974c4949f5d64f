//! Bulkhead pattern for limiting concurrent operations
//!
//! A bulkhead caps how many operations may run at the same time. Callers
//! beyond the cap wait in FIFO order for a slot instead of failing, so a
//! burst of work is smoothed out rather than rejected. Each slot is held as
//! an owned [`BulkheadPermit`] and released when the permit drops, which
//! covers success, failure, timeout and cancellation alike.

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, instrument};

/// Errors raised while acquiring a bulkhead slot
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BulkheadError {
    /// The bulkhead was closed; no further slots are handed out
    #[error("bulkhead is closed")]
    Closed,
}

/// Configuration for bulkhead behavior
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkheadConfig {
    /// Maximum number of concurrent operations allowed
    pub max_concurrent: usize,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self { max_concurrent: 10 }
    }
}

impl BulkheadConfig {
    pub const fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Validate the configuration
    ///
    /// # Errors
    /// Returns a message when `max_concurrent` is zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrent == 0 {
            return Err("max_concurrent must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Point-in-time view of bulkhead usage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkheadMetrics {
    /// Total number of permits handed out
    pub total_operations: u64,
    /// Operations currently holding a permit
    pub current_concurrent: usize,
    /// Highest value `current_concurrent` has reached
    pub peak_concurrent: usize,
    /// Callers currently waiting for a permit
    pub waiting: usize,
    /// Maximum concurrent operations allowed
    pub max_concurrent: usize,
}

impl BulkheadMetrics {
    /// Current utilization (0.0 to 1.0)
    #[allow(clippy::cast_precision_loss)]
    pub fn utilization(&self) -> f64 {
        if self.max_concurrent == 0 {
            return 0.0;
        }
        self.current_concurrent as f64 / self.max_concurrent as f64
    }

    pub const fn is_at_capacity(&self) -> bool {
        self.current_concurrent >= self.max_concurrent
    }
}

#[derive(Debug, Default)]
struct Counters {
    total: AtomicU64,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    waiting: AtomicUsize,
}

/// Bulkhead for limiting concurrent operations
///
/// Clones share the same slots and counters.
///
/// # Examples
///
/// ```rust
/// use guildsync_common::resilience::{Bulkhead, BulkheadConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let bulkhead = Bulkhead::new(BulkheadConfig::new(5))?;
///
/// let permit = bulkhead.acquire().await?;
/// // ... perform the guarded operation ...
/// drop(permit);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Bulkhead {
    config: BulkheadConfig,
    semaphore: Arc<Semaphore>,
    counters: Arc<Counters>,
}

impl Bulkhead {
    /// Create a new bulkhead with the given configuration
    ///
    /// # Errors
    /// Returns the validation message for an invalid configuration.
    pub fn new(config: BulkheadConfig) -> Result<Self, String> {
        config.validate()?;
        Ok(Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            counters: Arc::new(Counters::default()),
            config,
        })
    }

    pub const fn config(&self) -> &BulkheadConfig {
        &self.config
    }

    /// Wait for a free slot
    ///
    /// Waiters are served in arrival order.
    ///
    /// # Errors
    /// `Closed` once [`close`](Self::close) was called.
    pub async fn acquire(&self) -> Result<BulkheadPermit, BulkheadError> {
        self.counters.waiting.fetch_add(1, Ordering::AcqRel);
        let acquired = Arc::clone(&self.semaphore).acquire_owned().await;
        self.counters.waiting.fetch_sub(1, Ordering::AcqRel);

        let permit = acquired.map_err(|_| BulkheadError::Closed)?;
        Ok(self.track(permit))
    }

    fn track(&self, permit: OwnedSemaphorePermit) -> BulkheadPermit {
        self.counters.total.fetch_add(1, Ordering::Relaxed);
        let now = self.counters.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.counters.peak.fetch_max(now, Ordering::AcqRel);
        BulkheadPermit { _permit: permit, counters: Arc::clone(&self.counters) }
    }

    /// Run `operation` while holding a slot
    ///
    /// # Errors
    /// Propagates acquire failures; the operation's own result is returned
    /// as the inner value.
    #[instrument(skip(self, operation), fields(concurrent = self.current_concurrent()))]
    pub async fn execute<F, Fut, T>(&self, operation: F) -> Result<T, BulkheadError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await?;
        debug!(concurrent = self.current_concurrent(), "Bulkhead: executing operation");
        Ok(operation().await)
    }

    /// Stop handing out slots
    ///
    /// Pending and future acquires fail with `Closed`; permits already held
    /// stay valid until dropped.
    pub fn close(&self) {
        if !self.semaphore.is_closed() {
            debug!("Bulkhead closed");
        }
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }

    /// Number of operations currently holding a slot
    pub fn current_concurrent(&self) -> usize {
        self.counters.in_flight.load(Ordering::Acquire)
    }

    /// Get bulkhead metrics
    pub fn metrics(&self) -> BulkheadMetrics {
        BulkheadMetrics {
            total_operations: self.counters.total.load(Ordering::Acquire),
            current_concurrent: self.current_concurrent(),
            peak_concurrent: self.counters.peak.load(Ordering::Acquire),
            waiting: self.counters.waiting.load(Ordering::Acquire),
            max_concurrent: self.config.max_concurrent,
        }
    }
}

impl fmt::Debug for Bulkhead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bulkhead")
            .field("max_concurrent", &self.config.max_concurrent)
            .field("current_concurrent", &self.current_concurrent())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A held bulkhead slot, released on drop
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct BulkheadPermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<Counters>,
}

impl Drop for BulkheadPermit {
    fn drop(&mut self) {
        self.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl fmt::Debug for BulkheadPermit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkheadPermit").finish_non_exhaustive()
    }
}
