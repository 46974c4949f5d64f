//! Batch synchronization engine
//!
//! Partitions an entity collection into contiguous, bounded batches and
//! drives each through the retry policy. A batch failure never aborts the
//! run: failures are collected into the [`SyncReport`] so partial success
//! is representable.
//!
//! Batches are submitted in input order. With a concurrency of 1 they also
//! complete in order; with more, up to N batches are in flight at once and
//! complete in any order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use guildsync_common::RetryConfig;
use guildsync_domain::{BatchState, ClientConfig, SyncBatch, SyncProgress};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::api::errors::ApiError;
use crate::api::retry::{retry_config, with_retry};
use crate::http::Idempotency;

/// Terminal failure of one batch
#[derive(Debug, Clone)]
pub struct BatchFailure {
    pub batch_index: usize,
    /// Position of the batch's first entity in the input
    pub offset: usize,
    /// Number of entities in the batch
    pub entities: usize,
    pub cause: ApiError,
}

/// Outcome of one `sync_all` run
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Entities supplied
    pub total: usize,
    /// Batches planned
    pub batches: usize,
    /// Entities in batches that succeeded
    pub succeeded: usize,
    /// Entities in batches that failed terminally
    pub failed: usize,
    /// Entities never submitted because the run was cancelled
    pub skipped: usize,
    /// Failed batches, ordered by batch index
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl SyncReport {
    /// Every entity was delivered
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0 && !self.cancelled
    }

    pub fn failed_batch_indices(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.batch_index).collect()
    }
}

/// Drives batches of entities through the retry policy
#[derive(Debug, Clone)]
pub struct BatchSyncEngine {
    batch_size: usize,
    concurrency: usize,
    retry: RetryConfig,
}

impl BatchSyncEngine {
    /// Zero sizes are treated as one.
    pub fn new(batch_size: usize, concurrency: usize, retry: RetryConfig) -> Self {
        Self { batch_size: batch_size.max(1), concurrency: concurrency.max(1), retry }
    }

    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.batch_size, config.batch_concurrency, retry_config(config))
    }

    pub const fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Synchronize `entities` batch by batch
    ///
    /// `operation` submits one batch in a single attempt; retries follow the
    /// policy for `idempotency`. `progress` is called after every finished
    /// batch. Once `cancel` fires no further batch is submitted and no
    /// batch is retried: a request already in flight runs to completion, a
    /// batch that would need another attempt fails with
    /// [`ApiError::Cancelled`], and batches never submitted are reported as
    /// skipped.
    ///
    /// An empty input returns an empty report without calling `operation`.
    #[instrument(
        skip_all,
        fields(total = entities.len(), batch_size = self.batch_size, concurrency = self.concurrency)
    )]
    pub async fn sync_all<E, F, Fut, T, P>(
        &self,
        entities: &[E],
        idempotency: Idempotency,
        operation: F,
        mut progress: P,
        cancel: &CancellationToken,
    ) -> SyncReport
    where
        E: Clone,
        F: Fn(Arc<[E]>) -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
        P: FnMut(SyncProgress),
    {
        let started = Instant::now();
        let total = entities.len();
        if total == 0 {
            debug!("Nothing to synchronize");
            return SyncReport::default();
        }

        let batches = SyncBatch::partition(entities, self.batch_size);
        let planned = batches.len();
        let mut report = SyncReport { total, batches: planned, ..SyncReport::default() };

        let operation = &operation;
        let retry = &self.retry;
        let mut submitted = 0usize;

        let mut completions = stream::iter(batches)
            .take_while(|_| futures::future::ready(!cancel.is_cancelled()))
            .map(|mut batch: SyncBatch<E>| async move {
                batch.transition(BatchState::InFlight);
                debug!(batch = batch.index(), size = batch.len(), "Submitting batch");

                let records = batch.records();
                let mut retrying = false;
                let result = with_retry(retry, "sync_batch", idempotency, || {
                    let first = !std::mem::replace(&mut retrying, true);
                    let attempt =
                        (first || !cancel.is_cancelled()).then(|| operation(Arc::clone(&records)));
                    async move {
                        match attempt {
                            Some(attempt) => attempt.await,
                            None => Err(ApiError::Cancelled),
                        }
                    }
                })
                .await
                .map(|_| ());

                batch.transition(if result.is_ok() {
                    BatchState::Succeeded
                } else {
                    BatchState::Failed
                });
                (batch, result)
            })
            .buffer_unordered(self.concurrency);

        while let Some((batch, result)) = completions.next().await {
            submitted += 1;
            match result {
                Ok(()) => report.succeeded += batch.len(),
                Err(cause) => {
                    warn!(batch = batch.index(), size = batch.len(), error = %cause, "Batch failed");
                    report.failed += batch.len();
                    report.failures.push(BatchFailure {
                        batch_index: batch.index(),
                        offset: batch.offset(),
                        entities: batch.len(),
                        cause,
                    });
                }
            }

            progress(SyncProgress {
                batch_index: batch.index(),
                processed: report.succeeded + report.failed,
                total,
                succeeded: report.succeeded,
                failed: report.failed,
            });
        }

        report.skipped = total - report.succeeded - report.failed;
        report.cancelled = submitted < planned;
        report.failures.sort_by_key(|f| f.batch_index);
        report.elapsed = started.elapsed();

        if report.cancelled {
            warn!(
                submitted,
                planned,
                skipped = report.skipped,
                "Sync cancelled before all batches were submitted"
            );
        }
        info!(
            succeeded = report.succeeded,
            failed = report.failed,
            skipped = report.skipped,
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Sync finished"
        );

        report
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use parking_lot::Mutex;

    use super::*;

    fn fast_retry(max_attempts: u32) -> RetryConfig {
        RetryConfig::builder()
            .max_attempts(max_attempts)
            .fixed_backoff(Duration::from_millis(1))
            .no_jitter()
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_calls() {
        let engine = BatchSyncEngine::new(100, 1, fast_retry(3));
        let calls = AtomicUsize::new(0);
        let mut progress_events = 0;

        let report = engine
            .sync_all(
                &Vec::<u32>::new(),
                Idempotency::Idempotent,
                |_records| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, ApiError>(()) }
                },
                |_| progress_events += 1,
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(progress_events, 0);
        assert_eq!(report.total, 0);
        assert_eq!(report.batches, 0);
        assert!(report.is_complete_success());
    }

    #[tokio::test]
    async fn test_batches_cover_input_in_order() {
        let engine = BatchSyncEngine::new(7, 1, fast_retry(3));
        let entities: Vec<u32> = (0..30).collect();
        let seen = Mutex::new(Vec::<Vec<u32>>::new());
        let mut progress = Vec::new();

        let report = engine
            .sync_all(
                &entities,
                Idempotency::Idempotent,
                |records: Arc<[u32]>| {
                    seen.lock().push(records.to_vec());
                    async { Ok::<_, ApiError>(()) }
                },
                |p| progress.push(p),
                &CancellationToken::new(),
            )
            .await;

        let seen = seen.into_inner();
        assert_eq!(seen.len(), 5);
        assert!(seen.iter().all(|b| b.len() <= 7));
        assert_eq!(seen.concat(), entities);
        assert_eq!(report.succeeded, 30);
        assert!(report.is_complete_success());

        let indices: Vec<usize> = progress.iter().map(|p| p.batch_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
        assert_eq!(progress.last().map(|p| p.processed), Some(30));
    }

    #[tokio::test]
    async fn test_failed_batch_does_not_abort_the_run() {
        let engine = BatchSyncEngine::new(10, 1, fast_retry(2));
        let entities: Vec<u32> = (0..30).collect();

        let report = engine
            .sync_all(
                &entities,
                Idempotency::Idempotent,
                |records: Arc<[u32]>| async move {
                    if records[0] == 10 {
                        Err(ApiError::from_status(500, "boom"))
                    } else {
                        Ok(())
                    }
                },
                |_| {},
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.succeeded, 20);
        assert_eq!(report.failed, 10);
        assert_eq!(report.failed_batch_indices(), vec![1]);
        assert_eq!(report.failures[0].offset, 10);
        assert!(matches!(report.failures[0].cause, ApiError::Sync { attempts: 2, .. }));
        assert!(!report.is_complete_success());
    }

    #[tokio::test]
    async fn test_cancellation_stops_new_batches() {
        let engine = BatchSyncEngine::new(10, 1, fast_retry(1));
        let entities: Vec<u32> = (0..50).collect();
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let report = engine
            .sync_all(
                &entities,
                Idempotency::Idempotent,
                |_records| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    async { Ok::<_, ApiError>(()) }
                },
                |p| {
                    if p.batch_index == 1 {
                        cancel.cancel();
                    }
                },
                &cancel,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.succeeded, 20);
        assert_eq!(report.skipped, 30);
        assert!(report.cancelled);
        assert!(!report.is_complete_success());
    }

    #[tokio::test]
    async fn test_cancellation_stops_retries_of_in_flight_batch() {
        let engine = BatchSyncEngine::new(10, 1, fast_retry(5));
        let entities: Vec<u32> = (0..20).collect();
        let cancel = CancellationToken::new();
        let calls = AtomicUsize::new(0);

        let report = engine
            .sync_all(
                &entities,
                Idempotency::Idempotent,
                |_records| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    cancel.cancel();
                    async { Err::<(), _>(ApiError::from_status(503, "busy")) }
                },
                |_| {},
                &cancel,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(report.failed, 10);
        assert_eq!(report.skipped, 10);
        assert!(report.cancelled);
        assert!(matches!(report.failures[0].cause, ApiError::Cancelled));
    }

    #[tokio::test]
    async fn test_parallel_batches_respect_concurrency() {
        let engine = BatchSyncEngine::new(5, 3, fast_retry(1));
        let entities: Vec<u32> = (0..40).collect();
        let running = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);

        let report = engine
            .sync_all(
                &entities,
                Idempotency::Idempotent,
                |_records| {
                    let running = &running;
                    let peak = &peak;
                    async move {
                        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        running.fetch_sub(1, Ordering::SeqCst);
                        Ok::<_, ApiError>(())
                    }
                },
                |_| {},
                &CancellationToken::new(),
            )
            .await;

        assert_eq!(report.succeeded, 40);
        assert_eq!(report.batches, 8);
        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert!(peak.load(Ordering::SeqCst) >= 2);
    }
}
