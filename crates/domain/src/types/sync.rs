//! Batch synchronization data model

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::impl_domain_status_conversions;

/// Completion state of one batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchState {
    Pending,
    InFlight,
    Succeeded,
    Failed,
}

impl_domain_status_conversions!(BatchState {
    Pending => "pending",
    InFlight => "in_flight",
    Succeeded => "succeeded",
    Failed => "failed",
});

impl BatchState {
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }
}

/// A contiguous, ordered slice of the input collection submitted as one call
///
/// Records are shared behind an `Arc` so that every retry attempt can hand
/// an owned view to the request future without copying entities.
#[derive(Debug, Clone)]
pub struct SyncBatch<E> {
    index: usize,
    offset: usize,
    records: Arc<[E]>,
    state: BatchState,
}

impl<E> SyncBatch<E> {
    /// Create a pending batch
    ///
    /// `offset` is the position of the first record in the input collection.
    pub fn new(index: usize, offset: usize, records: Vec<E>) -> Self {
        Self { index, offset, records: records.into(), state: BatchState::Pending }
    }

    /// Zero-based position of this batch in submission order
    #[must_use]
    pub const fn index(&self) -> usize {
        self.index
    }

    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Shared handle to the records, in input order
    #[must_use]
    pub fn records(&self) -> Arc<[E]> {
        Arc::clone(&self.records)
    }

    #[must_use]
    pub const fn state(&self) -> BatchState {
        self.state
    }

    /// Move the batch to `next`
    ///
    /// Terminal states are final; transitions out of them are ignored.
    pub fn transition(&mut self, next: BatchState) {
        if !self.state.is_terminal() {
            self.state = next;
        }
    }
}

impl<E: Clone> SyncBatch<E> {
    /// Split `entities` into contiguous batches of at most `batch_size`
    /// records, preserving input order.
    ///
    /// A `batch_size` of zero is treated as one.
    pub fn partition(entities: &[E], batch_size: usize) -> Vec<Self> {
        let size = batch_size.max(1);
        entities
            .chunks(size)
            .enumerate()
            .map(|(index, chunk)| Self::new(index, index * size, chunk.to_vec()))
            .collect()
    }
}

/// Progress notification emitted after every finished batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
    /// Index of the batch that just finished
    pub batch_index: usize,
    /// Entities processed so far (succeeded + failed)
    pub processed: usize,
    /// Total entities in this sync run
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl std::fmt::Display for SyncProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{} synced", self.processed, self.total)
    }
}
