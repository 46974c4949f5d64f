//! Bulk synchronization
//!
//! [`BatchSyncEngine`] splits large entity sets (guild member lists) into
//! bounded batches and reports per-batch outcomes.

pub mod batch;

pub use batch::{BatchFailure, BatchSyncEngine, SyncReport};
