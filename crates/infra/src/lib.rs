//! # GuildSync Infrastructure
//!
//! I/O side of the GuildSync client.
//!
//! This crate contains:
//! - The typed backend client ([`ApiClient`])
//! - Credential acquisition and single-flight refresh ([`TokenManager`])
//! - The bounded HTTP request executor ([`RequestExecutor`])
//! - The batch synchronization engine ([`BatchSyncEngine`])
//! - Configuration loading (environment, TOML/JSON files)
//! - Tracing subscriber setup
//!
//! ## Architecture
//! - Resilience primitives (retry, bulkhead) come from `guildsync-common`
//! - Records and configuration come from `guildsync-domain`

pub mod api;
pub mod auth;
pub mod config;
pub mod http;
pub mod observability;
pub mod sync;

// Re-export commonly used items
pub use api::{ApiClient, ApiClientBuilder, ApiError, ApiErrorCategory};
pub use auth::{
    Credential, CredentialSource, HttpCredentialSource, RefreshPolicy, StaticCredentialSource,
    TokenManager,
};
pub use http::{ApiRequest, ApiResponse, Endpoint, ExecutorMetrics, Idempotency, RequestExecutor};
pub use observability::{init_tracing, LogFormat};
pub use sync::{BatchFailure, BatchSyncEngine, SyncReport};
