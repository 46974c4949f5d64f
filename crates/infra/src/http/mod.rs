//! HTTP plumbing: endpoint descriptors and the bounded request executor

pub mod endpoint;
pub mod executor;

pub use endpoint::{ApiRequest, Endpoint, HttpMethod, Idempotency, ResponseShape};
pub use executor::{ApiResponse, ExecutorMetrics, RequestExecutor, IDEMPOTENCY_HEADER};
