//! Domain constants
//!
//! Defaults for the client configuration surface. The environment variable
//! names live next to the loader in `guildsync-infra`.

use std::time::Duration;

/// Default connection pool size (max in-flight requests)
pub const DEFAULT_MAX_CONCURRENT_REQUESTS: usize = 10;
/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
/// Default total attempts per logical operation (initial try + retries)
pub const DEFAULT_MAX_RETRY_ATTEMPTS: u32 = 3;
/// Upper bound accepted for `max_retry_attempts`
pub const MAX_RETRY_ATTEMPTS_LIMIT: u32 = 10;
/// Default number of entities per sync batch
pub const DEFAULT_BATCH_SIZE: usize = 100;
/// Default number of batches in flight at once
pub const DEFAULT_BATCH_CONCURRENCY: usize = 1;
/// Default base delay for exponential backoff
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_millis(250);
/// Default cap for a single backoff delay
pub const DEFAULT_RETRY_MAX_DELAY: Duration = Duration::from_secs(10);
/// Minimum remaining validity before a credential is refreshed
pub const DEFAULT_TOKEN_REFRESH_FLOOR: Duration = Duration::from_secs(30);
/// Fraction of the credential lifetime kept as a refresh margin
pub const DEFAULT_TOKEN_REFRESH_RATIO: f64 = 0.1;

/// Sentinel credential accepted by the backend in local mode
pub const LOCAL_MODE_TOKEN: &str = "local-dev-token";
/// Default backend root used when nothing is configured
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8000/api";
