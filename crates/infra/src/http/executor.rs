//! Bounded, timeout-enforcing request executor
//!
//! Every request first takes a slot from a FIFO [`Bulkhead`] sized to the
//! connection pool, then runs under a hard timeout covering both the
//! response head and body. The slot is released when the attempt ends,
//! whichever way it ends.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use guildsync_common::{Bulkhead, BulkheadConfig};
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use super::endpoint::{ApiRequest, ResponseShape};
use crate::api::errors::ApiError;
use crate::auth::Credential;

/// Header carrying the per-operation idempotency key
pub const IDEMPOTENCY_HEADER: &str = "X-Idempotency-Key";

const USER_AGENT: &str = concat!("guildsync/", env!("CARGO_PKG_VERSION"));

/// Successful backend answer
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    /// Parsed JSON body; `None` for 204/205 and empty-shaped endpoints
    pub body: Option<serde_json::Value>,
}

impl ApiResponse {
    /// Decode the body into `T`
    ///
    /// # Errors
    /// `Decode` when the body is missing or does not match `T`.
    pub fn json<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        let body = self
            .body
            .ok_or_else(|| ApiError::Decode(format!("expected a JSON body, got {}", self.status)))?;
        serde_json::from_value(body).map_err(|e| ApiError::Decode(e.to_string()))
    }
}

/// Point-in-time executor counters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorMetrics {
    pub total_requests: u64,
    pub timeouts: u64,
    pub in_flight: usize,
    pub peak_in_flight: usize,
    pub max_concurrent: usize,
}

/// Issues HTTP requests under a bounded connection pool
#[derive(Debug, Clone)]
pub struct RequestExecutor {
    client: reqwest::Client,
    base_url: Arc<str>,
    timeout: Duration,
    bulkhead: Bulkhead,
    timeouts: Arc<AtomicU64>,
}

impl RequestExecutor {
    /// Create an executor with its own pooled `reqwest` client
    ///
    /// # Errors
    /// `Config` when `max_concurrent` is zero or the HTTP client cannot be
    /// built.
    pub fn new(base_url: &str, max_concurrent: usize, timeout: Duration) -> Result<Self, ApiError> {
        let client = Self::build_client(max_concurrent, timeout)?;
        Self::with_client(client, base_url, max_concurrent, timeout)
    }

    /// Create an executor around an existing `reqwest` client
    ///
    /// # Errors
    /// `Config` when `max_concurrent` is zero.
    pub fn with_client(
        client: reqwest::Client,
        base_url: &str,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let bulkhead = Bulkhead::new(BulkheadConfig::new(max_concurrent)).map_err(ApiError::Config)?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').into(),
            timeout,
            bulkhead,
            timeouts: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Pooled client matching the executor limits
    ///
    /// # Errors
    /// `Config` if the TLS backend cannot be initialised.
    pub fn build_client(max_concurrent: usize, timeout: Duration) -> Result<reqwest::Client, ApiError> {
        reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(max_concurrent)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| ApiError::Config(format!("failed to build HTTP client: {e}")))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Connection pool slots shared by every request of this client
    pub fn pool(&self) -> &Bulkhead {
        &self.bulkhead
    }

    /// Perform one attempt of `request`
    ///
    /// Waits for a pool slot first. The credential, when given, is sent as
    /// a bearer token; deciding whether to refresh it is the caller's job.
    ///
    /// # Errors
    /// - `Closed` once the executor is closed
    /// - `Timeout` when no complete response arrived in time
    /// - `Auth` for 401/403, `Server` for 5xx, `Client` for other statuses
    /// - `Connect`/`Network` for transport failures, `Decode` for bad JSON
    #[instrument(
        skip(self, request, credential),
        fields(endpoint = request.endpoint().name, method = %request.endpoint().method)
    )]
    pub async fn execute(
        &self,
        request: &ApiRequest,
        credential: Option<&Credential>,
    ) -> Result<ApiResponse, ApiError> {
        let _permit = self.bulkhead.acquire().await?;

        let url = format!("{}{}", self.base_url, request.path());
        let mut builder = self
            .client
            .request(request.endpoint().method.as_reqwest(), &url)
            .query(request.query_pairs());
        if let Some(credential) = credential {
            builder = builder.bearer_auth(credential.token());
        }
        if let Some(key) = request.idempotency_key() {
            builder = builder.header(IDEMPOTENCY_HEADER, key);
        }
        if let Some(body) = request.body() {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(body.to_owned());
        }

        debug!(%url, in_flight = self.bulkhead.current_concurrent(), "Sending request");

        let exchange = async {
            let response = builder.send().await?;
            let status = response.status().as_u16();
            let text = response.text().await?;
            Ok::<_, reqwest::Error>((status, text))
        };

        let (status, text) = match tokio::time::timeout(self.timeout, exchange).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(err)) => {
                let error = ApiError::from_transport(&err, self.timeout);
                if matches!(error, ApiError::Timeout(_)) {
                    self.timeouts.fetch_add(1, Ordering::Relaxed);
                }
                warn!(error = %error, "Request failed");
                return Err(error);
            }
            Err(_) => {
                self.timeouts.fetch_add(1, Ordering::Relaxed);
                warn!(timeout = ?self.timeout, "Request timed out");
                return Err(ApiError::Timeout(self.timeout));
            }
        };

        debug!(status, "Received response");

        if !(200..300).contains(&status) {
            return Err(ApiError::from_status(status, &text));
        }

        let empty = matches!(status, 204 | 205)
            || request.endpoint().response == ResponseShape::Empty
            || text.trim().is_empty();
        let body = if empty {
            None
        } else {
            Some(serde_json::from_str(&text).map_err(|e| {
                ApiError::Decode(format!("{}: invalid JSON body: {e}", request.endpoint().name))
            })?)
        };

        Ok(ApiResponse { status, body })
    }

    /// Reject queued and future requests; in-flight ones run to completion
    pub fn close(&self) {
        self.bulkhead.close();
    }

    pub fn is_closed(&self) -> bool {
        self.bulkhead.is_closed()
    }

    pub fn metrics(&self) -> ExecutorMetrics {
        let pool = self.bulkhead.metrics();
        ExecutorMetrics {
            total_requests: pool.total_operations,
            timeouts: self.timeouts.load(Ordering::Acquire),
            in_flight: pool.current_concurrent,
            peak_in_flight: pool.peak_concurrent,
            max_concurrent: pool.max_concurrent,
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{header, header_exists, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::http::endpoint::{Endpoint, HttpMethod};

    const GET_GUILD: Endpoint = Endpoint::new("get_guild", HttpMethod::Get, "/guilds/{}");
    const CREATE_WARNING: Endpoint = Endpoint::new("create_warning", HttpMethod::Post, "/warnings");
    const DELETE_THING: Endpoint =
        Endpoint::new("delete_thing", HttpMethod::Delete, "/things/{}").empty_response();

    fn executor(server: &MockServer, max: usize, timeout: Duration) -> RequestExecutor {
        RequestExecutor::new(&format!("{}/api", server.uri()), max, timeout).unwrap()
    }

    #[tokio::test]
    async fn test_sends_bearer_and_parses_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/guilds/42"))
            .and(header("authorization", "Bearer tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "guild_id": "42" })))
            .expect(1)
            .mount(&server)
            .await;

        let exec = executor(&server, 2, Duration::from_secs(2));
        let request = ApiRequest::new(GET_GUILD, &["42"]).unwrap();
        let credential = Credential::new("tok", Duration::from_secs(60));

        let response = exec.execute(&request, Some(&credential)).await.unwrap();
        assert_eq!(response.status, 200);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["guild_id"], "42");
    }

    #[tokio::test]
    async fn test_status_classification() {
        let server = MockServer::start().await;
        for (id, status) in [("401", 401), ("403", 403), ("404", 404), ("503", 503)] {
            Mock::given(method("GET"))
                .and(path(format!("/api/guilds/{id}")))
                .respond_with(ResponseTemplate::new(status))
                .mount(&server)
                .await;
        }

        let exec = executor(&server, 2, Duration::from_secs(2));
        let run = |id: &'static str| {
            let exec = exec.clone();
            async move { exec.execute(&ApiRequest::new(GET_GUILD, &[id]).unwrap(), None).await }
        };

        assert!(matches!(run("401").await, Err(ApiError::Auth { status: 401, .. })));
        assert!(matches!(run("403").await, Err(ApiError::Auth { status: 403, .. })));
        assert!(matches!(run("404").await, Err(ApiError::Client { status: 404, .. })));
        assert!(matches!(run("503").await, Err(ApiError::Server { status: 503, .. })));
    }

    #[tokio::test]
    async fn test_timeout_is_reported_and_counted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let exec = executor(&server, 1, Duration::from_millis(50));
        let result = exec.execute(&ApiRequest::new(GET_GUILD, &["1"]).unwrap(), None).await;

        assert!(matches!(result, Err(ApiError::Timeout(_))));
        let metrics = exec.metrics();
        assert_eq!(metrics.timeouts, 1);
        assert_eq!(metrics.in_flight, 0, "slot must be released after a timeout");
    }

    #[tokio::test]
    async fn test_non_idempotent_requests_carry_idempotency_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/warnings"))
            .and(header_exists("x-idempotency-key"))
            .and(header("content-type", "application/json"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!({ "id": "w1" })))
            .expect(1)
            .mount(&server)
            .await;

        let exec = executor(&server, 1, Duration::from_secs(2));
        let request =
            ApiRequest::new(CREATE_WARNING, &[]).unwrap().json(&serde_json::json!({ "reason": "spam" })).unwrap();
        exec.execute(&request, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_no_content_and_empty_shape_yield_no_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{\"ignored\":true}"))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("probe", "1"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let exec = executor(&server, 1, Duration::from_secs(2));
        let deleted = exec.execute(&ApiRequest::new(DELETE_THING, &["x"]).unwrap(), None).await.unwrap();
        assert_eq!(deleted.body, None);

        let probe = ApiRequest::new(GET_GUILD, &["1"]).unwrap().query([("probe", "1")]);
        let response = exec.execute(&probe, None).await.unwrap();
        assert_eq!(response.status, 204);
        assert_eq!(response.body, None);
    }

    #[tokio::test]
    async fn test_invalid_json_is_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let exec = executor(&server, 1, Duration::from_secs(2));
        let result = exec.execute(&ApiRequest::new(GET_GUILD, &["1"]).unwrap(), None).await;
        assert!(matches!(result, Err(ApiError::Decode(_))));
    }

    #[tokio::test]
    async fn test_pool_bounds_in_flight_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({}))
                    .set_delay(Duration::from_millis(50)),
            )
            .mount(&server)
            .await;

        let exec = executor(&server, 3, Duration::from_secs(5));
        let request = ApiRequest::new(GET_GUILD, &["1"]).unwrap();
        let results =
            futures::future::join_all((0..12).map(|_| exec.execute(&request, None))).await;

        assert!(results.iter().all(Result::is_ok));
        let metrics = exec.metrics();
        assert_eq!(metrics.total_requests, 12);
        assert!(metrics.peak_in_flight <= 3, "peak {} exceeds pool", metrics.peak_in_flight);
        assert_eq!(metrics.in_flight, 0);
    }

    #[tokio::test]
    async fn test_closed_executor_rejects_requests() {
        let server = MockServer::start().await;
        let exec = executor(&server, 1, Duration::from_secs(1));
        exec.close();

        let result = exec.execute(&ApiRequest::new(GET_GUILD, &["1"]).unwrap(), None).await;
        assert!(matches!(result, Err(ApiError::Closed)));
        assert!(server.received_requests().await.unwrap().is_empty());
    }
}
