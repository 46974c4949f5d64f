//! Credential sources
//!
//! A [`CredentialSource`] performs one credential acquisition. Caching,
//! refresh timing and single-flight coordination belong to
//! [`TokenManager`](super::TokenManager).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use guildsync_common::Bulkhead;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::credential::Credential;
use crate::api::errors::ApiError;

/// Lifetime assumed when the token endpoint omits `expires_in`
pub const DEFAULT_TOKEN_LIFETIME: Duration = Duration::from_secs(3600);

/// Something that can mint a fresh credential
#[async_trait]
pub trait CredentialSource: Send + Sync + fmt::Debug {
    /// Acquire a new credential
    ///
    /// # Errors
    /// `CredentialsRejected` when the backend refuses the key; transport and
    /// 5xx failures use the regular [`ApiError`] variants.
    async fn fetch(&self) -> Result<Credential, ApiError>;
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    api_key: &'a str,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(alias = "token")]
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

/// Exchanges an API key for a bearer token at `POST {base}/token`
///
/// With a pool attached the exchange waits for a slot like any other
/// request, so the backend never sees more than the pool size in flight.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    token_url: String,
    api_key: String,
    timeout: Duration,
    pool: Option<Bulkhead>,
}

impl HttpCredentialSource {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            client,
            token_url: format!("{}/token", base_url.trim_end_matches('/')),
            api_key: api_key.into(),
            timeout,
            pool: None,
        }
    }

    /// Take a slot from `pool` for every exchange
    #[must_use]
    pub fn with_pool(mut self, pool: Bulkhead) -> Self {
        self.pool = Some(pool);
        self
    }

    async fn request_token(&self) -> Result<(u16, String), reqwest::Error> {
        let response = self
            .client
            .post(&self.token_url)
            .json(&TokenRequest { api_key: &self.api_key })
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        Ok((status, body))
    }
}

impl fmt::Debug for HttpCredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpCredentialSource")
            .field("token_url", &self.token_url)
            .field("api_key", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("pooled", &self.pool.is_some())
            .finish()
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    #[instrument(skip(self), fields(url = %self.token_url))]
    async fn fetch(&self) -> Result<Credential, ApiError> {
        let _slot = match &self.pool {
            Some(pool) => Some(pool.acquire().await?),
            None => None,
        };
        let (status, body) = match tokio::time::timeout(self.timeout, self.request_token()).await {
            Ok(Ok(answer)) => answer,
            Ok(Err(err)) => return Err(ApiError::from_transport(&err, self.timeout)),
            Err(_) => return Err(ApiError::Timeout(self.timeout)),
        };

        match status {
            200..=299 => {}
            400 | 401 | 403 => {
                warn!(status, "Token endpoint rejected the API key");
                return Err(ApiError::CredentialsRejected(format!(
                    "token endpoint answered {status}"
                )));
            }
            _ => return Err(ApiError::from_status(status, &body)),
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ApiError::Decode(format!("invalid token response: {e}")))?;
        if parsed.access_token.is_empty() {
            return Err(ApiError::Decode("token response carried an empty token".to_string()));
        }

        let lifetime = parsed.expires_in.map_or(DEFAULT_TOKEN_LIFETIME, Duration::from_secs);
        debug!(lifetime_secs = lifetime.as_secs(), "Acquired bearer credential");
        Ok(Credential::new(parsed.access_token, lifetime))
    }
}

/// Always yields the same non-expiring credential
#[derive(Debug, Clone)]
pub struct StaticCredentialSource {
    credential: Credential,
}

impl StaticCredentialSource {
    pub fn new(token: &str) -> Self {
        Self { credential: Credential::non_expiring(token) }
    }
}

#[async_trait]
impl CredentialSource for StaticCredentialSource {
    async fn fetch(&self) -> Result<Credential, ApiError> {
        Ok(self.credential.clone())
    }
}
