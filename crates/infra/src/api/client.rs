//! API client facade
//!
//! Exposes typed backend operations built on the token manager, the
//! bounded request executor and the retry policy. Single-entity calls run
//! as `retry(execute(token()))`; member sync goes through the batch engine.
//!
//! Each client owns its credential cache and connection pool, so several
//! independently configured clients can live in one process. Both are
//! released by [`ApiClient::close`], which also runs on drop.

use std::sync::Arc;

use guildsync_common::RetryConfig;
use guildsync_domain::constants::LOCAL_MODE_TOKEN;
use guildsync_domain::{
    ClientConfig, DiscordUser, DomainError, Guild, GuildMember, ModerationCase, ModerationFilter,
    SyncProgress, Warning,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::endpoints;
use super::errors::ApiError;
use super::retry::{retry_config, with_retry};
use crate::auth::{
    CredentialSource, HttpCredentialSource, RefreshPolicy, StaticCredentialSource, TokenManager,
};
use crate::http::{ApiRequest, ApiResponse, ExecutorMetrics, RequestExecutor};
use crate::sync::{BatchSyncEngine, SyncReport};

/// Typed client for the bot backend
pub struct ApiClient {
    config: ClientConfig,
    executor: RequestExecutor,
    tokens: TokenManager,
    retry: RetryConfig,
    engine: BatchSyncEngine,
}

impl ApiClient {
    /// Create a client from configuration
    ///
    /// # Errors
    /// `Config` if the configuration is invalid or the HTTP client cannot be
    /// built.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        Self::builder().config(config).build()
    }

    /// Create a builder for fluent configuration
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Connection pool counters
    pub fn metrics(&self) -> ExecutorMetrics {
        self.executor.metrics()
    }

    /// Credential refreshes started so far
    pub fn token_refreshes(&self) -> u64 {
        self.tokens.refresh_count()
    }

    /// One attempt: fetch a credential, execute, and drop the credential if
    /// the backend refused it.
    async fn attempt(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let credential = if request.endpoint().authenticated {
            Some(self.tokens.token().await?)
        } else {
            None
        };

        let result = self.executor.execute(request, credential.as_ref()).await;
        if let (Err(ApiError::Auth { status, .. }), Some(credential)) = (&result, &credential) {
            debug!(status, endpoint = request.endpoint().name, "Credential refused, invalidating");
            self.tokens.invalidate(credential);
        }
        result
    }

    async fn call(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let endpoint = request.endpoint();
        with_retry(&self.retry, endpoint.name, endpoint.idempotency, || self.attempt(request)).await
    }

    async fn call_json<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ApiError> {
        self.call(request).await?.json()
    }

    /// Decode the written record, or echo `sent` when the backend answered
    /// without a body
    async fn call_write<T>(&self, request: &ApiRequest, sent: &T) -> Result<T, ApiError>
    where
        T: DeserializeOwned + Clone,
    {
        let response = self.call(request).await?;
        if response.body.is_none() {
            return Ok(sent.clone());
        }
        response.json()
    }

    // ------------------------------------------------------------------
    // Guilds
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_guilds(&self) -> Result<Vec<Guild>, ApiError> {
        self.call_json(&ApiRequest::new(endpoints::LIST_GUILDS, &[])?).await
    }

    #[instrument(skip(self))]
    pub async fn get_guild(&self, guild_id: &str) -> Result<Guild, ApiError> {
        self.call_json(&ApiRequest::new(endpoints::GET_GUILD, &[guild_id])?).await
    }

    /// Create (or upsert) a guild keyed by `guild_id`
    #[instrument(skip(self, guild), fields(guild_id = %guild.guild_id))]
    pub async fn create_guild(&self, guild: &Guild) -> Result<Guild, ApiError> {
        let request = ApiRequest::new(endpoints::CREATE_GUILD, &[])?.json(guild)?;
        self.call_write(&request, guild).await
    }

    #[instrument(skip(self, guild), fields(guild_id = %guild.guild_id))]
    pub async fn update_guild(&self, guild: &Guild) -> Result<Guild, ApiError> {
        let request =
            ApiRequest::new(endpoints::UPDATE_GUILD, &[guild.guild_id.as_str()])?.json(guild)?;
        self.call_write(&request, guild).await
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_users(&self) -> Result<Vec<DiscordUser>, ApiError> {
        self.call_json(&ApiRequest::new(endpoints::LIST_USERS, &[])?).await
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, discord_id: &str) -> Result<DiscordUser, ApiError> {
        self.call_json(&ApiRequest::new(endpoints::GET_USER, &[discord_id])?).await
    }

    /// Create (or upsert) a user keyed by `discord_id`
    #[instrument(skip(self, user), fields(discord_id = %user.discord_id))]
    pub async fn create_user(&self, user: &DiscordUser) -> Result<DiscordUser, ApiError> {
        let request = ApiRequest::new(endpoints::CREATE_USER, &[])?.json(user)?;
        self.call_write(&request, user).await
    }

    #[instrument(skip(self, user), fields(discord_id = %user.discord_id))]
    pub async fn update_user(&self, user: &DiscordUser) -> Result<DiscordUser, ApiError> {
        let request =
            ApiRequest::new(endpoints::UPDATE_USER, &[user.discord_id.as_str()])?.json(user)?;
        self.call_write(&request, user).await
    }

    // ------------------------------------------------------------------
    // Members
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_members(&self, guild_id: &str) -> Result<Vec<GuildMember>, ApiError> {
        self.call_json(&ApiRequest::new(endpoints::LIST_MEMBERS, &[guild_id])?).await
    }

    /// Add (or upsert) one member keyed by guild and user
    #[instrument(skip(self, member), fields(guild_id = %member.guild_id, user_id = %member.user_id))]
    pub async fn add_member(&self, member: &GuildMember) -> Result<GuildMember, ApiError> {
        let request =
            ApiRequest::new(endpoints::ADD_MEMBER, &[member.guild_id.as_str()])?.json(member)?;
        self.call_write(&request, member).await
    }

    /// Upsert `members` of `guild_id` in batches of `batch_size`
    ///
    /// # Errors
    /// Only for problems that prevent any batch from being sent (closed
    /// client, empty guild id). Batch failures are reported in the
    /// [`SyncReport`].
    pub async fn sync_members(
        &self,
        guild_id: &str,
        members: &[GuildMember],
    ) -> Result<SyncReport, ApiError> {
        self.sync_members_with(guild_id, members, |_| {}, &CancellationToken::new()).await
    }

    /// [`sync_members`](Self::sync_members) with progress reporting and
    /// cancellation
    ///
    /// # Errors
    /// See [`sync_members`](Self::sync_members).
    #[instrument(skip(self, members, progress, cancel), fields(members = members.len()))]
    pub async fn sync_members_with<P>(
        &self,
        guild_id: &str,
        members: &[GuildMember],
        progress: P,
        cancel: &CancellationToken,
    ) -> Result<SyncReport, ApiError>
    where
        P: FnMut(SyncProgress),
    {
        if self.executor.is_closed() {
            return Err(ApiError::Closed);
        }
        // Validates the path once, before any batch is built
        endpoints::SYNC_MEMBERS.render(&[guild_id])?;

        let submit = |records: Arc<[GuildMember]>| async move {
            let request = ApiRequest::new(endpoints::SYNC_MEMBERS, &[guild_id])?.json(&*records)?;
            self.attempt(&request).await
        };

        Ok(self
            .engine
            .sync_all(members, endpoints::SYNC_MEMBERS.idempotency, submit, progress, cancel)
            .await)
    }

    // ------------------------------------------------------------------
    // Warnings
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_warnings(&self, filter: &ModerationFilter) -> Result<Vec<Warning>, ApiError> {
        let request = ApiRequest::new(endpoints::LIST_WARNINGS, &[])?.query(filter.query_pairs());
        self.call_json(&request).await
    }

    /// Record a warning
    ///
    /// Not idempotent: a timeout after the request was sent surfaces as
    /// `AmbiguousOutcome` instead of being retried.
    #[instrument(skip(self, warning), fields(guild_id = %warning.guild_id, user_id = %warning.user_id))]
    pub async fn create_warning(&self, warning: &Warning) -> Result<Warning, ApiError> {
        let request = ApiRequest::new(endpoints::CREATE_WARNING, &[])?.json(warning)?;
        self.call_write(&request, warning).await
    }

    // ------------------------------------------------------------------
    // Moderation cases
    // ------------------------------------------------------------------

    #[instrument(skip(self))]
    pub async fn list_moderation_cases(
        &self,
        filter: &ModerationFilter,
    ) -> Result<Vec<ModerationCase>, ApiError> {
        let request =
            ApiRequest::new(endpoints::LIST_MODERATION_CASES, &[])?.query(filter.query_pairs());
        self.call_json(&request).await
    }

    /// Open a moderation case; not idempotent, see
    /// [`create_warning`](Self::create_warning)
    #[instrument(skip(self, case), fields(guild_id = %case.guild_id, action = %case.action))]
    pub async fn create_moderation_case(
        &self,
        case: &ModerationCase,
    ) -> Result<ModerationCase, ApiError> {
        let request = ApiRequest::new(endpoints::CREATE_MODERATION_CASE, &[])?.json(case)?;
        self.call_write(&request, case).await
    }

    #[instrument(skip(self, case), fields(case_id = ?case.id))]
    pub async fn update_moderation_case(
        &self,
        case: &ModerationCase,
    ) -> Result<ModerationCase, ApiError> {
        let id = case.id.as_deref().ok_or_else(|| {
            DomainError::InvalidInput("moderation case has no id to update".to_string())
        })?;
        let request = ApiRequest::new(endpoints::UPDATE_MODERATION_CASE, &[id])?.json(case)?;
        self.call_write(&request, case).await
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Probe `GET /health` once, without credentials or retries
    ///
    /// # Errors
    /// The executor error of the single attempt.
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), ApiError> {
        let request = ApiRequest::new(endpoints::HEALTH, &[])?;
        self.executor.execute(&request, None).await.map(|_| ())
    }

    /// Release the connection pool and cancel any pending credential refresh
    ///
    /// Queued and later calls fail with `Closed`. Idempotent.
    pub fn close(&self) {
        if !self.executor.is_closed() {
            info!(base_url = %self.config.api_base_url, "Closing API client");
        }
        self.executor.close();
        self.tokens.close();
    }

    pub fn is_closed(&self) -> bool {
        self.executor.is_closed()
    }
}

impl Drop for ApiClient {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("config", &self.config)
            .field("executor", &self.executor)
            .field("tokens", &self.tokens)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`]
#[derive(Debug, Default)]
pub struct ApiClientBuilder {
    config: Option<ClientConfig>,
    credential_source: Option<Arc<dyn CredentialSource>>,
    http_client: Option<reqwest::Client>,
}

impl ApiClientBuilder {
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replace the credential source chosen from the configuration
    #[must_use]
    pub fn credential_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
        self.credential_source = Some(source);
        self
    }

    /// Share an existing `reqwest` client (and its connection pool)
    #[must_use]
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Validate the configuration and assemble the client
    ///
    /// Without an explicit source, local mode uses the sentinel credential
    /// and otherwise the API key is exchanged at `POST /token`.
    ///
    /// # Errors
    /// `Config` for an invalid configuration or HTTP client failure.
    pub fn build(self) -> Result<ApiClient, ApiError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let base_url = config.normalized_base_url().to_string();
        let http = match self.http_client {
            Some(client) => client,
            None => RequestExecutor::build_client(
                config.max_concurrent_requests,
                config.request_timeout,
            )?,
        };
        let executor = RequestExecutor::with_client(
            http.clone(),
            &base_url,
            config.max_concurrent_requests,
            config.request_timeout,
        )?;

        let source: Arc<dyn CredentialSource> = match self.credential_source {
            Some(source) => source,
            None if config.local_mode => Arc::new(StaticCredentialSource::new(LOCAL_MODE_TOKEN)),
            None => {
                let api_key = config.api_key.clone().ok_or_else(|| {
                    ApiError::Config("api_key is required unless local_mode is enabled".to_string())
                })?;
                Arc::new(
                    HttpCredentialSource::new(http, &base_url, api_key, config.request_timeout)
                        .with_pool(executor.pool().clone()),
                )
            }
        };

        let tokens = TokenManager::new(
            source,
            RefreshPolicy::new(config.token_refresh_ratio, config.token_refresh_floor),
        );

        info!(
            base_url = %base_url,
            local_mode = config.local_mode,
            max_concurrent = config.max_concurrent_requests,
            "API client created"
        );

        Ok(ApiClient {
            retry: retry_config(&config),
            engine: BatchSyncEngine::from_config(&config),
            executor,
            tokens,
            config,
        })
    }
}
