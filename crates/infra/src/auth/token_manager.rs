//! Token manager with single-flight refresh
//!
//! Manages the bearer credential lifecycle for one client instance:
//! - Lazily acquires a credential on first use
//! - Refreshes it once it enters the safety margin before expiry
//! - Shares one in-flight refresh between all concurrent callers
//! - Drops a credential the backend refused (401/403) so the next call
//!   refreshes
//!
//! The refresh itself runs as a spawned task whose result is published
//! through a [`Shared`] future. Callers that arrive while it is running
//! clone and await the same future instead of starting their own.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tokio::task::AbortHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use super::credential::{Credential, RefreshPolicy};
use super::source::CredentialSource;
use crate::api::errors::ApiError;

type SharedRefresh = Shared<BoxFuture<'static, Result<Credential, ApiError>>>;

struct PendingRefresh {
    attempt: u64,
    future: SharedRefresh,
    abort: AbortHandle,
}

/// Releases the pending slot when a refresh task ends, panics included
struct PendingSlot {
    state: Arc<Mutex<TokenState>>,
    attempt: u64,
}

impl Drop for PendingSlot {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.pending.as_ref().is_some_and(|pending| pending.attempt == self.attempt) {
            state.pending = None;
        }
    }
}

#[derive(Default)]
struct TokenState {
    current: Option<Credential>,
    pending: Option<PendingRefresh>,
    closed: bool,
}

/// Caches and refreshes the client's bearer credential
pub struct TokenManager {
    source: Arc<dyn CredentialSource>,
    policy: RefreshPolicy,
    state: Arc<Mutex<TokenState>>,
    refreshes: Arc<AtomicU64>,
}

impl TokenManager {
    pub fn new(source: Arc<dyn CredentialSource>, policy: RefreshPolicy) -> Self {
        Self {
            source,
            policy,
            state: Arc::new(Mutex::new(TokenState::default())),
            refreshes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Return a credential that is valid beyond the safety margin
    ///
    /// Refreshes transparently when no credential is cached or the cached
    /// one is due. Concurrent callers during a refresh share its result.
    ///
    /// # Errors
    /// `Closed` after [`close`](Self::close); otherwise whatever the
    /// credential source reported (`CredentialsRejected`, transport errors).
    pub async fn token(&self) -> Result<Credential, ApiError> {
        let refresh = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(ApiError::Closed);
            }

            if let Some(current) = &state.current {
                if !self.policy.needs_refresh(current, Instant::now()) {
                    return Ok(current.clone());
                }
            }

            match &state.pending {
                Some(pending) => pending.future.clone(),
                None => self.start_refresh(&mut state),
            }
        };

        refresh.await
    }

    /// Spawn the refresh task and publish it as the pending refresh
    ///
    /// Must be called with the state lock held.
    fn start_refresh(&self, state: &mut TokenState) -> SharedRefresh {
        let attempt = self.refreshes.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(attempt, "Starting credential refresh");

        let source = Arc::clone(&self.source);
        let slot = PendingSlot { state: Arc::clone(&self.state), attempt };
        let handle = tokio::spawn(async move {
            let result = source.fetch().await;

            let mut state = slot.state.lock();
            state.pending = None;
            match &result {
                Ok(credential) if !state.closed => {
                    state.current = Some(credential.clone());
                    info!(attempt, "Credential refreshed");
                }
                Ok(_) => {}
                Err(error) => warn!(attempt, error = %error, "Credential refresh failed"),
            }
            result
        });

        let abort = handle.abort_handle();
        let future = async move {
            match handle.await {
                Ok(result) => result,
                Err(join_error) if join_error.is_cancelled() => Err(ApiError::Closed),
                Err(join_error) => {
                    Err(ApiError::Network(format!("credential refresh task failed: {join_error}")))
                }
            }
        }
        .boxed()
        .shared();

        state.pending = Some(PendingRefresh { attempt, future: future.clone(), abort });
        future
    }

    /// Forget `credential` after the backend refused it
    ///
    /// No-op when the cached credential has already been replaced, so a
    /// burst of 401s for the same credential causes a single refresh.
    pub fn invalidate(&self, credential: &Credential) {
        let mut state = self.state.lock();
        if state.current.as_ref().is_some_and(|current| current.same_as(credential)) {
            debug!("Invalidating rejected credential");
            state.current = None;
        }
    }

    /// Number of refreshes started so far
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Acquire)
    }

    /// Abort any pending refresh and refuse further calls
    #[instrument(skip(self))]
    pub fn close(&self) {
        let pending = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            state.current = None;
            state.pending.take()
        };
        if let Some(pending) = pending {
            debug!("Aborting pending credential refresh");
            pending.abort.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl Drop for TokenManager {
    fn drop(&mut self) {
        let pending = self.state.lock().pending.take();
        if let Some(pending) = pending {
            pending.abort.abort();
        }
    }
}

impl fmt::Debug for TokenManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TokenManager")
            .field("source", &self.source)
            .field("policy", &self.policy)
            .field("has_credential", &state.current.is_some())
            .field("refreshing", &state.pending.is_some())
            .field("closed", &state.closed)
            .finish()
    }
}
