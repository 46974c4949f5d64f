//! Bearer credential management
//!
//! - [`Credential`]: time-bounded token, never exposed to facade callers
//! - [`CredentialSource`]: one acquisition (HTTP token exchange or a static
//!   local-mode sentinel)
//! - [`TokenManager`]: caching, refresh margin and single-flight refresh

pub mod credential;
pub mod source;
pub mod token_manager;

pub use credential::{Credential, RefreshPolicy};
pub use source::{
    CredentialSource, HttpCredentialSource, StaticCredentialSource, DEFAULT_TOKEN_LIFETIME,
};
pub use token_manager::TokenManager;
