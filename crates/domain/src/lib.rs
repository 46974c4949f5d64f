//! # GuildSync Domain
//!
//! Domain types and models shared by the GuildSync crates.
//!
//! This crate contains:
//! - Backend resource records (guilds, users, members, warnings, moderation
//!   cases)
//! - Batch synchronization data model (`SyncBatch`, `BatchState`,
//!   `SyncProgress`)
//! - Client configuration structure and validation
//! - Domain error types and Result definitions
//!
//! ## Architecture
//! - No dependencies on other GuildSync crates
//! - Only external dependencies allowed
//! - Pure domain models and data structures, no I/O

pub mod config;
pub mod constants;
pub mod errors;
pub mod macros;
pub mod types;
pub mod utils;

// Re-export commonly used items
pub use config::*;
pub use errors::*;
pub use types::*;
