//! Domain types and models
//!
//! Backend resource records are treated as payloads: only the identifying
//! fields the client needs (natural keys, ids) are typed, everything else
//! travels through the flattened `attributes` map untouched.

pub mod guild;
pub mod member;
pub mod moderation;
pub mod sync;
pub mod user;

pub use guild::Guild;
pub use member::GuildMember;
pub use moderation::{ModerationCase, ModerationFilter, Warning};
pub use sync::{BatchState, SyncBatch, SyncProgress};
pub use user::DiscordUser;

/// Free-form record fields owned by the backend schema
pub type Attributes = serde_json::Map<String, serde_json::Value>;
