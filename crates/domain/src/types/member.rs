//! Guild member record

use serde::{Deserialize, Serialize};

use super::Attributes;

/// Membership of a user in a guild
///
/// `(guild_id, user_id)` is the natural key the backend upserts on, which is
/// what makes member creation and batch sync safe to retry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuildMember {
    pub guild_id: String,
    pub user_id: String,
    pub username: String,
    /// Guild-specific nickname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nickname: Option<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl GuildMember {
    #[must_use]
    pub fn new(
        guild_id: impl Into<String>,
        user_id: impl Into<String>,
        username: impl Into<String>,
    ) -> Self {
        Self {
            guild_id: guild_id.into(),
            user_id: user_id.into(),
            username: username.into(),
            nickname: None,
            roles: Vec::new(),
            attributes: Attributes::new(),
        }
    }
}
