//! Discord user record

use serde::{Deserialize, Serialize};

use super::Attributes;

/// A Discord user as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscordUser {
    /// Discord snowflake of the user (natural key)
    pub discord_id: String,
    pub username: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl DiscordUser {
    #[must_use]
    pub fn new(discord_id: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            discord_id: discord_id.into(),
            username: username.into(),
            attributes: Attributes::new(),
        }
    }
}
