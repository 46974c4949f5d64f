//! Guild record

use serde::{Deserialize, Serialize};

use super::Attributes;

/// A Discord guild as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guild {
    /// Discord snowflake of the guild (natural key)
    pub guild_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

impl Guild {
    #[must_use]
    pub fn new(guild_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self { guild_id: guild_id.into(), name: Some(name.into()), attributes: Attributes::new() }
    }
}
