//! Warning and moderation case records

use serde::{Deserialize, Serialize};

use super::Attributes;

/// A warning issued to a guild member
///
/// Warnings have no natural key; `id` is assigned by the backend on creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Warning {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub guild_id: String,
    pub user_id: String,
    pub moderator_id: String,
    pub reason: String,
    #[serde(flatten)]
    pub attributes: Attributes,
}

/// A moderation case (ban, kick, mute, ...) opened against a member
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationCase {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub guild_id: String,
    pub user_id: String,
    pub moderator_id: String,
    /// Backend-defined action name
    pub action: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(flatten)]
    pub attributes: Attributes,
}

/// Query filter for listing warnings and moderation cases
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModerationFilter {
    pub guild_id: Option<String>,
    pub user_id: Option<String>,
}

impl ModerationFilter {
    #[must_use]
    pub fn guild(guild_id: impl Into<String>) -> Self {
        Self { guild_id: Some(guild_id.into()), user_id: None }
    }

    #[must_use]
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    /// Query pairs for the non-empty fields, in a stable order
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = Vec::new();
        if let Some(guild_id) = self.guild_id.as_deref() {
            pairs.push(("guild_id", guild_id));
        }
        if let Some(user_id) = self.user_id.as_deref() {
            pairs.push(("user_id", user_id));
        }
        pairs
    }
}
