//! Backend endpoint catalogue
//!
//! `POST` endpoints default to non-idempotent; creates keyed by a natural
//! key (guild id, discord id, guild+user) are upserts on the backend and
//! are marked idempotent.

use crate::http::{Endpoint, HttpMethod};

pub const HEALTH: Endpoint =
    Endpoint::new("health_check", HttpMethod::Get, "/health").unauthenticated().empty_response();

pub const LIST_GUILDS: Endpoint = Endpoint::new("list_guilds", HttpMethod::Get, "/guilds");
pub const GET_GUILD: Endpoint = Endpoint::new("get_guild", HttpMethod::Get, "/guilds/{}");
pub const CREATE_GUILD: Endpoint =
    Endpoint::new("create_guild", HttpMethod::Post, "/guilds").idempotent();
pub const UPDATE_GUILD: Endpoint = Endpoint::new("update_guild", HttpMethod::Put, "/guilds/{}");

pub const LIST_USERS: Endpoint = Endpoint::new("list_users", HttpMethod::Get, "/users");
pub const GET_USER: Endpoint = Endpoint::new("get_user", HttpMethod::Get, "/users/{}");
pub const CREATE_USER: Endpoint =
    Endpoint::new("create_user", HttpMethod::Post, "/users").idempotent();
pub const UPDATE_USER: Endpoint = Endpoint::new("update_user", HttpMethod::Put, "/users/{}");

pub const LIST_MEMBERS: Endpoint =
    Endpoint::new("list_members", HttpMethod::Get, "/guilds/{}/members");
pub const ADD_MEMBER: Endpoint =
    Endpoint::new("add_member", HttpMethod::Post, "/guilds/{}/members").idempotent();
pub const SYNC_MEMBERS: Endpoint =
    Endpoint::new("sync_members", HttpMethod::Post, "/guilds/{}/members/batch").idempotent();

pub const LIST_WARNINGS: Endpoint = Endpoint::new("list_warnings", HttpMethod::Get, "/warnings");
pub const CREATE_WARNING: Endpoint =
    Endpoint::new("create_warning", HttpMethod::Post, "/warnings");

pub const LIST_MODERATION_CASES: Endpoint =
    Endpoint::new("list_moderation_cases", HttpMethod::Get, "/moderation-cases");
pub const CREATE_MODERATION_CASE: Endpoint =
    Endpoint::new("create_moderation_case", HttpMethod::Post, "/moderation-cases");
pub const UPDATE_MODERATION_CASE: Endpoint =
    Endpoint::new("update_moderation_case", HttpMethod::Put, "/moderation-cases/{}");
