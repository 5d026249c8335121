//! User entity models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A user known to the state store via the external identity provider.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    /// External identity id (GitHub numeric id).
    pub identity_id: i64,
    /// Unique login name (case-sensitive).
    pub username: String,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Identity ids of users following this user.
    pub followers: Vec<i64>,
    /// Identity ids this user follows.
    pub following: Vec<i64>,
    /// Identity ids marked as close friends (subset of followers∪following).
    pub close_friends: Vec<i64>,
    /// Last time any of this user's windows was seen, in ms since epoch.
    pub last_seen_ms: i64,
    /// When the user was first seen.
    pub created_at: DateTime<Utc>,
}

impl User {
    /// The deduplicated union of followers and following.
    pub fn friend_set(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self
            .followers
            .iter()
            .chain(self.following.iter())
            .copied()
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

/// A guest registration: a self-chosen username with no external identity.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct GuestUser {
    /// Auto-assigned id.
    pub id: i64,
    /// Unique username, sharing the namespace with authenticated users.
    pub username: String,
    /// When the guest first registered.
    pub created_at: DateTime<Utc>,
}

/// Profile and graph snapshot returned by the identity adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityProfile {
    /// External identity id.
    pub identity_id: i64,
    /// Login name at the identity provider.
    pub username: String,
    /// Avatar URL.
    pub avatar_url: Option<String>,
    /// Identity ids of followers.
    pub followers: Vec<i64>,
    /// Identity ids being followed.
    pub following: Vec<i64>,
}
