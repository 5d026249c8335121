//! State-store traits implemented by the database crate.
//!
//! The realtime engine talks to these traits only, so it can run
//! against Postgres in production and an in-memory store in tests.

use async_trait::async_trait;
use uuid::Uuid;

use devpulse_core::AppResult;

use crate::channel::{Channel, ChannelMember, ChannelRole};
use crate::preferences::{Preferences, PreferencesUpdate};
use crate::user::{IdentityProfile, User};

/// Store of users, preferences, and guest registrations.
#[async_trait]
pub trait UserStore: Send + Sync + std::fmt::Debug + 'static {
    /// Insert or refresh a user from an identity-provider profile.
    ///
    /// Refreshes username, avatar, and the follower/following graph.
    /// Usernames live in one namespace: the claim releases any guest
    /// registration of the same name.
    async fn upsert_user(&self, profile: &IdentityProfile) -> AppResult<User>;

    /// Find a user by external identity id.
    async fn find_by_identity(&self, identity_id: i64) -> AppResult<Option<User>>;

    /// Find a user by username (case-sensitive).
    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>>;

    /// Resolve usernames for a set of identity ids. Unknown ids are skipped.
    async fn usernames_for(&self, identity_ids: &[i64]) -> AppResult<Vec<String>>;

    /// Persist the last-seen timestamp for a username.
    async fn update_last_seen(&self, username: &str, last_seen_ms: i64) -> AppResult<()>;

    /// Load preferences for an identity, falling back to defaults.
    async fn preferences(&self, identity_id: i64) -> AppResult<Preferences>;

    /// Apply a partial preference update, returning the merged record.
    async fn update_preferences(
        &self,
        identity_id: i64,
        update: &PreferencesUpdate,
    ) -> AppResult<Preferences>;

    /// Register a guest username. Succeeds if the name is new or already
    /// registered as a guest; fails if it collides with an authenticated
    /// user's name.
    async fn register_guest(&self, username: &str) -> AppResult<()>;
}

/// Store of channels and memberships.
#[async_trait]
pub trait ChannelStore: Send + Sync + std::fmt::Debug + 'static {
    /// Persist a new channel with its owner as admin member.
    ///
    /// Fails with a conflict if the invite code is already taken.
    async fn create_channel(
        &self,
        name: &str,
        owner_identity_id: i64,
        owner_username: &str,
        invite_code: &str,
    ) -> AppResult<Channel>;

    /// Look up a channel by invite code.
    async fn find_by_invite(&self, invite_code: &str) -> AppResult<Option<Channel>>;

    /// Look up a channel by id.
    async fn find_by_id(&self, channel_id: Uuid) -> AppResult<Option<Channel>>;

    /// List all members of a channel.
    async fn members(&self, channel_id: Uuid) -> AppResult<Vec<ChannelMember>>;

    /// Count distinct members of a channel.
    async fn member_count(&self, channel_id: Uuid) -> AppResult<u64>;

    /// Check whether an identity is a member of a channel.
    async fn is_member(&self, channel_id: Uuid, identity_id: i64) -> AppResult<bool>;

    /// Insert a membership row.
    async fn add_member(
        &self,
        channel_id: Uuid,
        identity_id: i64,
        username: &str,
        role: ChannelRole,
    ) -> AppResult<()>;

    /// Delete a membership row. Returns `true` if it existed.
    async fn remove_member(&self, channel_id: Uuid, identity_id: i64) -> AppResult<bool>;

    /// List the channels an identity belongs to.
    async fn channels_for(&self, identity_id: i64) -> AppResult<Vec<Channel>>;
}
