//! Channel engine — creation, invite-based join, membership checks,
//! and per-channel fan-out.

use std::sync::Arc;

use chrono::Utc;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use devpulse_cache::keys;
use devpulse_core::config::RealtimeConfig;
use devpulse_core::traits::cache::{CacheJsonExt, CacheProvider};
use devpulse_core::traits::pubsub::PubSubProvider;
use devpulse_core::{AppError, AppResult, ErrorKind};
use devpulse_entity::channel::model::{INVITE_ALPHABET, INVITE_CODE_LEN, validate_name};
use devpulse_entity::channel::{ChannelMember, ChannelRole};
use devpulse_entity::presence::{Activity, PresenceStatus, StatusSnapshot};
use devpulse_entity::store::{ChannelStore, UserStore};

use crate::connection::handle::ConnectionHandle;
use crate::connection::pool::ConnectionPool;
use crate::message::codec::encode_server;
use crate::message::types::{CompactUser, ServerMessage};
use crate::presence::aggregate::aggregate_windows;
use crate::privacy::cache::VisibilityCache;
use crate::privacy::filter::redact_compact;
use crate::subscription::registry::SubscriptionRegistry;

/// Attempts before giving up on invite-code generation.
const INVITE_RETRIES: usize = 5;

/// Creation, join, leave, and chat for group channels.
#[derive(Debug)]
pub struct ChannelEngine {
    pool: Arc<ConnectionPool>,
    registry: Arc<SubscriptionRegistry>,
    store: Arc<dyn ChannelStore>,
    users: Arc<dyn UserStore>,
    cache: Arc<dyn CacheProvider>,
    visibility: Arc<VisibilityCache>,
    broker: Arc<dyn PubSubProvider>,
    config: RealtimeConfig,
}

impl ChannelEngine {
    /// Creates a new channel engine.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<ConnectionPool>,
        registry: Arc<SubscriptionRegistry>,
        store: Arc<dyn ChannelStore>,
        users: Arc<dyn UserStore>,
        cache: Arc<dyn CacheProvider>,
        visibility: Arc<VisibilityCache>,
        broker: Arc<dyn PubSubProvider>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            store,
            users,
            cache,
            visibility,
            broker,
            config,
        }
    }

    /// Creates a channel owned by the caller.
    pub async fn create(&self, handle: &Arc<ConnectionHandle>, name: &str) -> AppResult<()> {
        let (username, identity_id) = self.authenticated(handle)?;
        validate_name(name)?;

        let mut channel = None;
        for _ in 0..INVITE_RETRIES {
            let code = generate_invite_code();
            match self
                .store
                .create_channel(name, identity_id, &username, &code)
                .await
            {
                Ok(c) => {
                    channel = Some(c);
                    break;
                }
                Err(e) if e.kind == ErrorKind::Conflict => continue,
                Err(e) => return Err(e),
            }
        }
        let channel =
            channel.ok_or_else(|| AppError::internal("Invite code generation exhausted"))?;

        self.registry
            .subscribe(&keys::channel_topic(channel.id), handle.id)
            .await?;
        handle.with_state(|st| st.channel_ids.push(channel.id));

        handle
            .send(encode_server(&ServerMessage::ChannelCreated {
                channel_id: channel.id,
                name: channel.name.clone(),
                invite_code: channel.invite_code.clone(),
            })?)
            .await?;

        let creator = self.live_compact(handle, &username).await;
        handle
            .send(encode_server(&ServerMessage::ChannelSync {
                channel_id: channel.id,
                name: channel.name.clone(),
                members: vec![creator],
            })?)
            .await?;

        info!(
            channel_id = %channel.id,
            owner = %username,
            "Channel created"
        );
        Ok(())
    }

    /// Joins a channel by invite code.
    pub async fn join(&self, handle: &Arc<ConnectionHandle>, invite_code: &str) -> AppResult<()> {
        let (username, identity_id) = self.authenticated(handle)?;

        let channel = self
            .store
            .find_by_invite(invite_code)
            .await?
            .ok_or_else(|| AppError::not_found("Unknown invite code"))?;

        if self.store.is_member(channel.id, identity_id).await? {
            return Err(AppError::already_member("Already a member of this channel"));
        }
        if self.store.member_count(channel.id).await? >= self.config.channel_member_limit {
            return Err(AppError::full_channel("Channel is full"));
        }

        self.store
            .add_member(channel.id, identity_id, &username, ChannelRole::Member)
            .await?;
        self.registry
            .subscribe(&keys::channel_topic(channel.id), handle.id)
            .await?;
        handle.with_state(|st| st.channel_ids.push(channel.id));

        handle
            .send(encode_server(&ServerMessage::ChannelJoined {
                channel_id: channel.id,
                name: channel.name.clone(),
            })?)
            .await?;

        // Full roster, each member annotated with the best status source
        // available: live windows, status cache, or offline placeholder.
        let members = self.store.members(channel.id).await?;
        let mut roster = Vec::with_capacity(members.len());
        for member in &members {
            roster.push(self.member_compact(member).await);
        }
        handle
            .send(encode_server(&ServerMessage::ChannelSync {
                channel_id: channel.id,
                name: channel.name.clone(),
                members: roster,
            })?)
            .await?;

        let joined = ServerMessage::MemberJoined {
            channel_id: channel.id,
            member: self.live_compact(handle, &username).await,
        };
        self.publish(channel.id, &joined).await?;

        info!(channel_id = %channel.id, member = %username, "Member joined");
        Ok(())
    }

    /// Leaves a channel.
    pub async fn leave(&self, handle: &Arc<ConnectionHandle>, channel_id: Uuid) -> AppResult<()> {
        let (username, identity_id) = self.authenticated(handle)?;

        let removed = self.store.remove_member(channel_id, identity_id).await?;
        if !removed {
            return Err(AppError::not_found("Not a member of this channel"));
        }

        if let Err(e) = self
            .registry
            .unsubscribe(&keys::channel_topic(channel_id), handle.id)
            .await
        {
            warn!(channel_id = %channel_id, error = %e, "Channel unsubscribe failed");
        }
        handle.with_state(|st| st.channel_ids.retain(|id| *id != channel_id));

        self.publish(
            channel_id,
            &ServerMessage::MemberLeft {
                channel_id,
                id: username.clone(),
            },
        )
        .await?;

        info!(channel_id = %channel_id, member = %username, "Member left");
        Ok(())
    }

    /// Sends a chat message to a channel.
    pub async fn chat(
        &self,
        handle: &Arc<ConnectionHandle>,
        channel_id: Uuid,
        content: &str,
    ) -> AppResult<()> {
        let (username, identity_id) = self.authenticated(handle)?;

        if !self.store.is_member(channel_id, identity_id).await? {
            return Err(AppError::forbidden("Not a member of this channel"));
        }

        self.publish(
            channel_id,
            &ServerMessage::ChannelChat {
                channel_id,
                id: username,
                content: content.to_string(),
                ts: Utc::now().timestamp_millis(),
            },
        )
        .await
    }

    /// Requires a logged-in, authenticated (non-guest) caller.
    fn authenticated(&self, handle: &ConnectionHandle) -> AppResult<(String, i64)> {
        let (username, identity_id) = handle
            .identity()
            .ok_or_else(|| AppError::forbidden("Login required"))?;
        let identity_id = identity_id.ok_or_else(|| {
            AppError::forbidden("Channels require an authenticated identity")
        })?;
        Ok((username, identity_id))
    }

    /// Compact record for a member of unknown liveness: local windows,
    /// then status cache, then an offline placeholder from the store.
    async fn member_compact(&self, member: &ChannelMember) -> CompactUser {
        let username = &member.username;
        let vis = self.visibility.get(username).await.ok();
        let invisible = vis.as_ref().is_some_and(|v| v.is_invisible());

        let user = match self.users.find_by_username(username).await {
            Ok(u) => u,
            Err(e) => {
                warn!(username = %username, error = %e, "Member lookup failed");
                None
            }
        };
        let avatar = user.as_ref().and_then(|u| u.avatar_url.clone());

        let mut compact = if invisible {
            offline_placeholder(username, avatar, user.as_ref().map(|u| u.last_seen_ms))
        } else if let Some(view) = aggregate_windows(&self.pool.windows_of(username)) {
            CompactUser {
                id: username.clone(),
                a: view.avatar_url.or(avatar),
                s: view.snapshot.status,
                act: view.snapshot.activity,
                p: view.snapshot.project,
                l: view.snapshot.language,
                ls: None,
            }
        } else if let Some(snapshot) = self.cached_snapshot(username).await {
            CompactUser {
                id: username.clone(),
                a: avatar,
                s: snapshot.status,
                act: snapshot.activity,
                p: snapshot.project,
                l: snapshot.language,
                ls: None,
            }
        } else {
            offline_placeholder(username, avatar, user.as_ref().map(|u| u.last_seen_ms))
        };

        if let Some(vis) = &vis {
            redact_compact(&mut compact, vis);
        }
        compact
    }

    /// Compact record for the caller's own (live) windows.
    async fn live_compact(&self, handle: &ConnectionHandle, username: &str) -> CompactUser {
        let mut compact = match aggregate_windows(&self.pool.windows_of(username)) {
            Some(view) => CompactUser {
                id: username.to_string(),
                a: view.avatar_url,
                s: view.snapshot.status,
                act: view.snapshot.activity,
                p: view.snapshot.project,
                l: view.snapshot.language,
                ls: None,
            },
            None => {
                let avatar = handle.with_state(|st| st.avatar_url.clone()).flatten();
                offline_placeholder(username, avatar, None)
            }
        };
        if let Ok(vis) = self.visibility.get(username).await {
            redact_compact(&mut compact, &vis);
        }
        compact
    }

    async fn cached_snapshot(&self, username: &str) -> Option<StatusSnapshot> {
        self.cache
            .get_json::<StatusSnapshot>(&keys::status_cache(username))
            .await
            .unwrap_or_else(|e| {
                warn!(username = %username, error = %e, "Status cache read failed");
                None
            })
    }

    async fn publish(&self, channel_id: Uuid, msg: &ServerMessage) -> AppResult<()> {
        let payload = encode_server(msg)?;
        self.broker
            .publish(&keys::channel_topic(channel_id), &payload)
            .await
    }
}

/// Offline/Idle placeholder used when no status source is available.
fn offline_placeholder(username: &str, avatar: Option<String>, last_seen: Option<i64>) -> CompactUser {
    CompactUser {
        id: username.to_string(),
        a: avatar,
        s: PresenceStatus::Offline,
        act: Activity::Idle,
        p: None,
        l: None,
        ls: last_seen,
    }
}

/// Draws a 6-character invite code from the confusable-free alphabet.
fn generate_invite_code() -> String {
    let mut rng = rand::thread_rng();
    (0..INVITE_CODE_LEN)
        .map(|_| INVITE_ALPHABET[rng.gen_range(0..INVITE_ALPHABET.len())] as char)
        .collect()
}

#[cfg(test)]
mod tests {
    use devpulse_entity::channel::model::is_invite_code;

    use super::*;

    #[test]
    fn test_generated_codes_have_the_right_shape() {
        for _ in 0..1000 {
            let code = generate_invite_code();
            assert!(is_invite_code(&code), "bad code: {code}");
        }
    }
}
