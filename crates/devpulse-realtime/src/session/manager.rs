//! Session manager — authenticates connections, installs subscription
//! sets, maintains window sets, and tears down cleanly.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use devpulse_cache::keys;
use devpulse_core::config::RealtimeConfig;
use devpulse_core::traits::cache::{CacheJsonExt, CacheProvider};
use devpulse_core::{AppError, AppResult, ErrorKind};
use devpulse_entity::presence::StatusSnapshot;
use devpulse_entity::store::{ChannelStore, UserStore};
use devpulse_entity::user::User;
use serde::{Deserialize, Serialize};

use crate::connection::handle::{ConnectionHandle, ConnectionId, SessionState};
use crate::connection::pool::ConnectionPool;
use crate::identity::IdentityProvider;
use crate::message::codec::encode_server;
use crate::message::types::{CompactUser, ServerMessage};
use crate::presence::aggregate::aggregate_windows;
use crate::presence::engine::PresenceEngine;
use crate::privacy::cache::VisibilityCache;
use crate::privacy::filter::redact_compact;
use crate::subscription::registry::SubscriptionRegistry;

/// Short-lived record enabling re-attachment without presence flapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeRecord {
    /// Username the token was issued to.
    pub username: String,
    /// Identity id, `None` for guests.
    pub identity_id: Option<i64>,
    /// Issue time in ms since epoch.
    pub created_at_ms: i64,
}

/// Owns the lifecycle of every client connection.
#[derive(Debug)]
pub struct SessionManager {
    pool: Arc<ConnectionPool>,
    registry: Arc<SubscriptionRegistry>,
    cache: Arc<dyn CacheProvider>,
    users: Arc<dyn UserStore>,
    channels: Arc<dyn ChannelStore>,
    identity: Arc<dyn IdentityProvider>,
    visibility: Arc<VisibilityCache>,
    presence: Arc<PresenceEngine>,
    config: RealtimeConfig,
}

impl SessionManager {
    /// Creates a new session manager.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        pool: Arc<ConnectionPool>,
        registry: Arc<SubscriptionRegistry>,
        cache: Arc<dyn CacheProvider>,
        users: Arc<dyn UserStore>,
        channels: Arc<dyn ChannelStore>,
        identity: Arc<dyn IdentityProvider>,
        visibility: Arc<VisibilityCache>,
        presence: Arc<PresenceEngine>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            pool,
            registry,
            cache,
            users,
            channels,
            identity,
            visibility,
            presence,
            config,
        }
    }

    /// Runs the login contract for a connection.
    ///
    /// Resolution order: valid resume token, then access token, then
    /// guest registration. Emits `loginSuccess` and the initial sync on
    /// success; the caller turns an error into `loginError`.
    pub async fn login(
        &self,
        handle: &Arc<ConnectionHandle>,
        declared_username: &str,
        token: Option<&str>,
        resume_token: Option<&str>,
    ) -> AppResult<()> {
        if handle.is_bound() {
            return Err(AppError::auth_failure("Already logged in"));
        }
        if declared_username.is_empty() {
            return Err(AppError::invalid_frame("Username required"));
        }

        let mut resumed = false;
        let mut identity_id: Option<i64> = None;
        let mut user: Option<User> = None;

        // 1. Resume: unexpired record whose username matches. The
        // record is one-use and consumed only on a successful match.
        if let Some(rt) = resume_token {
            if let Some(record) = self.peek_resume_record(rt).await {
                if record.username == declared_username {
                    self.consume_resume_record(rt).await;
                    resumed = true;
                    identity_id = record.identity_id;
                    if let Some(id) = identity_id {
                        user = self.users.find_by_identity(id).await?;
                    }
                } else {
                    debug!(declared = %declared_username, "Resume token username mismatch");
                }
            }
        }

        // 2. Fresh token login via the identity adapter.
        if !resumed && identity_id.is_none() {
            if let Some(access_token) = token {
                user = Some(self.token_login(declared_username, access_token).await?);
                identity_id = user.as_ref().map(|u| u.identity_id);
            }
        }

        let is_guest = identity_id.is_none();

        // 3. Guest registration. The online check runs before the
        // storage write; a name is reusable once its holder is gone.
        if !resumed && is_guest {
            if self.username_held_by_other(declared_username, None) {
                return Err(AppError::auth_failure(format!(
                    "Username '{declared_username}' is in use"
                )));
            }
            self.users.register_guest(declared_username).await?;
        }

        // The store's username is authoritative for token logins.
        let username = user
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_else(|| declared_username.to_string());

        // A username may be held online by one principal only: live
        // windows of another identity, or of a guest, block the bind.
        // Resume is exempt; the consumed record proves ownership.
        if !resumed && self.username_held_by_other(&username, identity_id) {
            return Err(AppError::auth_failure(format!(
                "Username '{username}' is in use"
            )));
        }

        // Mint the resume token; reissued at every login.
        let new_token = Uuid::new_v4().to_string();
        self.cache
            .set_json(
                &keys::resume_session(&new_token),
                &ResumeRecord {
                    username: username.clone(),
                    identity_id,
                    created_at_ms: Utc::now().timestamp_millis(),
                },
                Duration::from_secs(self.config.resume_ttl_seconds),
            )
            .await?;

        // A resumed window re-installs its last published fields so the
        // reconnect is not observable as a state reset.
        let snapshot = if resumed {
            self.cached_snapshot(&username).await.unwrap_or_default()
        } else {
            StatusSnapshot::default()
        };

        let channels = match identity_id {
            Some(id) => self.channels.channels_for(id).await?,
            None => Vec::new(),
        };

        self.presence.cancel_pending_offline(&username);

        handle.bind(SessionState {
            username: username.clone(),
            identity_id,
            avatar_url: user.as_ref().and_then(|u| u.avatar_url.clone()),
            is_guest,
            resume_token: new_token.clone(),
            snapshot,
            custom_status: None,
            custom_expires_at_ms: None,
            channel_ids: channels.iter().map(|c| c.id).collect(),
        });
        self.pool.add_window(&username, handle.clone());

        // Subscription set: one presence topic per friend, one channel
        // topic per membership.
        let friend_names = match &user {
            Some(u) => self.users.usernames_for(&u.friend_set()).await?,
            None => Vec::new(),
        };
        for name in &friend_names {
            if let Err(e) = self
                .registry
                .subscribe(&keys::presence_topic(name), handle.id)
                .await
            {
                warn!(friend = %name, error = %e, "Friend subscription failed");
            }
        }
        for channel in &channels {
            if let Err(e) = self
                .registry
                .subscribe(&keys::channel_topic(channel.id), handle.id)
                .await
            {
                warn!(channel_id = %channel.id, error = %e, "Channel subscription failed");
            }
        }

        handle
            .send(encode_server(&ServerMessage::LoginSuccess {
                token: new_token,
                github_id: identity_id,
                followers: user.as_ref().map(|u| u.followers.clone()),
                following: user.as_ref().map(|u| u.following.clone()),
            })?)
            .await?;

        let sync = self.initial_sync(identity_id, &friend_names).await;
        handle
            .send(encode_server(&ServerMessage::Sync { users: sync })?)
            .await?;

        // Resume is invisible to subscribers; only fresh logins go online.
        if !resumed {
            let vis = self.visibility.get(&username).await?;
            if !vis.is_invisible() {
                self.presence.publish_online(&username).await?;
            }
        }

        info!(
            conn_id = %handle.id,
            username = %username,
            resumed,
            guest = is_guest,
            "Login complete"
        );
        Ok(())
    }

    /// Tears a connection down: window set, offline event, last-seen,
    /// subscriptions.
    pub async fn disconnect(&self, conn_id: &ConnectionId) {
        let Some(handle) = self.pool.remove(conn_id) else {
            return;
        };
        handle.mark_closed();

        if let Some((username, is_guest)) =
            handle.with_state(|st| (st.username.clone(), st.is_guest))
        {
            let became_empty = self.pool.remove_window(&username, conn_id);
            if became_empty {
                let now_ms = Utc::now().timestamp_millis();
                // The offline event waits out the resume grace window;
                // a reconnect in time cancels it.
                self.presence.clone().schedule_offline(&username).await;
                if !is_guest {
                    if let Err(e) = self.users.update_last_seen(&username, now_ms).await {
                        warn!(username = %username, error = %e, "Last-seen persist failed");
                    }
                }
            }
        }

        if let Err(e) = self.registry.unsubscribe_all(*conn_id).await {
            warn!(conn_id = %conn_id, error = %e, "Unsubscribe-all failed");
        }

        debug!(conn_id = %conn_id, "Connection torn down");
    }

    /// Keeps the resume record alive while the connection lives, so the
    /// 60-second window runs from disconnect. Re-mints and pushes a
    /// `token` frame if the record vanished.
    pub async fn refresh_resume(&self, handle: &Arc<ConnectionHandle>) {
        let Some((username, identity_id, token)) =
            handle.with_state(|st| (st.username.clone(), st.identity_id, st.resume_token.clone()))
        else {
            return;
        };

        let ttl = Duration::from_secs(self.config.resume_ttl_seconds);
        match self.cache.expire(&keys::resume_session(&token), ttl).await {
            Ok(true) => {}
            Ok(false) => {
                let new_token = Uuid::new_v4().to_string();
                let record = ResumeRecord {
                    username,
                    identity_id,
                    created_at_ms: Utc::now().timestamp_millis(),
                };
                if let Err(e) = self
                    .cache
                    .set_json(&keys::resume_session(&new_token), &record, ttl)
                    .await
                {
                    warn!(conn_id = %handle.id, error = %e, "Resume re-mint failed");
                    return;
                }
                handle.with_state(|st| st.resume_token = new_token.clone());
                if let Ok(frame) = encode_server(&ServerMessage::Token { token: new_token }) {
                    let _ = handle.send(frame).await;
                }
            }
            Err(e) => {
                warn!(conn_id = %handle.id, error = %e, "Resume refresh failed");
            }
        }
    }

    /// True when a live window under `username` belongs to a different
    /// principal. A second window of the same authenticated identity is
    /// not a conflict; guest sessions never share a name.
    fn username_held_by_other(&self, username: &str, identity_id: Option<i64>) -> bool {
        self.pool.windows_of(username).iter().any(|window| {
            match window.with_state(|st| st.identity_id) {
                Some(owner) => identity_id.is_none() || owner != identity_id,
                None => true,
            }
        })
    }

    /// Reads a resume record without consuming it.
    async fn peek_resume_record(&self, token: &str) -> Option<ResumeRecord> {
        match self
            .cache
            .get_json::<ResumeRecord>(&keys::resume_session(token))
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Resume record lookup failed");
                None
            }
        }
    }

    /// Deletes a resume record after a successful resume.
    async fn consume_resume_record(&self, token: &str) {
        if let Err(e) = self.cache.delete(&keys::resume_session(token)).await {
            warn!(error = %e, "Resume record delete failed");
        }
    }

    /// Token login: adapter first, cached graph as fallback.
    async fn token_login(&self, declared_username: &str, access_token: &str) -> AppResult<User> {
        match self.identity.fetch_profile(access_token).await {
            Ok(profile) => self.users.upsert_user(&profile).await,
            Err(e) if e.kind == ErrorKind::AuthFailure => Err(e),
            Err(e) => {
                warn!(error = %e, "Identity adapter unavailable, trying cached graph");
                self.users
                    .find_by_username(declared_username)
                    .await?
                    .ok_or_else(|| {
                        AppError::auth_failure("Identity provider unreachable")
                    })
            }
        }
    }

    /// Last published snapshot from the status cache, if any.
    async fn cached_snapshot(&self, username: &str) -> Option<StatusSnapshot> {
        match self
            .cache
            .get_json::<StatusSnapshot>(&keys::status_cache(username))
            .await
        {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!(username = %username, error = %e, "Status cache read failed");
                None
            }
        }
    }

    /// Builds the initial sync: every friend with a local window set,
    /// aggregated and filtered from the viewer's vantage.
    ///
    /// Window sets are process-local, so this reflects this replica's
    /// knowledge only; cross-replica state arrives via topic messages.
    async fn initial_sync(
        &self,
        viewer: Option<i64>,
        friend_names: &[String],
    ) -> Vec<CompactUser> {
        let mut users = Vec::new();
        for name in friend_names {
            let windows = self.pool.windows_of(name);
            let Some(view) = aggregate_windows(&windows) else {
                continue;
            };
            let vis = match self.visibility.get(name).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(friend = %name, error = %e, "Visibility lookup failed");
                    continue;
                }
            };
            if !vis.admits(viewer) {
                continue;
            }
            let mut compact = CompactUser {
                id: name.clone(),
                a: view.avatar_url,
                s: view.snapshot.status,
                act: view.snapshot.activity,
                p: view.snapshot.project,
                l: view.snapshot.language,
                ls: None,
            };
            redact_compact(&mut compact, &vis);
            users.push(compact);
        }
        users
    }
}
