//! Presence engine — applies status updates, computes deltas, and
//! governs fan-out onto the topic substrate.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use devpulse_cache::keys;
use devpulse_core::config::RealtimeConfig;
use devpulse_core::traits::cache::{CacheJsonExt, CacheProvider};
use devpulse_core::traits::pubsub::PubSubProvider;
use devpulse_core::{AppError, AppResult};
use devpulse_entity::preferences::{PreferencesUpdate, VisibilityMode};
use devpulse_entity::presence::{Activity, CustomStatus, PresenceStatus, StatusSnapshot};
use devpulse_entity::store::UserStore;

use crate::connection::handle::ConnectionHandle;
use crate::connection::pool::ConnectionPool;
use crate::message::codec::encode_server;
use crate::message::types::ServerMessage;
use crate::privacy::cache::VisibilityCache;

use super::aggregate::aggregate_windows;
use super::expiry::{ExpiryEntry, ExpiryQueue};

/// Result of diffing an update against a connection's current state.
#[derive(Debug, Default)]
struct DeltaOutcome {
    s: Option<PresenceStatus>,
    a: Option<Activity>,
    p: Option<String>,
    l: Option<String>,
    cs: Option<Option<CustomStatus>>,
    snapshot: StatusSnapshot,
    username: String,
    channel_ids: Vec<Uuid>,
}

impl DeltaOutcome {
    fn is_empty(&self) -> bool {
        self.s.is_none()
            && self.a.is_none()
            && self.p.is_none()
            && self.l.is_none()
            && self.cs.is_none()
    }

    /// Whether any of the four cached fields changed.
    fn touches_snapshot(&self) -> bool {
        self.s.is_some() || self.a.is_some() || self.p.is_some() || self.l.is_some()
    }
}

/// Applies status updates and publishes the resulting events.
#[derive(Debug)]
pub struct PresenceEngine {
    pool: Arc<ConnectionPool>,
    cache: Arc<dyn CacheProvider>,
    broker: Arc<dyn PubSubProvider>,
    users: Arc<dyn UserStore>,
    visibility: Arc<VisibilityCache>,
    expiry: ExpiryQueue,
    /// Usernames whose last window closed, awaiting the grace deadline.
    pending_offline: DashMap<String, u64>,
    offline_epoch: AtomicU64,
    config: RealtimeConfig,
}

impl PresenceEngine {
    /// Creates a new presence engine.
    pub fn new(
        pool: Arc<ConnectionPool>,
        cache: Arc<dyn CacheProvider>,
        broker: Arc<dyn PubSubProvider>,
        users: Arc<dyn UserStore>,
        visibility: Arc<VisibilityCache>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            pool,
            cache,
            broker,
            users,
            visibility,
            expiry: ExpiryQueue::new(),
            pending_offline: DashMap::new(),
            offline_epoch: AtomicU64::new(0),
            config,
        }
    }

    /// Cancels a pending offline event; called when the username comes
    /// back online (resume or fresh login) within the grace window.
    pub fn cancel_pending_offline(&self, username: &str) {
        self.pending_offline.remove(username);
    }

    /// Schedules the offline event for a username whose last window
    /// closed. A resume within the grace window cancels it, so brief
    /// disconnects cause no observable flapping.
    pub async fn schedule_offline(self: Arc<Self>, username: &str) {
        // Invisible users already appear offline to every subscriber.
        match self.visibility.get(username).await {
            Ok(vis) if vis.is_invisible() => return,
            Ok(_) => {}
            Err(e) => {
                warn!(username = %username, error = %e, "Visibility lookup failed");
            }
        }

        let epoch = self.offline_epoch.fetch_add(1, Ordering::Relaxed) + 1;
        self.pending_offline.insert(username.to_string(), epoch);

        let engine = self;
        let username = username.to_string();
        let grace = Duration::from_secs(engine.config.offline_grace_seconds);
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let still_pending = engine
                .pending_offline
                .remove_if(&username, |_, e| *e == epoch)
                .is_some();
            if !still_pending || engine.pool.is_online(&username) {
                return;
            }
            if let Err(e) = engine
                .publish_offline(&username, Utc::now().timestamp_millis())
                .await
            {
                warn!(username = %username, error = %e, "Offline publish failed");
            }
        });
    }

    /// Applies a partial status update from one window.
    ///
    /// Fields equal to the current state are dropped; if nothing
    /// changed, nothing is published.
    pub async fn apply_update(
        &self,
        handle: &ConnectionHandle,
        s: Option<PresenceStatus>,
        a: Option<Activity>,
        p: Option<String>,
        l: Option<String>,
    ) -> AppResult<()> {
        let outcome = handle
            .with_state(|st| {
                let mut out = DeltaOutcome::default();

                // An activity report recovers an Away window unless the
                // update sets a status itself.
                let s = if st.snapshot.status == PresenceStatus::Away && s.is_none() {
                    Some(PresenceStatus::Online)
                } else {
                    s
                };

                if let Some(new) = s {
                    if new != st.snapshot.status {
                        st.snapshot.status = new;
                        out.s = Some(new);
                    }
                }
                if let Some(new) = a {
                    if new != st.snapshot.activity {
                        st.snapshot.activity = new;
                        out.a = Some(new);
                    }
                }
                if let Some(new) = p {
                    if Some(new.as_str()) != st.snapshot.project.as_deref() {
                        st.snapshot.project = Some(new.clone());
                        out.p = Some(new);
                    }
                }
                if let Some(new) = l {
                    if Some(new.as_str()) != st.snapshot.language.as_deref() {
                        st.snapshot.language = Some(new.clone());
                        out.l = Some(new);
                    }
                }

                out.snapshot = st.snapshot.clone();
                out.username = st.username.clone();
                out.channel_ids = st.channel_ids.clone();
                out
            })
            .ok_or_else(|| AppError::forbidden("Login required"))?;

        if outcome.is_empty() {
            return Ok(());
        }

        self.publish_delta(outcome).await
    }

    /// Sets the custom status, optionally with an expiry.
    pub async fn set_custom_status(
        &self,
        handle: &ConnectionHandle,
        text: &str,
        emoji: Option<String>,
        expires_in: Option<u64>,
    ) -> AppResult<()> {
        let now_ms = Utc::now().timestamp_millis();
        let custom = CustomStatus::new(text, emoji, self.config.custom_status_max_chars);
        let deadline = expires_in.map(|secs| now_ms + (secs as i64) * 1000);

        let outcome = handle
            .with_state(|st| {
                st.custom_status = Some(custom.clone());
                st.custom_expires_at_ms = deadline;
                DeltaOutcome {
                    cs: Some(Some(custom.clone())),
                    snapshot: st.snapshot.clone(),
                    username: st.username.clone(),
                    channel_ids: st.channel_ids.clone(),
                    ..DeltaOutcome::default()
                }
            })
            .ok_or_else(|| AppError::forbidden("Login required"))?;

        if let Some(deadline_ms) = deadline {
            self.expiry.push(ExpiryEntry {
                deadline_ms,
                conn_id: handle.id,
            });
        }

        self.publish_delta(outcome).await
    }

    /// Clears the custom status, publishing the null sentinel.
    ///
    /// Clearing an unset status is a no-op.
    pub async fn clear_custom_status(&self, handle: &ConnectionHandle) -> AppResult<()> {
        let outcome = handle
            .with_state(|st| {
                if st.custom_status.is_none() {
                    return None;
                }
                st.custom_status = None;
                st.custom_expires_at_ms = None;
                Some(DeltaOutcome {
                    cs: Some(None),
                    snapshot: st.snapshot.clone(),
                    username: st.username.clone(),
                    channel_ids: st.channel_ids.clone(),
                    ..DeltaOutcome::default()
                })
            })
            .ok_or_else(|| AppError::forbidden("Login required"))?;

        match outcome {
            Some(outcome) => self.publish_delta(outcome).await,
            None => Ok(()),
        }
    }

    /// Applies a partial preferences update, publishing the invisible
    /// transition events where required.
    pub async fn apply_prefs_update(
        &self,
        handle: &ConnectionHandle,
        update: &PreferencesUpdate,
    ) -> AppResult<()> {
        let (username, identity_id) = handle
            .identity()
            .ok_or_else(|| AppError::forbidden("Login required"))?;
        let identity_id = identity_id
            .ok_or_else(|| AppError::forbidden("Guests cannot update preferences"))?;

        let old = self.users.preferences(identity_id).await?;
        let new = self.users.update_preferences(identity_id, update).await?;
        self.visibility.invalidate(&username).await;

        if old.visibility != VisibilityMode::Invisible
            && new.visibility == VisibilityMode::Invisible
        {
            self.publish_offline(&username, Utc::now().timestamp_millis())
                .await?;
        } else if old.visibility == VisibilityMode::Invisible
            && new.visibility != VisibilityMode::Invisible
        {
            self.publish_online(&username).await?;
        }

        debug!(username = %username, visibility = %new.visibility, "Preferences updated");
        Ok(())
    }

    /// Publishes the online event with the user's aggregated snapshot.
    pub async fn publish_online(&self, username: &str) -> AppResult<()> {
        let windows = self.pool.windows_of(username);
        let Some(view) = aggregate_windows(&windows) else {
            return Ok(());
        };
        let msg = ServerMessage::Online {
            id: username.to_string(),
            a: view.avatar_url,
            s: view.snapshot.status,
            act: view.snapshot.activity,
            p: view.snapshot.project,
            l: view.snapshot.language,
        };
        self.publish_presence(username, &msg).await
    }

    /// Publishes the offline event.
    pub async fn publish_offline(&self, username: &str, ts_ms: i64) -> AppResult<()> {
        let msg = ServerMessage::Offline {
            id: username.to_string(),
            ts: ts_ms,
        };
        self.publish_presence(username, &msg).await
    }

    /// Transitions windows without recent activity to Away.
    pub async fn sweep_away(&self) {
        let threshold_ms = (self.config.away_after_seconds * 1000) as i64;
        for handle in self.pool.all() {
            if !handle.is_alive() || handle.activity_idle_ms() <= threshold_ms {
                continue;
            }
            let online = handle
                .with_state(|st| st.snapshot.status == PresenceStatus::Online)
                .unwrap_or(false);
            if !online {
                continue;
            }
            if let Err(e) = self
                .apply_update(
                    &handle,
                    Some(PresenceStatus::Away),
                    Some(Activity::Idle),
                    None,
                    None,
                )
                .await
            {
                warn!(conn_id = %handle.id, error = %e, "Away transition failed");
            }
        }
    }

    /// Clears custom statuses whose deadlines have passed.
    pub async fn drain_expired(&self) {
        let now_ms = Utc::now().timestamp_millis();
        for entry in self.expiry.drain_due(now_ms) {
            let Some(handle) = self.pool.get(&entry.conn_id) else {
                continue;
            };
            // Re-check under the lock: the status may have been
            // replaced with a later deadline or already cleared.
            let still_due = handle
                .with_state(|st| {
                    st.custom_status.is_some()
                        && st.custom_expires_at_ms.is_some_and(|d| d <= now_ms)
                })
                .unwrap_or(false);
            if !still_due {
                continue;
            }
            if let Err(e) = self.clear_custom_status(&handle).await {
                warn!(conn_id = %handle.id, error = %e, "Custom-status expiry failed");
            }
        }
    }

    /// Writes the status cache and publishes a computed delta.
    async fn publish_delta(&self, outcome: DeltaOutcome) -> AppResult<()> {
        if outcome.touches_snapshot() {
            self.cache
                .set_json(
                    &keys::status_cache(&outcome.username),
                    &outcome.snapshot,
                    Duration::from_secs(self.config.status_cache_ttl_seconds),
                )
                .await?;
        }

        let vis = self.visibility.get(&outcome.username).await?;
        if vis.is_invisible() {
            // The invisible transition already published the departure;
            // while invisible, nothing else leaves the process.
            return Ok(());
        }

        let delta = ServerMessage::Delta {
            id: outcome.username.clone(),
            s: outcome.s,
            a: outcome.a,
            p: outcome.p.clone(),
            l: outcome.l.clone(),
            cs: outcome.cs.clone(),
        };
        self.publish_presence(&outcome.username, &delta).await?;

        // Channel co-members learn about the four shared fields through
        // channel-update events on their channel topics.
        if outcome.touches_snapshot() {
            for channel_id in &outcome.channel_ids {
                let cu = ServerMessage::ChannelUpdate {
                    channel_id: *channel_id,
                    id: outcome.username.clone(),
                    s: outcome.s,
                    a: outcome.a,
                    p: outcome.p.clone(),
                    l: outcome.l.clone(),
                };
                if let Err(e) = self
                    .publish_topic(&keys::channel_topic(*channel_id), &cu)
                    .await
                {
                    warn!(channel_id = %channel_id, error = %e, "Channel update publish failed");
                }
            }
        }
        Ok(())
    }

    /// Publishes a message to a user's presence topic.
    async fn publish_presence(&self, username: &str, msg: &ServerMessage) -> AppResult<()> {
        self.publish_topic(&keys::presence_topic(username), msg)
            .await
    }

    async fn publish_topic(&self, topic: &str, msg: &ServerMessage) -> AppResult<()> {
        let payload = encode_server(msg)?;
        self.broker.publish(topic, &payload).await
    }
}
