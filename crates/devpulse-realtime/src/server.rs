//! Top-level realtime engine that ties together all subsystems.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use devpulse_cache::BrokerManager;
use devpulse_cache::keys;
use devpulse_core::config::RealtimeConfig;
use devpulse_core::traits::pubsub::{PubSubProvider, TopicMessage};
use devpulse_core::{AppResult, ErrorKind};
use devpulse_entity::store::{ChannelStore, UserStore};

use crate::channel::engine::ChannelEngine;
use crate::connection::handle::{ConnectionHandle, ConnectionId};
use crate::connection::pool::ConnectionPool;
use crate::identity::IdentityProvider;
use crate::liveness::monitor::LivenessMonitor;
use crate::message::codec::{decode_client, encode_server};
use crate::message::types::{ClientMessage, ServerMessage};
use crate::presence::engine::PresenceEngine;
use crate::privacy::cache::VisibilityCache;
use crate::privacy::filter::redact;
use crate::session::manager::SessionManager;
use crate::subscription::registry::SubscriptionRegistry;

/// Central realtime engine coordinating all subsystems.
#[derive(Debug)]
pub struct RealtimeEngine {
    /// Connection pool and window sets.
    pub pool: Arc<ConnectionPool>,
    /// Topic subscription registry.
    pub registry: Arc<SubscriptionRegistry>,
    /// Session manager.
    pub sessions: Arc<SessionManager>,
    /// Presence engine.
    pub presence: Arc<PresenceEngine>,
    /// Channel engine.
    pub channels: Arc<ChannelEngine>,
    /// Target visibility cache.
    pub visibility: Arc<VisibilityCache>,
    liveness: Arc<LivenessMonitor>,
    broker: Arc<dyn PubSubProvider>,
    config: RealtimeConfig,
    shutdown_tx: broadcast::Sender<()>,
}

impl RealtimeEngine {
    /// Wires all subsystems over the given providers.
    pub fn new(
        config: RealtimeConfig,
        broker: &BrokerManager,
        users: Arc<dyn UserStore>,
        channel_store: Arc<dyn ChannelStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> Arc<Self> {
        let (shutdown_tx, _) = broadcast::channel(1);

        let cache = broker.cache();
        let pubsub = broker.pubsub();

        let pool = Arc::new(ConnectionPool::new());
        let registry = Arc::new(SubscriptionRegistry::new(pubsub.clone()));
        let visibility = Arc::new(VisibilityCache::new(
            users.clone(),
            Duration::from_secs(config.visibility_cache_ttl_seconds),
        ));
        let presence = Arc::new(PresenceEngine::new(
            pool.clone(),
            cache.clone(),
            pubsub.clone(),
            users.clone(),
            visibility.clone(),
            config.clone(),
        ));
        let sessions = Arc::new(SessionManager::new(
            pool.clone(),
            registry.clone(),
            cache.clone(),
            users.clone(),
            channel_store.clone(),
            identity,
            visibility.clone(),
            presence.clone(),
            config.clone(),
        ));
        let channels = Arc::new(ChannelEngine::new(
            pool.clone(),
            registry.clone(),
            channel_store,
            users,
            cache,
            visibility.clone(),
            pubsub.clone(),
            config.clone(),
        ));
        let liveness = Arc::new(LivenessMonitor::new(
            pool.clone(),
            sessions.clone(),
            presence.clone(),
            config.clone(),
        ));

        info!("Realtime engine initialized");

        Arc::new(Self {
            pool,
            registry,
            sessions,
            presence,
            channels,
            visibility,
            liveness,
            broker: pubsub,
            config,
            shutdown_tx,
        })
    }

    /// Starts the topic relay and the liveness sweep.
    pub async fn start(self: Arc<Self>) -> AppResult<()> {
        let mut messages = self.broker.take_messages().await?;

        let engine = self.clone();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    msg = messages.recv() => match msg {
                        Some(msg) => engine.route_topic(msg).await,
                        None => break,
                    },
                    _ = shutdown.recv() => break,
                }
            }
            debug!("Topic relay stopped");
        });

        let liveness = self.liveness.clone();
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            liveness.run(shutdown).await;
        });

        Ok(())
    }

    /// Accepts a new transport; the connection stays unbound until login.
    pub fn register_transport(&self) -> (Arc<ConnectionHandle>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.config.outbound_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(tx));
        self.pool.add(handle.clone());
        info!(conn_id = %handle.id, "Connection registered");
        (handle, rx)
    }

    /// Processes one inbound frame.
    ///
    /// Per-connection handling is serialised by the caller: one frame is
    /// processed to completion before the next is read.
    pub async fn handle_frame(&self, conn_id: &ConnectionId, raw: &str) {
        let Some(handle) = self.pool.get(conn_id) else {
            warn!(conn_id = %conn_id, "Frame from unknown connection");
            return;
        };
        handle.touch_liveness();

        let msg = match decode_client(raw) {
            Ok(msg) => msg,
            Err(e) => {
                self.send_or_log(
                    &handle,
                    &ServerMessage::Error {
                        error: e.message,
                        code: Some(ErrorKind::InvalidFrame.wire_code().to_string()),
                    },
                )
                .await;
                return;
            }
        };

        let is_login = matches!(msg, ClientMessage::Login { .. });
        if let Err(e) = self.dispatch(&handle, msg).await {
            // Downstream detail stays in the logs; the wire carries the
            // collapsed code and a safe message.
            let wire_code = e.kind.wire_code();
            let message = if wire_code == "INTERNAL_ERROR" {
                warn!(conn_id = %conn_id, error = %e, "Operation failed internally");
                "Internal server error".to_string()
            } else {
                e.message
            };
            let reply = if is_login {
                ServerMessage::LoginError { error: message }
            } else {
                ServerMessage::Error {
                    error: message,
                    code: Some(wire_code.to_string()),
                }
            };
            self.send_or_log(&handle, &reply).await;
        }
    }

    /// Drives the session disconnect path.
    pub async fn disconnect(&self, conn_id: &ConnectionId) {
        self.sessions.disconnect(conn_id).await;
    }

    /// Initiates a graceful shutdown: stops background tasks and closes
    /// every connection.
    pub async fn shutdown(&self) {
        info!("Shutting down realtime engine");
        let _ = self.shutdown_tx.send(());
        for handle in self.pool.all() {
            handle.mark_closed();
        }
        info!("Realtime engine shut down");
    }

    async fn dispatch(
        &self,
        handle: &Arc<ConnectionHandle>,
        msg: ClientMessage,
    ) -> AppResult<()> {
        match msg {
            ClientMessage::Login {
                username,
                token,
                resume_token,
            } => {
                self.sessions
                    .login(handle, &username, token.as_deref(), resume_token.as_deref())
                    .await
            }
            ClientMessage::StatusUpdate { s, a, p, l } => {
                handle.touch_activity();
                self.presence.apply_update(handle, s, a, p, l).await
            }
            ClientMessage::PrefsUpdate { prefs } => {
                self.presence.apply_prefs_update(handle, &prefs).await
            }
            ClientMessage::Heartbeat => handle.send(encode_server(&ServerMessage::Heartbeat)?).await,
            ClientMessage::CreateChannel { name } => self.channels.create(handle, &name).await,
            ClientMessage::JoinChannel { invite_code } => {
                self.channels.join(handle, &invite_code).await
            }
            ClientMessage::LeaveChannel { channel_id } => {
                self.channels.leave(handle, channel_id).await
            }
            ClientMessage::ChannelChat {
                channel_id,
                content,
            } => self.channels.chat(handle, channel_id, &content).await,
            ClientMessage::SetCustomStatus {
                text,
                emoji,
                expires_in,
            } => {
                handle.touch_activity();
                self.presence
                    .set_custom_status(handle, &text, emoji, expires_in)
                    .await
            }
            ClientMessage::ClearCustomStatus => {
                handle.touch_activity();
                self.presence.clear_custom_status(handle).await
            }
        }
    }

    /// Routes one broker message to its local subscribers.
    async fn route_topic(&self, msg: TopicMessage) {
        if let Some(target) = keys::presence_topic_target(&msg.topic) {
            self.route_presence(target.to_string(), msg).await;
        } else if keys::channel_topic_id(&msg.topic).is_some() {
            self.route_channel(msg).await;
        } else {
            debug!(topic = %msg.topic, "Message on unroutable topic");
        }
    }

    /// Presence-topic egress: privacy filter per viewer, redaction per
    /// the target's share flags, then fan-out.
    async fn route_presence(&self, target: String, msg: TopicMessage) {
        let subscribers = self.registry.subscribers(&msg.topic);
        if subscribers.is_empty() {
            return;
        }

        let mut server_msg: ServerMessage = match serde_json::from_str(&msg.payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "Undecodable topic payload");
                return;
            }
        };

        let vis = match self.visibility.get(&target).await {
            Ok(v) => v,
            Err(e) => {
                warn!(target = %target, error = %e, "Visibility lookup failed");
                return;
            }
        };

        let is_departure = matches!(server_msg, ServerMessage::Offline { .. });
        redact(&mut server_msg, &vis);
        let payload = match encode_server(&server_msg) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Re-encode failed");
                return;
            }
        };

        for conn_id in subscribers {
            let Some(conn) = self.pool.get(&conn_id) else {
                continue;
            };
            let Some((viewer_name, viewer_id)) = conn.identity() else {
                continue;
            };
            if viewer_name == target {
                continue;
            }
            let admitted = if is_departure {
                vis.admits_departure(viewer_id)
            } else {
                vis.admits(viewer_id)
            };
            if !admitted {
                continue;
            }
            if conn.send(payload.clone()).await.is_err() {
                debug!(conn_id = %conn_id, "Send to subscriber failed");
            }
        }
    }

    /// Channel-topic egress: subscribers are members by construction, so
    /// graph visibility is bypassed; share-flag redaction still applies
    /// to status-bearing payloads.
    async fn route_channel(&self, msg: TopicMessage) {
        let subscribers = self.registry.subscribers(&msg.topic);
        if subscribers.is_empty() {
            return;
        }

        let mut server_msg: ServerMessage = match serde_json::from_str(&msg.payload) {
            Ok(m) => m,
            Err(e) => {
                warn!(topic = %msg.topic, error = %e, "Undecodable topic payload");
                return;
            }
        };

        let status_owner = match &server_msg {
            ServerMessage::ChannelUpdate { id, .. } => Some(id.clone()),
            ServerMessage::MemberJoined { member, .. } => Some(member.id.clone()),
            _ => None,
        };
        if let Some(owner) = status_owner {
            match self.visibility.get(&owner).await {
                Ok(vis) => redact(&mut server_msg, &vis),
                Err(e) => {
                    warn!(target = %owner, error = %e, "Visibility lookup failed");
                    return;
                }
            }
        }

        let payload = match encode_server(&server_msg) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Re-encode failed");
                return;
            }
        };

        for conn_id in subscribers {
            let Some(conn) = self.pool.get(&conn_id) else {
                continue;
            };
            if conn.send(payload.clone()).await.is_err() {
                debug!(conn_id = %conn_id, "Send to channel member failed");
            }
        }
    }

    async fn send_or_log(&self, handle: &ConnectionHandle, msg: &ServerMessage) {
        match encode_server(msg) {
            Ok(frame) => {
                if let Err(e) = handle.send(frame).await {
                    debug!(conn_id = %handle.id, error = %e, "Reply send failed");
                }
            }
            Err(e) => warn!(error = %e, "Reply encode failed"),
        }
    }
}
