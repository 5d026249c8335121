//! Periodic liveness sweep over all local connections.
//!
//! One sweep per heartbeat interval: connections with no traffic for a
//! full interval are terminated through the session disconnect path;
//! the rest receive a ping. The sweep also refreshes resume records,
//! fires away transitions, and drains expired custom statuses.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::interval;
use tracing::{debug, warn};

use devpulse_core::config::RealtimeConfig;

use crate::connection::pool::ConnectionPool;
use crate::message::codec::encode_server;
use crate::message::types::ServerMessage;
use crate::presence::engine::PresenceEngine;
use crate::session::manager::SessionManager;

/// Walks all local connections once per heartbeat interval.
#[derive(Debug)]
pub struct LivenessMonitor {
    pool: Arc<ConnectionPool>,
    sessions: Arc<SessionManager>,
    presence: Arc<PresenceEngine>,
    config: RealtimeConfig,
}

impl LivenessMonitor {
    /// Creates a new liveness monitor.
    pub fn new(
        pool: Arc<ConnectionPool>,
        sessions: Arc<SessionManager>,
        presence: Arc<PresenceEngine>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            pool,
            sessions,
            presence,
            config,
        }
    }

    /// Runs the sweep loop until shutdown.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut ticker = interval(Duration::from_secs(self.config.heartbeat_interval_seconds));
        // The first tick fires immediately; skip it.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => self.sweep().await,
                _ = shutdown.recv() => {
                    debug!("Liveness monitor stopping");
                    return;
                }
            }
        }
    }

    /// One pass over every local connection.
    pub async fn sweep(&self) {
        let interval_ms = (self.config.heartbeat_interval_seconds * 1000) as i64;
        let ping = match encode_server(&ServerMessage::Heartbeat) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "Heartbeat encode failed");
                return;
            }
        };

        for handle in self.pool.all() {
            if !handle.is_alive() {
                continue;
            }

            // A full interval with no inbound traffic is fatal.
            if handle.idle_ms() > interval_ms {
                warn!(
                    conn_id = %handle.id,
                    idle_ms = handle.idle_ms(),
                    "Connection failed liveness, terminating"
                );
                self.sessions.disconnect(&handle.id).await;
                continue;
            }

            if handle.is_bound() {
                self.sessions.refresh_resume(&handle).await;
            }

            if handle.send(ping.clone()).await.is_err() {
                warn!(conn_id = %handle.id, "Ping failed, terminating");
                self.sessions.disconnect(&handle.id).await;
            }
        }

        self.presence.sweep_away().await;
        self.presence.drain_expired().await;
    }
}
