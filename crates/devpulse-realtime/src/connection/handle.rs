//! Individual connection handle — identity binding, presence fields,
//! outbound send, liveness stamps.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use devpulse_core::{AppError, AppResult};
use devpulse_entity::presence::{CustomStatus, StatusSnapshot};

/// Unique connection identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    /// Creates a new random connection ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// State installed on a connection by a successful login.
#[derive(Debug, Clone)]
pub struct SessionState {
    /// Bound username.
    pub username: String,
    /// External identity id; `None` for guests.
    pub identity_id: Option<i64>,
    /// Avatar URL, if known.
    pub avatar_url: Option<String>,
    /// Whether this is a guest session.
    pub is_guest: bool,
    /// Current resume token.
    pub resume_token: String,
    /// Current presence fields.
    pub snapshot: StatusSnapshot,
    /// Current custom status.
    pub custom_status: Option<CustomStatus>,
    /// Wall-clock deadline of the custom status, in ms since epoch.
    pub custom_expires_at_ms: Option<i64>,
    /// Channels this connection is subscribed to.
    pub channel_ids: Vec<Uuid>,
}

/// Represents a single client connection (one window).
///
/// Mutable session state lives behind a std `Mutex`; critical sections
/// are O(1) and never cross an await point.
#[derive(Debug)]
pub struct ConnectionHandle {
    /// Unique connection identifier.
    pub id: ConnectionId,
    /// Channel for sending encoded frames to this connection.
    tx: mpsc::Sender<String>,
    /// When the connection was established.
    pub connected_at: DateTime<Utc>,
    /// Whether the connection is still alive.
    alive: AtomicBool,
    /// Last inbound frame of any kind, in ms since epoch.
    last_seen_ms: AtomicI64,
    /// Last activity report from the editor, in ms since epoch.
    last_activity_ms: AtomicI64,
    /// Cancelled when the server closes the transport.
    closer: CancellationToken,
    /// Session state, present once logged in.
    state: Mutex<Option<SessionState>>,
}

impl ConnectionHandle {
    /// Creates a new unbound connection handle.
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: ConnectionId::new(),
            tx,
            connected_at: Utc::now(),
            alive: AtomicBool::new(true),
            last_seen_ms: AtomicI64::new(now),
            last_activity_ms: AtomicI64::new(now),
            closer: CancellationToken::new(),
            state: Mutex::new(None),
        }
    }

    /// Sends a text frame to this connection.
    pub async fn send(&self, frame: String) -> AppResult<()> {
        if !self.is_alive() {
            return Err(AppError::internal("Connection is closed"));
        }
        self.tx
            .send(frame)
            .await
            .map_err(|e| AppError::internal(format!("Send failed: {e}")))
    }

    /// Checks whether the connection is still alive.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Relaxed)
    }

    /// Marks the connection as closed and signals the transport task.
    pub fn mark_closed(&self) {
        self.alive.store(false, Ordering::Relaxed);
        self.closer.cancel();
    }

    /// Token cancelled when the server closes this connection.
    pub fn closed(&self) -> CancellationToken {
        self.closer.clone()
    }

    /// Records an inbound frame for liveness purposes.
    pub fn touch_liveness(&self) {
        self.last_seen_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Records an editor activity report.
    pub fn touch_activity(&self) {
        self.last_activity_ms
            .store(Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Milliseconds since the last inbound frame.
    pub fn idle_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.last_seen_ms.load(Ordering::Relaxed)
    }

    /// Milliseconds since the last editor activity report.
    pub fn activity_idle_ms(&self) -> i64 {
        Utc::now().timestamp_millis() - self.last_activity_ms.load(Ordering::Relaxed)
    }

    /// Installs session state after a successful login.
    pub fn bind(&self, state: SessionState) {
        *self.state.lock().expect("connection state poisoned") = Some(state);
    }

    /// Runs a closure over the session state, if bound.
    pub fn with_state<R>(&self, f: impl FnOnce(&mut SessionState) -> R) -> Option<R> {
        self.state
            .lock()
            .expect("connection state poisoned")
            .as_mut()
            .map(f)
    }

    /// Whether the connection has completed login.
    pub fn is_bound(&self) -> bool {
        self.state
            .lock()
            .expect("connection state poisoned")
            .is_some()
    }

    /// The bound username, if any.
    pub fn username(&self) -> Option<String> {
        self.with_state(|st| st.username.clone())
    }

    /// The bound identity pair `(username, identity_id)`, if any.
    pub fn identity(&self) -> Option<(String, Option<i64>)> {
        self.with_state(|st| (st.username.clone(), st.identity_id))
    }
}
