//! Connection pool — all live connections plus per-username window sets.

use std::sync::Arc;

use dashmap::DashMap;

use super::handle::{ConnectionHandle, ConnectionId};

/// Thread-safe pool of all live connections.
///
/// Window sets are process-local and never persisted; the topic
/// substrate is the sole cross-replica carrier. Windows are kept in
/// connect order, so the first entry is always the earliest window.
#[derive(Debug, Default)]
pub struct ConnectionPool {
    /// Connection ID → handle for direct lookup.
    by_id: DashMap<ConnectionId, Arc<ConnectionHandle>>,
    /// Username → window set (bound connections only).
    windows: DashMap<String, Vec<Arc<ConnectionHandle>>>,
}

impl ConnectionPool {
    /// Creates a new empty connection pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a freshly accepted (not yet logged-in) connection.
    pub fn add(&self, handle: Arc<ConnectionHandle>) {
        self.by_id.insert(handle.id, handle);
    }

    /// Gets a connection by ID.
    pub fn get(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.get(conn_id).map(|entry| entry.value().clone())
    }

    /// Removes a connection from the pool. Window-set removal is the
    /// caller's responsibility (it needs the offline-event decision).
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<Arc<ConnectionHandle>> {
        self.by_id.remove(conn_id).map(|(_, handle)| handle)
    }

    /// Adds a bound connection to its username's window set.
    pub fn add_window(&self, username: &str, handle: Arc<ConnectionHandle>) {
        self.windows
            .entry(username.to_string())
            .or_default()
            .push(handle);
    }

    /// Removes a connection from a window set.
    ///
    /// Returns `true` iff the window set transitioned to empty (the
    /// offline-event condition).
    pub fn remove_window(&self, username: &str, conn_id: &ConnectionId) -> bool {
        let mut became_empty = false;
        if let Some(mut windows) = self.windows.get_mut(username) {
            windows.retain(|c| c.id != *conn_id);
            became_empty = windows.is_empty();
        }
        if became_empty {
            self.windows.remove(username);
        }
        became_empty
    }

    /// All windows currently bound to a username, in connect order.
    pub fn windows_of(&self, username: &str) -> Vec<Arc<ConnectionHandle>> {
        self.windows
            .get(username)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Whether any live window is bound to the username.
    pub fn is_online(&self, username: &str) -> bool {
        self.windows.contains_key(username)
    }

    /// All connections, bound or not.
    pub fn all(&self) -> Vec<Arc<ConnectionHandle>> {
        self.by_id
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Total number of live connections.
    pub fn connection_count(&self) -> usize {
        self.by_id.len()
    }

    /// Number of distinct online usernames.
    pub fn online_user_count(&self) -> usize {
        self.windows.len()
    }
}
