//! Deadline queue for expiring custom statuses.
//!
//! A min-heap keyed by wall-clock deadline, drained by the liveness
//! sweep. Entries are not removed on replacement or clear; the drain
//! re-checks the connection's current deadline before acting, so stale
//! entries fall through harmlessly.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Mutex;

use crate::connection::handle::ConnectionId;

/// A pending custom-status expiry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryEntry {
    /// Wall-clock deadline in ms since epoch.
    pub deadline_ms: i64,
    /// The connection whose custom status expires.
    pub conn_id: ConnectionId,
}

/// Min-heap of custom-status deadlines.
#[derive(Debug, Default)]
pub struct ExpiryQueue {
    heap: Mutex<BinaryHeap<Reverse<(i64, u128)>>>,
}

impl ExpiryQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules an expiry.
    pub fn push(&self, entry: ExpiryEntry) {
        self.heap
            .lock()
            .expect("expiry queue poisoned")
            .push(Reverse((entry.deadline_ms, entry.conn_id.0.as_u128())));
    }

    /// Pops every entry whose deadline has passed.
    pub fn drain_due(&self, now_ms: i64) -> Vec<ExpiryEntry> {
        let mut heap = self.heap.lock().expect("expiry queue poisoned");
        let mut due = Vec::new();
        while let Some(Reverse((deadline, _))) = heap.peek() {
            if *deadline > now_ms {
                break;
            }
            if let Some(Reverse((deadline_ms, conn))) = heap.pop() {
                due.push(ExpiryEntry {
                    deadline_ms,
                    conn_id: ConnectionId(uuid::Uuid::from_u128(conn)),
                });
            }
        }
        due
    }

    /// Number of scheduled entries, stale ones included.
    pub fn len(&self) -> usize {
        self.heap.lock().expect("expiry queue poisoned").len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drains_in_deadline_order() {
        let queue = ExpiryQueue::new();
        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        queue.push(ExpiryEntry {
            deadline_ms: 200,
            conn_id: c2,
        });
        queue.push(ExpiryEntry {
            deadline_ms: 100,
            conn_id: c1,
        });

        let due = queue.drain_due(150);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].conn_id, c1);

        let due = queue.drain_due(250);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].conn_id, c2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_nothing_due_before_deadline() {
        let queue = ExpiryQueue::new();
        queue.push(ExpiryEntry {
            deadline_ms: 1_000,
            conn_id: ConnectionId::new(),
        });
        assert!(queue.drain_due(999).is_empty());
        assert_eq!(queue.len(), 1);
    }
}
