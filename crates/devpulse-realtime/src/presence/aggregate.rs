//! Multi-window status aggregation.
//!
//! When a username holds several windows, consumers see the window with
//! the highest-priority activity (Debugging > Coding > Reading > Idle >
//! Hidden); the earliest window wins ties.

use std::sync::Arc;

use devpulse_entity::presence::{CustomStatus, StatusSnapshot};

use crate::connection::handle::ConnectionHandle;

/// The aggregated view of one username across its windows.
#[derive(Debug, Clone)]
pub struct AggregateView {
    /// Avatar URL from the winning window's binding.
    pub avatar_url: Option<String>,
    /// Presence fields of the winning window.
    pub snapshot: StatusSnapshot,
    /// Custom status of the winning window.
    pub custom_status: Option<CustomStatus>,
}

/// Aggregate a window set, given in connect order.
///
/// Returns `None` when no window is bound.
pub fn aggregate_windows(windows: &[Arc<ConnectionHandle>]) -> Option<AggregateView> {
    let mut best: Option<AggregateView> = None;
    for window in windows {
        let Some(view) = window.with_state(|st| AggregateView {
            avatar_url: st.avatar_url.clone(),
            snapshot: st.snapshot.clone(),
            custom_status: st.custom_status.clone(),
        }) else {
            continue;
        };
        let better = match &best {
            None => true,
            // strict comparison keeps the earliest window on ties
            Some(current) => {
                view.snapshot.activity.rank() > current.snapshot.activity.rank()
            }
        };
        if better {
            best = Some(view);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use devpulse_entity::presence::{Activity, PresenceStatus, StatusSnapshot};

    use crate::connection::handle::SessionState;

    use super::*;

    fn window(activity: Activity, project: &str) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new(tx));
        handle.bind(SessionState {
            username: "alice".into(),
            identity_id: Some(1),
            avatar_url: None,
            is_guest: false,
            resume_token: "tok".into(),
            snapshot: StatusSnapshot {
                status: PresenceStatus::Online,
                activity,
                project: Some(project.to_string()),
                language: None,
            },
            custom_status: None,
            custom_expires_at_ms: None,
            channel_ids: Vec::new(),
        });
        handle
    }

    #[test]
    fn test_highest_activity_wins() {
        let windows = vec![window(Activity::Idle, "w1"), window(Activity::Coding, "w2")];
        let view = aggregate_windows(&windows).unwrap();
        assert_eq!(view.snapshot.activity, Activity::Coding);
        assert_eq!(view.snapshot.project.as_deref(), Some("w2"));
    }

    #[test]
    fn test_earliest_window_wins_ties() {
        let windows = vec![
            window(Activity::Coding, "first"),
            window(Activity::Coding, "second"),
        ];
        let view = aggregate_windows(&windows).unwrap();
        assert_eq!(view.snapshot.project.as_deref(), Some("first"));
    }

    #[test]
    fn test_empty_set_aggregates_to_none() {
        assert!(aggregate_windows(&[]).is_none());
    }
}
