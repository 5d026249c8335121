//! Visibility decisions and field redaction.
//!
//! Applied on the egress path: every user-originated message is checked
//! against the target's visibility mode before delivery, then redacted
//! per the target's share flags. Redaction runs after delta computation,
//! so a field absent from a delta stays absent.

use std::collections::HashSet;

use devpulse_entity::preferences::{Preferences, VisibilityMode};
use devpulse_entity::presence::Activity;

use crate::message::types::{CompactUser, ServerMessage};

/// Everything needed to decide whether a viewer may see a target.
#[derive(Debug, Clone)]
pub struct TargetVisibility {
    /// Target identity id; `None` for guests.
    pub identity_id: Option<i64>,
    /// Target preferences.
    pub prefs: Preferences,
    /// Target follower ids.
    pub followers: HashSet<i64>,
    /// Target following ids.
    pub following: HashSet<i64>,
    /// Target close-friend ids.
    pub close_friends: HashSet<i64>,
}

impl TargetVisibility {
    /// Visibility data for a guest target: default preferences, no graph.
    pub fn guest() -> Self {
        Self {
            identity_id: None,
            prefs: Preferences::default(),
            followers: HashSet::new(),
            following: HashSet::new(),
            close_friends: HashSet::new(),
        }
    }

    /// Whether the target is currently invisible.
    pub fn is_invisible(&self) -> bool {
        self.prefs.visibility == VisibilityMode::Invisible
    }

    /// Decide whether `viewer` (identity id, `None` for guests) may
    /// receive this target's presence events.
    pub fn admits(&self, viewer: Option<i64>) -> bool {
        match self.prefs.visibility {
            VisibilityMode::Invisible => false,
            VisibilityMode::Everyone => true,
            VisibilityMode::Followers => {
                viewer.is_some_and(|v| self.followers.contains(&v))
            }
            VisibilityMode::Following => {
                viewer.is_some_and(|v| self.following.contains(&v))
            }
            VisibilityMode::CloseFriends => {
                viewer.is_some_and(|v| self.close_friends.contains(&v))
            }
        }
    }

    /// Like [`admits`](Self::admits) but for offline (`x`) events.
    ///
    /// The invisible mode does not suppress `x`: the transition into
    /// invisibility is announced by exactly that event.
    pub fn admits_departure(&self, viewer: Option<i64>) -> bool {
        match self.prefs.visibility {
            VisibilityMode::Invisible | VisibilityMode::Everyone => true,
            VisibilityMode::Followers => {
                viewer.is_some_and(|v| self.followers.contains(&v))
            }
            VisibilityMode::Following => {
                viewer.is_some_and(|v| self.following.contains(&v))
            }
            VisibilityMode::CloseFriends => {
                viewer.is_some_and(|v| self.close_friends.contains(&v))
            }
        }
    }
}

/// Redact a compact user record in place per the target's share flags.
pub fn redact_compact(user: &mut CompactUser, target: &TargetVisibility) {
    if !target.prefs.share_project_name {
        user.p = None;
    }
    if !target.prefs.share_language {
        user.l = None;
    }
    if !target.prefs.share_activity {
        user.act = Activity::Hidden;
    }
}

/// Redact a server message in place per the target's share flags.
///
/// Only presence-bearing messages are affected; fields absent from a
/// delta are left absent.
pub fn redact(msg: &mut ServerMessage, target: &TargetVisibility) {
    let prefs = &target.prefs;
    match msg {
        ServerMessage::Delta { a, p, l, .. } | ServerMessage::ChannelUpdate { a, p, l, .. } => {
            if !prefs.share_project_name && p.is_some() {
                *p = Some(String::new());
            }
            if !prefs.share_language && l.is_some() {
                *l = Some(String::new());
            }
            if !prefs.share_activity && a.is_some() {
                *a = Some(Activity::Hidden);
            }
        }
        ServerMessage::Online { act, p, l, .. } => {
            if !prefs.share_project_name {
                *p = None;
            }
            if !prefs.share_language {
                *l = None;
            }
            if !prefs.share_activity {
                *act = Activity::Hidden;
            }
        }
        ServerMessage::MemberJoined { member, .. } => {
            redact_compact(member, target);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use devpulse_entity::preferences::VisibilityMode;
    use devpulse_entity::presence::PresenceStatus;

    use super::*;

    fn target(mode: VisibilityMode) -> TargetVisibility {
        TargetVisibility {
            identity_id: Some(1),
            prefs: Preferences {
                visibility: mode,
                ..Preferences::default()
            },
            followers: HashSet::from([10, 11]),
            following: HashSet::from([20]),
            close_friends: HashSet::from([10]),
        }
    }

    #[test]
    fn test_everyone_admits_guests() {
        assert!(target(VisibilityMode::Everyone).admits(None));
        assert!(target(VisibilityMode::Everyone).admits(Some(99)));
    }

    #[test]
    fn test_followers_mode() {
        let t = target(VisibilityMode::Followers);
        assert!(t.admits(Some(10)));
        assert!(!t.admits(Some(20)));
        assert!(!t.admits(None));
    }

    #[test]
    fn test_following_mode() {
        let t = target(VisibilityMode::Following);
        assert!(t.admits(Some(20)));
        assert!(!t.admits(Some(10)));
    }

    #[test]
    fn test_close_friends_mode() {
        let t = target(VisibilityMode::CloseFriends);
        assert!(t.admits(Some(10)));
        assert!(!t.admits(Some(11)));
    }

    #[test]
    fn test_invisible_drops_everything_except_departure() {
        let t = target(VisibilityMode::Invisible);
        assert!(!t.admits(Some(10)));
        assert!(t.admits_departure(Some(10)));
    }

    #[test]
    fn test_departure_still_respects_graph_modes() {
        let t = target(VisibilityMode::Followers);
        assert!(t.admits_departure(Some(10)));
        assert!(!t.admits_departure(Some(77)));
    }

    #[test]
    fn test_redaction_preserves_absent_delta_fields() {
        let mut t = target(VisibilityMode::Everyone);
        t.prefs.share_project_name = false;
        t.prefs.share_activity = false;

        let mut msg = ServerMessage::Delta {
            id: "alice".into(),
            s: None,
            a: Some(Activity::Coding),
            p: None,
            l: Some("rust".into()),
            cs: None,
        };
        redact(&mut msg, &t);
        match msg {
            ServerMessage::Delta { a, p, l, .. } => {
                // absent project stays absent
                assert_eq!(p, None);
                assert_eq!(a, Some(Activity::Hidden));
                assert_eq!(l, Some("rust".into()));
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_redaction_clears_online_snapshot_fields() {
        let mut t = target(VisibilityMode::Everyone);
        t.prefs.share_language = false;

        let mut msg = ServerMessage::Online {
            id: "alice".into(),
            a: None,
            s: PresenceStatus::Online,
            act: Activity::Reading,
            p: Some("devpulse".into()),
            l: Some("rust".into()),
        };
        redact(&mut msg, &t);
        match msg {
            ServerMessage::Online { p, l, act, .. } => {
                assert_eq!(p, Some("devpulse".into()));
                assert_eq!(l, None);
                assert_eq!(act, Activity::Reading);
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }
}
