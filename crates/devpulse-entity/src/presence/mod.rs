//! Presence status, activity, and custom-status entities.

pub mod custom;
pub mod status;

pub use custom::CustomStatus;
pub use status::{Activity, PresenceStatus};

use serde::{Deserialize, Serialize};

/// The full published state of one user, as held in the status cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Presence status.
    pub status: PresenceStatus,
    /// Current activity.
    pub activity: Activity,
    /// Current project, if any.
    pub project: Option<String>,
    /// Current language, if any.
    pub language: Option<String>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: PresenceStatus::Online,
            activity: Activity::Idle,
            project: None,
            language: None,
        }
    }
}
