//! Presence status and activity enumerations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Connection-level presence status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PresenceStatus {
    /// Connected and active.
    Online,
    /// Connected but without recent editor activity.
    Away,
    /// Not connected.
    Offline,
    /// Hidden from all viewers.
    Invisible,
}

impl PresenceStatus {
    /// Return the status as its wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "Online",
            Self::Away => "Away",
            Self::Offline => "Offline",
            Self::Invisible => "Invisible",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PresenceStatus {
    type Err = devpulse_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Online" => Ok(Self::Online),
            "Away" => Ok(Self::Away),
            "Offline" => Ok(Self::Offline),
            "Invisible" => Ok(Self::Invisible),
            _ => Err(devpulse_core::AppError::invalid_frame(format!(
                "Invalid status: '{s}'. Expected one of: Online, Away, Offline, Invisible"
            ))),
        }
    }
}

/// What a window is currently doing in the editor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Activity {
    /// Actively writing code.
    Coding,
    /// Running a debug session.
    Debugging,
    /// Reading code without editing.
    Reading,
    /// No recent editor events.
    Idle,
    /// Redacted by the owner's share preferences.
    Hidden,
}

impl Activity {
    /// Aggregation rank: the window with the highest rank wins.
    pub fn rank(&self) -> u8 {
        match self {
            Self::Debugging => 4,
            Self::Coding => 3,
            Self::Reading => 2,
            Self::Idle => 1,
            Self::Hidden => 0,
        }
    }

    /// Return the activity as its wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coding => "Coding",
            Self::Debugging => "Debugging",
            Self::Reading => "Reading",
            Self::Idle => "Idle",
            Self::Hidden => "Hidden",
        }
    }
}

impl fmt::Display for Activity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Activity {
    type Err = devpulse_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Coding" => Ok(Self::Coding),
            "Debugging" => Ok(Self::Debugging),
            "Reading" => Ok(Self::Reading),
            "Idle" => Ok(Self::Idle),
            "Hidden" => Ok(Self::Hidden),
            _ => Err(devpulse_core::AppError::invalid_frame(format!(
                "Invalid activity: '{s}'. Expected one of: Coding, Debugging, Reading, Idle, Hidden"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_activity_ranking() {
        assert!(Activity::Debugging.rank() > Activity::Coding.rank());
        assert!(Activity::Coding.rank() > Activity::Reading.rank());
        assert!(Activity::Reading.rank() > Activity::Idle.rank());
        assert!(Activity::Idle.rank() > Activity::Hidden.rank());
    }

    #[test]
    fn test_status_labels_round_trip() {
        for s in ["Online", "Away", "Offline", "Invisible"] {
            assert_eq!(s.parse::<PresenceStatus>().unwrap().as_str(), s);
        }
        assert!("online".parse::<PresenceStatus>().is_err());
    }
}
