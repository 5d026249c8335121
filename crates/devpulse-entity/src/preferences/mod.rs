//! Per-user visibility and sharing preferences.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Who may observe a user's presence events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VisibilityMode {
    /// Any viewer, including guests.
    Everyone,
    /// Only the user's followers.
    Followers,
    /// Only users this user follows.
    Following,
    /// Only close friends.
    CloseFriends,
    /// Nobody; the user appears offline.
    Invisible,
}

impl VisibilityMode {
    /// Return the mode as its wire label.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Everyone => "everyone",
            Self::Followers => "followers",
            Self::Following => "following",
            Self::CloseFriends => "close-friends",
            Self::Invisible => "invisible",
        }
    }
}

impl fmt::Display for VisibilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VisibilityMode {
    type Err = devpulse_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "everyone" => Ok(Self::Everyone),
            "followers" => Ok(Self::Followers),
            "following" => Ok(Self::Following),
            "close-friends" => Ok(Self::CloseFriends),
            "invisible" => Ok(Self::Invisible),
            _ => Err(devpulse_core::AppError::invalid_frame(format!(
                "Invalid visibility mode: '{s}'"
            ))),
        }
    }
}

/// Preference record for an authenticated user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Preferences {
    /// Visibility mode.
    pub visibility: VisibilityMode,
    /// Whether the current project name is shared.
    pub share_project_name: bool,
    /// Whether the current language is shared.
    pub share_language: bool,
    /// Whether the current activity is shared.
    pub share_activity: bool,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            visibility: VisibilityMode::Everyone,
            share_project_name: true,
            share_language: true,
            share_activity: true,
        }
    }
}

/// Partial preference update as sent by clients.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreferencesUpdate {
    /// New visibility mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility: Option<VisibilityMode>,
    /// New project-sharing flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_project_name: Option<bool>,
    /// New language-sharing flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_language: Option<bool>,
    /// New activity-sharing flag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub share_activity: Option<bool>,
}

impl Preferences {
    /// Apply a partial update, returning the merged preferences.
    pub fn merged(&self, update: &PreferencesUpdate) -> Self {
        Self {
            visibility: update.visibility.unwrap_or(self.visibility),
            share_project_name: update.share_project_name.unwrap_or(self.share_project_name),
            share_language: update.share_language.unwrap_or(self.share_language),
            share_activity: update.share_activity.unwrap_or(self.share_activity),
        }
    }
}
