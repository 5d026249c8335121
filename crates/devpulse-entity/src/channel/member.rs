//! Channel membership entity.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Role of a member inside a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelRole {
    /// Channel administrator (the owner at creation time).
    Admin,
    /// Regular member.
    Member,
}

impl ChannelRole {
    /// Return the role as a lowercase string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Member => "member",
        }
    }
}

impl fmt::Display for ChannelRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ChannelRole {
    type Err = devpulse_core::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "member" => Ok(Self::Member),
            _ => Err(devpulse_core::AppError::internal(format!(
                "Invalid channel role: '{s}'"
            ))),
        }
    }
}

/// A membership row: one user inside one channel.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ChannelMember {
    /// Channel id.
    pub channel_id: Uuid,
    /// Member identity id.
    pub identity_id: i64,
    /// Denormalised username for roster construction.
    pub username: String,
    /// Member role.
    #[sqlx(try_from = "String")]
    pub role: ChannelRole,
    /// When the member joined.
    pub joined_at: DateTime<Utc>,
}

impl TryFrom<String> for ChannelRole {
    type Error = devpulse_core::AppError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}
