//! Inbound and outbound wire message type definitions.
//!
//! Messages are JSON objects discriminated by a short `t` tag with
//! compact single-letter keys to minimise bandwidth on chatty presence
//! traffic.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use devpulse_entity::preferences::PreferencesUpdate;
use devpulse_entity::presence::{Activity, CustomStatus, PresenceStatus};

/// Messages sent by the client to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ClientMessage {
    /// Login request: declared username plus optional credentials.
    #[serde(rename = "login")]
    Login {
        /// Declared username.
        username: String,
        /// Identity-provider access token.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        token: Option<String>,
        /// Resume token from a previous session.
        #[serde(
            rename = "resumeToken",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        resume_token: Option<String>,
    },
    /// Partial status update; only supplied fields are considered.
    #[serde(rename = "statusUpdate")]
    StatusUpdate {
        /// New status.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        s: Option<PresenceStatus>,
        /// New activity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        a: Option<Activity>,
        /// New project name.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p: Option<String>,
        /// New language.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        l: Option<String>,
    },
    /// Partial preferences update.
    #[serde(rename = "prefsUpdate")]
    PrefsUpdate {
        /// Fields to change.
        prefs: PreferencesUpdate,
    },
    /// Client-initiated heartbeat ping.
    #[serde(rename = "hb")]
    Heartbeat,
    /// Create a channel.
    #[serde(rename = "cc")]
    CreateChannel {
        /// Proposed channel name.
        name: String,
    },
    /// Join a channel by invite code.
    #[serde(rename = "jc")]
    JoinChannel {
        /// Invite code.
        #[serde(rename = "inviteCode")]
        invite_code: String,
    },
    /// Leave a channel.
    #[serde(rename = "lc")]
    LeaveChannel {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
    },
    /// Send a chat message to a channel.
    #[serde(rename = "cm")]
    ChannelChat {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// Message content.
        content: String,
    },
    /// Set a custom status.
    #[serde(rename = "ss")]
    SetCustomStatus {
        /// Status text.
        text: String,
        /// Optional emoji prefix.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        emoji: Option<String>,
        /// Expiry in seconds from now.
        #[serde(
            rename = "expiresIn",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        expires_in: Option<u64>,
    },
    /// Clear the custom status.
    #[serde(rename = "clr")]
    ClearCustomStatus,
}

/// Compact user record used in sync and roster messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompactUser {
    /// Username.
    pub id: String,
    /// Avatar URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub a: Option<String>,
    /// Status label.
    pub s: PresenceStatus,
    /// Activity label.
    pub act: Activity,
    /// Current project.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    /// Current language.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub l: Option<String>,
    /// Last seen, in ms since epoch. Only set for offline users.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ls: Option<i64>,
}

/// Messages sent by the server to the client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum ServerMessage {
    /// Login accepted.
    #[serde(rename = "loginSuccess")]
    LoginSuccess {
        /// Fresh resume token.
        token: String,
        /// External identity id, absent for guests.
        #[serde(
            rename = "githubId",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        github_id: Option<i64>,
        /// Follower identity ids, absent for guests.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        followers: Option<Vec<i64>>,
        /// Following identity ids, absent for guests.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        following: Option<Vec<i64>>,
    },
    /// Login rejected.
    #[serde(rename = "loginError")]
    LoginError {
        /// Human-readable reason.
        error: String,
    },
    /// Initial view of the viewer's online friends.
    #[serde(rename = "sync")]
    Sync {
        /// Friends currently visible to the viewer.
        users: Vec<CompactUser>,
    },
    /// Delta: only the fields that changed since the prior state.
    #[serde(rename = "u")]
    Delta {
        /// Username of the owner.
        id: String,
        /// Changed status.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        s: Option<PresenceStatus>,
        /// Changed activity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        a: Option<Activity>,
        /// Changed project.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p: Option<String>,
        /// Changed language.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        l: Option<String>,
        /// Changed custom status; explicit null clears it.
        #[serde(
            default,
            skip_serializing_if = "Option::is_none",
            with = "double_option"
        )]
        cs: Option<Option<CustomStatus>>,
    },
    /// A user came online; carries the full state snapshot.
    #[serde(rename = "o")]
    Online {
        /// Username.
        id: String,
        /// Avatar URL.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        a: Option<String>,
        /// Status label.
        s: PresenceStatus,
        /// Activity label.
        act: Activity,
        /// Current project.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p: Option<String>,
        /// Current language.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        l: Option<String>,
    },
    /// A user went offline.
    #[serde(rename = "x")]
    Offline {
        /// Username.
        id: String,
        /// Server-observed timestamp in ms since epoch.
        ts: i64,
    },
    /// A replacement resume token, issued mid-session.
    #[serde(rename = "token")]
    Token {
        /// The new resume token.
        token: String,
    },
    /// Heartbeat ping or pong.
    #[serde(rename = "hb")]
    Heartbeat,
    /// Mid-session operation failure.
    #[serde(rename = "error")]
    Error {
        /// Human-readable message.
        error: String,
        /// Machine-readable code.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Channel created.
    #[serde(rename = "ccOk")]
    ChannelCreated {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// Channel name.
        name: String,
        /// Invite code.
        #[serde(rename = "inviteCode")]
        invite_code: String,
    },
    /// Channel joined.
    #[serde(rename = "jcOk")]
    ChannelJoined {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// Channel name.
        name: String,
    },
    /// Full channel roster with live statuses.
    #[serde(rename = "cs")]
    ChannelSync {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// Channel name.
        name: String,
        /// Member roster.
        members: Vec<CompactUser>,
    },
    /// Status delta of a channel co-member.
    #[serde(rename = "cu")]
    ChannelUpdate {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// Username of the member.
        id: String,
        /// Changed status.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        s: Option<PresenceStatus>,
        /// Changed activity.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        a: Option<Activity>,
        /// Changed project.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        p: Option<String>,
        /// Changed language.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        l: Option<String>,
    },
    /// A member joined a channel.
    #[serde(rename = "cj")]
    MemberJoined {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// The new member's compact status.
        member: CompactUser,
    },
    /// A member left a channel.
    #[serde(rename = "cl")]
    MemberLeft {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// Username of the departed member.
        id: String,
    },
    /// Channel chat message.
    #[serde(rename = "cm")]
    ChannelChat {
        /// Channel id.
        #[serde(rename = "channelId")]
        channel_id: Uuid,
        /// Sender username (server-assigned).
        id: String,
        /// Message content.
        content: String,
        /// Server-assigned timestamp in ms since epoch.
        ts: i64,
    },
}

/// Serde helper distinguishing a missing field from an explicit null.
///
/// `None` means absent (skipped by `skip_serializing_if`), `Some(None)`
/// serializes as `null`, `Some(Some(v))` as the value.
mod double_option {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<T, S>(value: &Option<Option<T>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        T: Serialize,
        S: Serializer,
    {
        match value {
            Some(inner) => inner.serialize(serializer),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
    where
        T: Deserialize<'de>,
        D: Deserializer<'de>,
    {
        Option::<T>::deserialize(deserializer).map(Some)
    }
}
