//! Presence engine configuration.

use serde::{Deserialize, Serialize};

/// Presence engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Liveness sweep interval in seconds.
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_seconds: u64,
    /// Seconds without an activity report before a window goes Away.
    #[serde(default = "default_away_after")]
    pub away_after_seconds: u64,
    /// Resume-record TTL in seconds.
    #[serde(default = "default_resume_ttl")]
    pub resume_ttl_seconds: u64,
    /// Grace period before a last-window disconnect becomes an offline
    /// event; a resume within it masks the transport loss entirely.
    #[serde(default = "default_offline_grace")]
    pub offline_grace_seconds: u64,
    /// Status-cache TTL in seconds.
    #[serde(default = "default_status_cache_ttl")]
    pub status_cache_ttl_seconds: u64,
    /// Target-visibility read-through cache TTL in seconds.
    #[serde(default = "default_visibility_ttl")]
    pub visibility_cache_ttl_seconds: u64,
    /// Maximum distinct members per channel.
    #[serde(default = "default_channel_member_limit")]
    pub channel_member_limit: u64,
    /// Per-connection outbound buffer size.
    #[serde(default = "default_outbound_buffer")]
    pub outbound_buffer_size: usize,
    /// Custom-status text limit in code points.
    #[serde(default = "default_custom_status_max")]
    pub custom_status_max_chars: usize,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_seconds: default_heartbeat_interval(),
            away_after_seconds: default_away_after(),
            resume_ttl_seconds: default_resume_ttl(),
            offline_grace_seconds: default_offline_grace(),
            status_cache_ttl_seconds: default_status_cache_ttl(),
            visibility_cache_ttl_seconds: default_visibility_ttl(),
            channel_member_limit: default_channel_member_limit(),
            outbound_buffer_size: default_outbound_buffer(),
            custom_status_max_chars: default_custom_status_max(),
        }
    }
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_away_after() -> u64 {
    300
}

fn default_resume_ttl() -> u64 {
    60
}

fn default_offline_grace() -> u64 {
    60
}

fn default_status_cache_ttl() -> u64 {
    3600
}

fn default_visibility_ttl() -> u64 {
    30
}

fn default_channel_member_limit() -> u64 {
    50
}

fn default_outbound_buffer() -> usize {
    256
}

fn default_custom_status_max() -> usize {
    128
}
