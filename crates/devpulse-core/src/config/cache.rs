//! Ephemeral-broker (cache + pub/sub) configuration.

use serde::{Deserialize, Serialize};

/// Broker provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Provider selection: `"redis"` or `"memory"`.
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Redis connection URL (ignored for the memory provider).
    #[serde(default = "default_url")]
    pub url: String,
    /// Prefix applied to every key and topic.
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
    /// In-memory provider settings.
    #[serde(default)]
    pub memory: MemoryCacheConfig,
}

/// In-memory provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryCacheConfig {
    /// Maximum number of cached entries.
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    /// Loopback pub/sub buffer size.
    #[serde(default = "default_pubsub_buffer")]
    pub pubsub_buffer: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            url: default_url(),
            key_prefix: default_key_prefix(),
            memory: MemoryCacheConfig::default(),
        }
    }
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_capacity: default_max_capacity(),
            pubsub_buffer: default_pubsub_buffer(),
        }
    }
}

fn default_provider() -> String {
    "redis".to_string()
}

fn default_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_key_prefix() -> String {
    "devpulse:".to_string()
}

fn default_max_capacity() -> u64 {
    100_000
}

fn default_pubsub_buffer() -> usize {
    1024
}
