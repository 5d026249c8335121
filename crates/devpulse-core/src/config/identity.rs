//! Identity-provider adapter configuration.

use serde::{Deserialize, Serialize};

/// GitHub identity adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Base URL of the identity API.
    #[serde(default = "default_api_base")]
    pub api_base: String,
    /// Per-request timeout in seconds; exceeding it fails the login attempt.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// User-Agent header sent with API requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            request_timeout_seconds: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_api_base() -> String {
    "https://api.github.com".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    "devpulse-server".to_string()
}
