//! Application configuration schemas.
//!
//! All configuration structs are deserialized from TOML files via the
//! `config` crate. Each sub-module represents a logical configuration
//! section. Environment variables prefixed with `DEVPULSE__` override
//! file values, so a bare deployment needs nothing more than
//! `DEVPULSE__SERVER__PORT`, `DEVPULSE__DATABASE__URL`, and
//! `DEVPULSE__CACHE__URL`.

pub mod cache;
pub mod database;
pub mod identity;
pub mod logging;
pub mod realtime;
pub mod server;

use serde::{Deserialize, Serialize};

pub use self::cache::{CacheConfig, MemoryCacheConfig};
pub use self::database::DatabaseConfig;
pub use self::identity::IdentityConfig;
pub use self::logging::LoggingConfig;
pub use self::realtime::RealtimeConfig;
pub use self::server::ServerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// This struct is the top-level deserialization target for the merged
/// TOML configuration files (default.toml + environment overlay).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server listener settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// State-store connection settings.
    pub database: DatabaseConfig,
    /// Ephemeral-broker settings.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Identity-provider adapter settings.
    #[serde(default)]
    pub identity: IdentityConfig,
    /// Presence engine settings.
    #[serde(default)]
    pub realtime: RealtimeConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from TOML files.
    ///
    /// Merges the default configuration with an environment-specific overlay
    /// and environment variables prefixed with `DEVPULSE_`.
    pub fn load(env: &str) -> Result<Self, AppError> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("DEVPULSE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))
    }
}
