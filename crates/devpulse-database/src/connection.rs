//! State-store access: pool construction, schema migration, and
//! repository hand-out.

use std::time::Duration;

use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::info;

use devpulse_core::config::DatabaseConfig;
use devpulse_core::error::{AppError, ErrorKind};
use devpulse_core::result::AppResult;

use crate::repositories::{ChannelRepository, UserRepository};

/// Handle to the devpulse state store.
///
/// Connecting also applies any pending schema migrations, so a pool
/// that exists is always ready for the repositories it hands out.
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// Open the pool and bring the schema up to date.
    pub async fn connect(config: &DatabaseConfig) -> AppResult<Self> {
        info!(
            url = %redact_url(&config.url),
            max_connections = config.max_connections,
            "Opening state-store pool"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_seconds))
            .idle_timeout(Duration::from_secs(config.idle_timeout_seconds))
            .connect(&config.url)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "State store unreachable", e)
            })?;

        let migrations = sqlx::migrate!("../../migrations");
        let applied = migrations.migrations.len();
        migrations.run(&pool).await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Schema migration failed", e)
        })?;

        info!(migrations = applied, "State store ready");
        Ok(Self { pool })
    }

    /// The raw sqlx pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// User, preferences, and guest repository over this pool.
    pub fn users(&self) -> UserRepository {
        UserRepository::new(self.pool.clone())
    }

    /// Channel and membership repository over this pool.
    pub fn channels(&self) -> ChannelRepository {
        ChannelRepository::new(self.pool.clone())
    }

    /// Round-trip a trivial query to confirm the store is reachable.
    pub async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "State store ping failed", e)
            })?;
        Ok(())
    }
}

/// Strip credentials from a connection URL before it reaches the logs.
///
/// URLs without a password component pass through untouched.
fn redact_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let rest = &url[scheme_end + 3..];
    let Some(at) = rest.find('@') else {
        return url.to_string();
    };
    let userinfo = &rest[..at];
    let Some(user) = userinfo.split(':').next().filter(|_| userinfo.contains(':')) else {
        return url.to_string();
    };
    format!("{}://{user}:****@{}", &url[..scheme_end], &rest[at + 1..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redact_url_masks_password() {
        assert_eq!(
            redact_url("postgres://svc:hunter2@db:5432/devpulse"),
            "postgres://svc:****@db:5432/devpulse"
        );
    }

    #[test]
    fn test_redact_url_passes_credential_free_urls() {
        assert_eq!(
            redact_url("postgres://db:5432/devpulse"),
            "postgres://db:5432/devpulse"
        );
        assert_eq!(
            redact_url("postgres://svc@db:5432/devpulse"),
            "postgres://svc@db:5432/devpulse"
        );
    }
}
