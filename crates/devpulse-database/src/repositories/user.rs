//! User, preferences, and guest repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::Row;

use devpulse_core::error::{AppError, ErrorKind};
use devpulse_core::result::AppResult;
use devpulse_entity::preferences::{Preferences, PreferencesUpdate};
use devpulse_entity::store::UserStore;
use devpulse_entity::user::{IdentityProfile, User};

/// Repository for users, preferences, and guest registrations.
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: PgPool,
}

impl UserRepository {
    /// Create a new user repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for UserRepository {
    async fn upsert_user(&self, profile: &IdentityProfile) -> AppResult<User> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        // The namespaces are shared: an identity claim supersedes any
        // guest registration of the same name. Live guest holders are
        // rejected earlier, at the session layer.
        sqlx::query("DELETE FROM guest_users WHERE username = $1")
            .bind(&profile.username)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to release guest name", e)
            })?;

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (identity_id, username, avatar_url, followers, following)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identity_id) DO UPDATE SET
                username = EXCLUDED.username,
                avatar_url = EXCLUDED.avatar_url,
                followers = EXCLUDED.followers,
                following = EXCLUDED.following
            RETURNING *
            "#,
        )
        .bind(profile.identity_id)
        .bind(&profile.username)
        .bind(&profile.avatar_url)
        .bind(&profile.followers)
        .bind(&profile.following)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to upsert user", e))?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit user upsert", e)
        })?;

        Ok(user)
    }

    async fn find_by_identity(&self, identity_id: i64) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE identity_id = $1")
            .bind(identity_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find user by identity", e)
            })
    }

    async fn find_by_username(&self, username: &str) -> AppResult<Option<User>> {
        sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find user by username", e)
            })
    }

    async fn usernames_for(&self, identity_ids: &[i64]) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            "SELECT username FROM users WHERE identity_id = ANY($1)",
        )
        .bind(identity_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to resolve usernames", e))
    }

    async fn update_last_seen(&self, username: &str, last_seen_ms: i64) -> AppResult<()> {
        sqlx::query("UPDATE users SET last_seen_ms = $2 WHERE username = $1")
            .bind(username)
            .bind(last_seen_ms)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to update last-seen", e)
            })?;
        Ok(())
    }

    async fn preferences(&self, identity_id: i64) -> AppResult<Preferences> {
        let row = sqlx::query(
            r#"
            SELECT visibility, share_project_name, share_language, share_activity
            FROM preferences WHERE identity_id = $1
            "#,
        )
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to load preferences", e))?;

        match row {
            Some(row) => Ok(Preferences {
                visibility: row.get::<String, _>("visibility").parse()?,
                share_project_name: row.get("share_project_name"),
                share_language: row.get("share_language"),
                share_activity: row.get("share_activity"),
            }),
            None => Ok(Preferences::default()),
        }
    }

    async fn update_preferences(
        &self,
        identity_id: i64,
        update: &PreferencesUpdate,
    ) -> AppResult<Preferences> {
        let merged = self.preferences(identity_id).await?.merged(update);

        sqlx::query(
            r#"
            INSERT INTO preferences
                (identity_id, visibility, share_project_name, share_language, share_activity)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (identity_id) DO UPDATE SET
                visibility = EXCLUDED.visibility,
                share_project_name = EXCLUDED.share_project_name,
                share_language = EXCLUDED.share_language,
                share_activity = EXCLUDED.share_activity
            "#,
        )
        .bind(identity_id)
        .bind(merged.visibility.as_str())
        .bind(merged.share_project_name)
        .bind(merged.share_language)
        .bind(merged.share_activity)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update preferences", e)
        })?;

        Ok(merged)
    }

    async fn register_guest(&self, username: &str) -> AppResult<()> {
        let taken_by_user: Option<i64> =
            sqlx::query_scalar("SELECT identity_id FROM users WHERE username = $1")
                .bind(username)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to check username", e)
                })?;

        if taken_by_user.is_some() {
            return Err(AppError::auth_failure(format!(
                "Username '{username}' is already registered"
            )));
        }

        sqlx::query(
            "INSERT INTO guest_users (username) VALUES ($1) ON CONFLICT (username) DO NOTHING",
        )
        .bind(username)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to register guest", e))?;

        Ok(())
    }
}
