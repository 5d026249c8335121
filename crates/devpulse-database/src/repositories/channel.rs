//! Channel and membership repository implementation.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use devpulse_core::error::{AppError, ErrorKind};
use devpulse_core::result::AppResult;
use devpulse_entity::channel::{Channel, ChannelMember, ChannelRole};
use devpulse_entity::store::ChannelStore;

/// Repository for channels and channel memberships.
#[derive(Debug, Clone)]
pub struct ChannelRepository {
    pool: PgPool,
}

impl ChannelRepository {
    /// Create a new channel repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// True when the sqlx error is a unique-constraint violation.
fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505")
    )
}

#[async_trait]
impl ChannelStore for ChannelRepository {
    async fn create_channel(
        &self,
        name: &str,
        owner_identity_id: i64,
        owner_username: &str,
        invite_code: &str,
    ) -> AppResult<Channel> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to begin transaction", e)
        })?;

        let channel = sqlx::query_as::<_, Channel>(
            r#"
            INSERT INTO channels (id, name, owner_identity_id, invite_code)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(owner_identity_id)
        .bind(invite_code)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                AppError::conflict(format!("Invite code '{invite_code}' already in use"))
            } else {
                AppError::with_source(ErrorKind::Database, "Failed to create channel", e)
            }
        })?;

        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, identity_id, username, role)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(channel.id)
        .bind(owner_identity_id)
        .bind(owner_username)
        .bind(ChannelRole::Admin.as_str())
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to insert owner membership", e)
        })?;

        tx.commit().await.map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to commit channel creation", e)
        })?;

        Ok(channel)
    }

    async fn find_by_invite(&self, invite_code: &str) -> AppResult<Option<Channel>> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE invite_code = $1")
            .bind(invite_code)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find channel by invite", e)
            })
    }

    async fn find_by_id(&self, channel_id: Uuid) -> AppResult<Option<Channel>> {
        sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
            .bind(channel_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Database, "Failed to find channel by id", e)
            })
    }

    async fn members(&self, channel_id: Uuid) -> AppResult<Vec<ChannelMember>> {
        sqlx::query_as::<_, ChannelMember>(
            "SELECT * FROM channel_members WHERE channel_id = $1 ORDER BY joined_at",
        )
        .bind(channel_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list members", e))
    }

    async fn member_count(&self, channel_id: Uuid) -> AppResult<u64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM channel_members WHERE channel_id = $1")
                .bind(channel_id)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to count members", e)
                })?;
        Ok(count as u64)
    }

    async fn is_member(&self, channel_id: Uuid, identity_id: i64) -> AppResult<bool> {
        let found: Option<i64> = sqlx::query_scalar(
            "SELECT 1 FROM channel_members WHERE channel_id = $1 AND identity_id = $2",
        )
        .bind(channel_id)
        .bind(identity_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to check membership", e))?;
        Ok(found.is_some())
    }

    async fn add_member(
        &self,
        channel_id: Uuid,
        identity_id: i64,
        username: &str,
        role: ChannelRole,
    ) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO channel_members (channel_id, identity_id, username, role)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (channel_id, identity_id) DO NOTHING
            "#,
        )
        .bind(channel_id)
        .bind(identity_id)
        .bind(username)
        .bind(role.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to add member", e))?;
        Ok(())
    }

    async fn remove_member(&self, channel_id: Uuid, identity_id: i64) -> AppResult<bool> {
        let result = sqlx::query(
            "DELETE FROM channel_members WHERE channel_id = $1 AND identity_id = $2",
        )
        .bind(channel_id)
        .bind(identity_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to remove member", e))?;
        Ok(result.rows_affected() > 0)
    }

    async fn channels_for(&self, identity_id: i64) -> AppResult<Vec<Channel>> {
        sqlx::query_as::<_, Channel>(
            r#"
            SELECT c.* FROM channels c
            JOIN channel_members m ON m.channel_id = c.id
            WHERE m.identity_id = $1
            ORDER BY c.created_at
            "#,
        )
        .bind(identity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list channels", e))
    }
}
