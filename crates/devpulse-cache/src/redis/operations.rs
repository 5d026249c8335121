//! Redis implementation of the cache provider trait.

use std::time::Duration;

use async_trait::async_trait;

use devpulse_core::error::{AppError, ErrorKind};
use devpulse_core::result::AppResult;
use devpulse_core::traits::cache::CacheProvider;

use super::client::RedisClient;

/// Redis-backed cache provider.
#[derive(Debug, Clone)]
pub struct RedisCacheProvider {
    client: RedisClient,
}

impl RedisCacheProvider {
    /// Create a new Redis cache provider.
    pub fn new(client: RedisClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CacheProvider for RedisCacheProvider {
    async fn get(&self, key: &str) -> AppResult<Option<String>> {
        let mut conn = self.client.conn_mut();
        ::redis::cmd("GET")
            .arg(self.client.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis GET failed", e))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        ::redis::cmd("SET")
            .arg(self.client.prefixed_key(key))
            .arg(value)
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async::<()>(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis SET failed", e))
    }

    async fn delete(&self, key: &str) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let removed: i64 = ::redis::cmd("DEL")
            .arg(self.client.prefixed_key(key))
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis DEL failed", e))?;
        Ok(removed > 0)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let updated: i64 = ::redis::cmd("PEXPIRE")
            .arg(self.client.prefixed_key(key))
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis PEXPIRE failed", e))?;
        Ok(updated > 0)
    }

    async fn health_check(&self) -> AppResult<bool> {
        let mut conn = self.client.conn_mut();
        let pong: String = ::redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis PING failed", e))?;
        Ok(pong == "PONG")
    }
}
