//! Broker manager that selects and wires the configured provider pair.

use std::sync::Arc;

use tracing::info;

use devpulse_core::config::CacheConfig;
use devpulse_core::error::AppError;
use devpulse_core::result::AppResult;
use devpulse_core::traits::cache::CacheProvider;
use devpulse_core::traits::pubsub::PubSubProvider;

use crate::memory::{MemoryCacheProvider, MemoryPubSubProvider};
use crate::redis::{RedisCacheProvider, RedisClient, RedisPubSubProvider};

/// The broker: one key/value provider and one pub/sub provider,
/// selected together at construction time based on configuration.
#[derive(Debug, Clone)]
pub struct BrokerManager {
    cache: Arc<dyn CacheProvider>,
    pubsub: Arc<dyn PubSubProvider>,
}

impl BrokerManager {
    /// Create a broker manager from configuration.
    pub async fn new(config: &CacheConfig) -> AppResult<Self> {
        match config.provider.as_str() {
            "redis" => {
                info!("Initializing Redis broker provider");
                let client = RedisClient::connect(config).await?;
                let pubsub =
                    RedisPubSubProvider::connect(client.clone(), config.memory.pubsub_buffer)
                        .await?;
                Ok(Self {
                    cache: Arc::new(RedisCacheProvider::new(client)),
                    pubsub: Arc::new(pubsub),
                })
            }
            "memory" => {
                info!("Initializing in-memory broker provider");
                Ok(Self {
                    cache: Arc::new(MemoryCacheProvider::new(&config.memory)),
                    pubsub: Arc::new(MemoryPubSubProvider::new(config.memory.pubsub_buffer)),
                })
            }
            other => Err(AppError::configuration(format!(
                "Unknown broker provider: '{other}'. Supported: memory, redis"
            ))),
        }
    }

    /// Create a broker manager from existing providers (for testing).
    pub fn from_providers(
        cache: Arc<dyn CacheProvider>,
        pubsub: Arc<dyn PubSubProvider>,
    ) -> Self {
        Self { cache, pubsub }
    }

    /// The key/value provider.
    pub fn cache(&self) -> Arc<dyn CacheProvider> {
        self.cache.clone()
    }

    /// The pub/sub provider.
    pub fn pubsub(&self) -> Arc<dyn PubSubProvider> {
        self.pubsub.clone()
    }
}
