//! Redis pub/sub implementation of the topic substrate.
//!
//! One pub/sub connection per process. The sink half handles
//! subscribe/unsubscribe commands; a background task forwards the
//! stream half into the process-wide message channel.

use futures::StreamExt;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, warn};

use async_trait::async_trait;

use devpulse_core::error::{AppError, ErrorKind};
use devpulse_core::result::AppResult;
use devpulse_core::traits::pubsub::{PubSubProvider, TopicMessage};

use super::client::RedisClient;

/// Redis-backed pub/sub provider.
pub struct RedisPubSubProvider {
    client: RedisClient,
    sink: Mutex<::redis::aio::PubSubSink>,
    messages: Mutex<Option<mpsc::Receiver<TopicMessage>>>,
}

impl std::fmt::Debug for RedisPubSubProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPubSubProvider")
            .field("client", &self.client)
            .finish()
    }
}

impl RedisPubSubProvider {
    /// Open the process-wide pub/sub connection and start the
    /// stream-forwarding task.
    pub async fn connect(client: RedisClient, buffer: usize) -> AppResult<Self> {
        let pubsub = client
            .client()
            .get_async_pubsub()
            .await
            .map_err(|e| {
                AppError::with_source(ErrorKind::Cache, "Failed to open Redis pub/sub", e)
            })?;

        let (sink, mut stream) = pubsub.split();
        let (tx, rx) = mpsc::channel(buffer);
        let prefix = client.prefix().to_string();

        tokio::spawn(async move {
            while let Some(msg) = stream.next().await {
                let topic: String = msg.get_channel_name().to_string();
                let payload: String = match msg.get_payload() {
                    Ok(p) => p,
                    Err(e) => {
                        warn!(topic = %topic, error = %e, "Dropping non-text pub/sub payload");
                        continue;
                    }
                };
                let topic = topic
                    .strip_prefix(&prefix)
                    .map(str::to_string)
                    .unwrap_or(topic);
                if tx.send(TopicMessage { topic, payload }).await.is_err() {
                    debug!("Pub/sub consumer dropped, stopping forwarder");
                    break;
                }
            }
        });

        Ok(Self {
            client,
            sink: Mutex::new(sink),
            messages: Mutex::new(Some(rx)),
        })
    }
}

#[async_trait]
impl PubSubProvider for RedisPubSubProvider {
    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()> {
        let mut conn = self.client.conn_mut();
        ::redis::cmd("PUBLISH")
            .arg(self.client.prefixed_key(topic))
            .arg(payload)
            .query_async::<i64>(&mut conn)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis PUBLISH failed", e))?;
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> AppResult<()> {
        let mut sink = self.sink.lock().await;
        sink.subscribe(self.client.prefixed_key(topic))
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis SUBSCRIBE failed", e))
    }

    async fn unsubscribe(&self, topic: &str) -> AppResult<()> {
        let mut sink = self.sink.lock().await;
        sink.unsubscribe(self.client.prefixed_key(topic))
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Cache, "Redis UNSUBSCRIBE failed", e))
    }

    async fn take_messages(&self) -> AppResult<mpsc::Receiver<TopicMessage>> {
        self.messages
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::cache("Pub/sub message stream already taken"))
    }
}
