//! Loopback pub/sub for single-node deployments.
//!
//! Publishes to a topic are forwarded into the process-wide stream iff
//! the process is subscribed to that topic, matching the visible
//! behavior of the Redis provider on a single node.

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::{Mutex, mpsc};

use devpulse_core::error::AppError;
use devpulse_core::result::AppResult;
use devpulse_core::traits::pubsub::{PubSubProvider, TopicMessage};

/// In-memory pub/sub provider.
#[derive(Debug)]
pub struct MemoryPubSubProvider {
    subscribed: DashMap<String, ()>,
    tx: mpsc::Sender<TopicMessage>,
    messages: Mutex<Option<mpsc::Receiver<TopicMessage>>>,
}

impl MemoryPubSubProvider {
    /// Create a new loopback pub/sub with the given buffer size.
    pub fn new(buffer: usize) -> Self {
        let (tx, rx) = mpsc::channel(buffer);
        Self {
            subscribed: DashMap::new(),
            tx,
            messages: Mutex::new(Some(rx)),
        }
    }
}

#[async_trait]
impl PubSubProvider for MemoryPubSubProvider {
    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()> {
        if self.subscribed.contains_key(topic) {
            // A dropped consumer is not an error: pending publishes for
            // a closed engine are simply discarded.
            let _ = self
                .tx
                .send(TopicMessage {
                    topic: topic.to_string(),
                    payload: payload.to_string(),
                })
                .await;
        }
        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> AppResult<()> {
        self.subscribed.insert(topic.to_string(), ());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> AppResult<()> {
        self.subscribed.remove(topic);
        Ok(())
    }

    async fn take_messages(&self) -> AppResult<mpsc::Receiver<TopicMessage>> {
        self.messages
            .lock()
            .await
            .take()
            .ok_or_else(|| AppError::cache("Pub/sub message stream already taken"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribed_topic() {
        let pubsub = MemoryPubSubProvider::new(16);
        let mut rx = pubsub.take_messages().await.unwrap();

        pubsub.subscribe("presence:alice").await.unwrap();
        pubsub.publish("presence:alice", "{}").await.unwrap();

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.topic, "presence:alice");
        assert_eq!(msg.payload, "{}");
    }

    #[tokio::test]
    async fn test_unsubscribed_topic_is_silent() {
        let pubsub = MemoryPubSubProvider::new(16);
        let mut rx = pubsub.take_messages().await.unwrap();

        pubsub.publish("presence:bob", "{}").await.unwrap();
        pubsub.subscribe("presence:alice").await.unwrap();
        pubsub.unsubscribe("presence:alice").await.unwrap();
        pubsub.publish("presence:alice", "{}").await.unwrap();

        // Nothing should have been forwarded.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stream_taken_once() {
        let pubsub = MemoryPubSubProvider::new(16);
        let _rx = pubsub.take_messages().await.unwrap();
        assert!(pubsub.take_messages().await.is_err());
    }

    #[tokio::test]
    async fn test_publish_order_preserved() {
        let pubsub = MemoryPubSubProvider::new(16);
        let mut rx = pubsub.take_messages().await.unwrap();
        pubsub.subscribe("channel:x").await.unwrap();

        for i in 0..5 {
            pubsub
                .publish("channel:x", &format!("m{i}"))
                .await
                .unwrap();
        }
        for i in 0..5 {
            assert_eq!(rx.recv().await.unwrap().payload, format!("m{i}"));
        }
    }
}
