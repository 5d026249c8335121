//! Topic → connection fan-out table with reference-counted physical
//! broker subscriptions.
//!
//! The broker-level subscription list stays minimal: the physical
//! subscribe happens only on the 0→1 transition of a topic's local
//! subscriber count, the physical unsubscribe only on 1→0. Map guards
//! are never held across the broker await.

use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use devpulse_core::AppResult;
use devpulse_core::traits::pubsub::PubSubProvider;

use crate::connection::handle::ConnectionId;

use super::tracker::SubscriptionTracker;

/// Registry of local topic subscriptions.
#[derive(Debug)]
pub struct SubscriptionRegistry {
    /// Topic name → subscribed connections.
    topics: DashMap<String, HashSet<ConnectionId>>,
    /// Reverse index.
    tracker: SubscriptionTracker,
    /// The process-wide broker handle.
    broker: Arc<dyn PubSubProvider>,
}

impl SubscriptionRegistry {
    /// Creates a new registry over the given broker.
    pub fn new(broker: Arc<dyn PubSubProvider>) -> Self {
        Self {
            topics: DashMap::new(),
            tracker: SubscriptionTracker::new(),
            broker,
        }
    }

    /// Subscribes a connection to a topic.
    pub async fn subscribe(&self, topic: &str, conn_id: ConnectionId) -> AppResult<()> {
        let first = {
            let mut entry = self.topics.entry(topic.to_string()).or_default();
            let was_empty = entry.is_empty();
            entry.insert(conn_id);
            was_empty
        };
        self.tracker.add(conn_id, topic.to_string());

        if first {
            self.broker.subscribe(topic).await?;
            debug!(topic = %topic, "Broker subscription opened");
        }
        Ok(())
    }

    /// Unsubscribes a connection from a topic.
    pub async fn unsubscribe(&self, topic: &str, conn_id: ConnectionId) -> AppResult<()> {
        self.tracker.remove(conn_id, topic);
        let last = self.detach(topic, &conn_id);
        if last {
            self.broker.unsubscribe(topic).await?;
            debug!(topic = %topic, "Broker subscription closed");
        }
        Ok(())
    }

    /// Unsubscribes a connection from every topic it holds.
    pub async fn unsubscribe_all(&self, conn_id: ConnectionId) -> AppResult<()> {
        let topics = self.tracker.remove_all(conn_id);
        for topic in topics {
            if self.detach(&topic, &conn_id) {
                self.broker.unsubscribe(&topic).await?;
                debug!(topic = %topic, "Broker subscription closed");
            }
        }
        Ok(())
    }

    /// Returns the local subscribers of a topic.
    pub fn subscribers(&self, topic: &str) -> Vec<ConnectionId> {
        self.topics
            .get(topic)
            .map(|entry| entry.value().iter().copied().collect())
            .unwrap_or_default()
    }

    /// Returns the number of topics with at least one local subscriber.
    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    /// Removes a connection from a topic entry; returns `true` on the
    /// 1→0 transition.
    fn detach(&self, topic: &str, conn_id: &ConnectionId) -> bool {
        let mut last = false;
        if let Some(mut entry) = self.topics.get_mut(topic) {
            entry.remove(conn_id);
            last = entry.is_empty();
        }
        if last {
            self.topics.remove(topic);
        }
        last
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio::sync::mpsc;

    use devpulse_core::AppError;
    use devpulse_core::traits::pubsub::TopicMessage;

    use super::*;

    /// Records physical subscribe/unsubscribe calls.
    #[derive(Debug, Default)]
    struct RecordingBroker {
        log: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PubSubProvider for RecordingBroker {
        async fn publish(&self, _topic: &str, _payload: &str) -> AppResult<()> {
            Ok(())
        }

        async fn subscribe(&self, topic: &str) -> AppResult<()> {
            self.log.lock().unwrap().push(format!("+{topic}"));
            Ok(())
        }

        async fn unsubscribe(&self, topic: &str) -> AppResult<()> {
            self.log.lock().unwrap().push(format!("-{topic}"));
            Ok(())
        }

        async fn take_messages(&self) -> AppResult<mpsc::Receiver<TopicMessage>> {
            Err(AppError::cache("not used"))
        }
    }

    #[tokio::test]
    async fn test_physical_subscribe_only_on_zero_to_one() {
        let broker = Arc::new(RecordingBroker::default());
        let registry = SubscriptionRegistry::new(broker.clone());

        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();

        registry.subscribe("presence:alice", c1).await.unwrap();
        registry.subscribe("presence:alice", c2).await.unwrap();
        assert_eq!(broker.log.lock().unwrap().as_slice(), ["+presence:alice"]);

        registry.unsubscribe("presence:alice", c1).await.unwrap();
        assert_eq!(broker.log.lock().unwrap().as_slice(), ["+presence:alice"]);

        registry.unsubscribe("presence:alice", c2).await.unwrap();
        assert_eq!(
            broker.log.lock().unwrap().as_slice(),
            ["+presence:alice", "-presence:alice"]
        );
    }

    #[tokio::test]
    async fn test_unsubscribe_all_cleans_every_topic() {
        let broker = Arc::new(RecordingBroker::default());
        let registry = SubscriptionRegistry::new(broker.clone());

        let c1 = ConnectionId::new();
        let c2 = ConnectionId::new();
        registry.subscribe("presence:alice", c1).await.unwrap();
        registry.subscribe("presence:bob", c1).await.unwrap();
        registry.subscribe("presence:bob", c2).await.unwrap();

        registry.unsubscribe_all(c1).await.unwrap();

        // alice had only c1, so it closed; bob still has c2.
        assert!(registry.subscribers("presence:alice").is_empty());
        assert_eq!(registry.subscribers("presence:bob"), vec![c2]);
        let log = broker.log.lock().unwrap();
        assert!(log.contains(&"-presence:alice".to_string()));
        assert!(!log.contains(&"-presence:bob".to_string()));
    }
}
