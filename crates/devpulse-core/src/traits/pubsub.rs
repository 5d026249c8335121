//! Pub/sub provider trait for the topic substrate.
//!
//! Each process holds exactly one publisher handle and one subscriber
//! stream; the realtime engine reference-counts local subscriptions so
//! that `subscribe`/`unsubscribe` are only called on 0↔1 transitions
//! per topic.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::result::AppResult;

/// A message received from a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    /// Topic the message was published to.
    pub topic: String,
    /// JSON-encoded payload.
    pub payload: String,
}

/// Trait for topic pub/sub backends (Redis or in-memory loopback).
///
/// A single topic is totally ordered: every subscriber observes the
/// messages published to it in publish order.
#[async_trait]
pub trait PubSubProvider: Send + Sync + std::fmt::Debug + 'static {
    /// Publish a payload to a topic.
    async fn publish(&self, topic: &str, payload: &str) -> AppResult<()>;

    /// Subscribe the process-wide stream to a topic.
    async fn subscribe(&self, topic: &str) -> AppResult<()>;

    /// Unsubscribe the process-wide stream from a topic.
    async fn unsubscribe(&self, topic: &str) -> AppResult<()>;

    /// Take the process-wide message stream.
    ///
    /// May be called once per provider; subsequent calls fail.
    async fn take_messages(&self) -> AppResult<mpsc::Receiver<TopicMessage>>;
}
