//! Provider traits shared across crates.

pub mod cache;
pub mod pubsub;

pub use cache::{CacheJsonExt, CacheProvider};
pub use pubsub::{PubSubProvider, TopicMessage};
