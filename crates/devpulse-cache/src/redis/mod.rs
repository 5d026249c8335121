//! Redis-backed broker provider.

pub mod client;
pub mod operations;
pub mod pubsub;

pub use client::RedisClient;
pub use operations::RedisCacheProvider;
pub use pubsub::RedisPubSubProvider;
