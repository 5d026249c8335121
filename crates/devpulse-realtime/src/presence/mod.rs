//! Status updates, deltas, aggregation, and custom-status expiry.

pub mod aggregate;
pub mod engine;
pub mod expiry;

pub use aggregate::{AggregateView, aggregate_windows};
pub use engine::PresenceEngine;
pub use expiry::ExpiryQueue;
