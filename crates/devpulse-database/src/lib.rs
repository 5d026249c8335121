//! PostgreSQL state store for devpulse.
//!
//! Owns users, preferences, guest registrations, channels, and channel
//! memberships. The repositories implement the store traits from
//! `devpulse-entity` so the realtime engine never sees sqlx directly;
//! connecting the pool also migrates the schema.

pub mod connection;
pub mod repositories;

pub use connection::DatabasePool;
