//! Presence fan-out engine for devpulse.
//!
//! Provides:
//! - WebSocket session lifecycle with token/guest/resume login
//! - Per-user pub/sub topics with O(K) fan-out over the friend set
//! - Delta-encoded status updates with multi-window aggregation
//! - Group channels (create, invite-join, chat) on the same substrate
//! - Server-side privacy filtering and share-preference redaction
//! - Heartbeat liveness, away transitions, custom-status expiry

pub mod channel;
pub mod connection;
pub mod identity;
pub mod liveness;
pub mod message;
pub mod presence;
pub mod privacy;
pub mod server;
pub mod session;
pub mod subscription;

pub use server::RealtimeEngine;
