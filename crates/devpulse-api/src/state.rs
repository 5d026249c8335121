//! Application state shared across all handlers.

use std::sync::Arc;

use devpulse_cache::BrokerManager;
use devpulse_core::config::AppConfig;
use devpulse_database::DatabasePool;
use devpulse_realtime::RealtimeEngine;

/// Application state containing all shared dependencies.
///
/// Passed to every Axum handler via `State<AppState>`. All fields are
/// cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// State-store pool (health checks).
    pub db: DatabasePool,
    /// Ephemeral broker (health checks).
    pub broker: BrokerManager,
    /// The realtime engine.
    pub engine: Arc<RealtimeEngine>,
}
