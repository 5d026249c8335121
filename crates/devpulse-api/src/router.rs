//! Route table.

use axum::Router;
use axum::routing::get;

use crate::handlers::{health, ws};
use crate::state::AppState;

/// Builds the route table.
pub fn build_router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/api/health", get(health::health_check))
}
