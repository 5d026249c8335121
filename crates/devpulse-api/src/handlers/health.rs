//! Health endpoint reporting downstream reachability.

use axum::Json;
use axum::extract::State;

use devpulse_core::traits::cache::CacheProvider;

use crate::state::AppState;

/// GET /api/health — database and broker reachability.
pub async fn health_check(State(state): State<AppState>) -> Json<serde_json::Value> {
    let database = state.db.ping().await.is_ok();
    let cache = state
        .broker
        .cache()
        .health_check()
        .await
        .unwrap_or(false);

    Json(serde_json::json!({
        "status": if database && cache { "ok" } else { "degraded" },
        "database": database,
        "cache": cache,
        "connections": state.engine.pool.connection_count(),
        "online_users": state.engine.pool.online_user_count(),
    }))
}
