//! Application builder — wires providers, engine, router, and server.

use std::sync::Arc;

use axum::Router;
use tower_http::trace::TraceLayer;
use tracing::info;

use devpulse_cache::BrokerManager;
use devpulse_core::config::AppConfig;
use devpulse_core::error::AppError;
use devpulse_database::DatabasePool;
use devpulse_realtime::RealtimeEngine;
use devpulse_realtime::identity::GitHubIdentityProvider;

use crate::router::build_router;
use crate::state::AppState;

/// Builds the complete Axum application.
pub fn build_app(state: AppState) -> Router {
    build_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Builds the engine and serves until shutdown.
pub async fn run_server(config: AppConfig, db: DatabasePool) -> Result<(), AppError> {
    let broker = BrokerManager::new(&config.cache).await?;

    let users = Arc::new(db.users());
    let channels = Arc::new(db.channels());
    let identity = Arc::new(GitHubIdentityProvider::new(&config.identity)?);

    let engine = RealtimeEngine::new(
        config.realtime.clone(),
        &broker,
        users,
        channels,
        identity,
    );
    engine.clone().start().await?;

    let state = AppState {
        config: Arc::new(config.clone()),
        db,
        broker,
        engine: engine.clone(),
    };

    let app = build_app(state);
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::internal(format!("Failed to bind {addr}: {e}")))?;

    info!(addr = %addr, "devpulse server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| AppError::internal(format!("Server error: {e}")))?;

    engine.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");
}
