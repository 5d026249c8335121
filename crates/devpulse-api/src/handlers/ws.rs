//! WebSocket upgrade handler.
//!
//! The upgrade is unauthenticated: login happens in-band as the first
//! frame, handled by the session manager.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tracing::{info, warn};

use crate::state::AppState;

/// GET /ws — WebSocket upgrade.
pub async fn ws_handler(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| handle_ws_connection(state, socket))
}

/// Handles an established WebSocket connection.
async fn handle_ws_connection(state: AppState, socket: WebSocket) {
    let (handle, mut outbound_rx) = state.engine.register_transport();
    let conn_id = handle.id;
    let closer = handle.closed();

    let (mut ws_tx, mut ws_rx) = socket.split();

    // Outbound forwarder: engine frames → socket. A server-side close
    // (liveness failure, shutdown) cancels the token and sends Close.
    let outbound_task = tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = outbound_rx.recv() => match msg {
                    Some(text) => {
                        if ws_tx.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                },
                _ = closer.cancelled() => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    info!(conn_id = %conn_id, "WebSocket connection established");

    // Inbound loop: one frame processed to completion before the next,
    // so connection-local state needs no internal ordering.
    while let Some(result) = ws_rx.next().await {
        match result {
            Ok(Message::Text(text)) => {
                state.engine.handle_frame(&conn_id, &text).await;
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                if let Some(conn) = state.engine.pool.get(&conn_id) {
                    conn.touch_liveness();
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
        if outbound_task.is_finished() {
            break;
        }
    }

    state.engine.disconnect(&conn_id).await;
    outbound_task.abort();

    info!(conn_id = %conn_id, "WebSocket connection closed");
}
