//! HTTP routes for the live-chat relay.

use std::sync::Arc;

use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};

use super::state::AppState;
use super::ws::ws_handler;

/// Create the router with the health endpoint and the chat channel.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

/// Health check endpoint.
async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "axes-livechat",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
