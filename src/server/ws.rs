//! WebSocket connection handling for the `/ws` channel.
//!
//! Each upgraded socket gets one receive loop and one writer task. The
//! writer drains the registry channel into the socket sink; the receive loop
//! feeds text frames to the relay handler. An abrupt disconnect is not an
//! error: the connection is silently unregistered and any broadcast still in
//! flight simply skips it.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::state::AppState;

/// Upgrade an HTTP request into a chat connection.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Drive one connection until it closes.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let connection = state.registry.register(tx);

    let writer = tokio::spawn(async move {
        while let Some(payload) = rx.recv().await {
            if sink.send(Message::Text(payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Admin badges start out accurate without waiting for a mutation.
    if let Err(err) = state.relay.push_unread_count(connection).await {
        tracing::warn!(connection = %connection, error = %err, "initial unread push failed");
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(raw)) => state.relay.dispatch(connection, raw.as_str()).await,
            Ok(Message::Close(_)) | Err(_) => break,
            // Pings are answered by axum; binary frames are not part of the
            // protocol and are ignored.
            Ok(_) => {}
        }
    }

    state.registry.unregister(connection);
    writer.abort();
    tracing::debug!(connection = %connection, "connection closed");
}
