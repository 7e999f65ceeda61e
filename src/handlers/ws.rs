use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use futures::{sink::SinkExt, stream::StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::middleware::identity::USER_ID_HEADER;
use crate::services::ConnectionRegistry;
use crate::AppState;

const HEARTBEAT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    user_id: Option<Uuid>,
}

/// Browsers cannot set headers on a WebSocket handshake, so the user id may also come as a query parameter.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    Query(params): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let from_header = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| Uuid::parse_str(value.trim()).ok());

    let Some(user_id) = from_header.or(params.user_id) else {
        tracing::warn!("WebSocket connection without a user id");
        return StatusCode::UNAUTHORIZED.into_response();
    };

    let registry = state.registry.clone();
    ws.on_upgrade(move |socket| handle_socket(socket, registry, user_id))
}

async fn handle_socket(socket: WebSocket, registry: Arc<ConnectionRegistry>, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (connection_id, mut outbox) = registry.register(user_id);
    tracing::info!(%user_id, %connection_id, "WebSocket connected");

    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    tracing::debug!(%user_id, len = text.len(), "Ignoring client message");
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(tokio::time::Duration::from_secs(HEARTBEAT_SECS));

        loop {
            tokio::select! {
                _ = heartbeat.tick() => {
                    if sender.send(Message::Ping(vec![])).await.is_err() {
                        break;
                    }
                }
                message = outbox.recv() => {
                    let Some(message) = message else {
                        break;
                    };
                    if sender.send(Message::Text(message)).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    registry.unregister(user_id, connection_id);
    tracing::info!(%user_id, %connection_id, "WebSocket disconnected");
}
