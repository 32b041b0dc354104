//! Dispatch Bus WebSocket endpoint
//!
//! Every device keeps one socket open at `/bus?role=<table|mirror|admin>`.
//! Inbound text frames are JSON bus events handed to the hub; outbound frames
//! are every broadcast envelope except those the connection itself originated.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::Response,
};
use serde::Deserialize;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

use pran_common::api::token_matches;
use pran_common::events::Envelope;
use pran_common::BusEvent;

use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct BusQuery {
    pub role: Option<String>,
    /// Admin token; only needed for admin-only events such as `force_phase`
    pub token: Option<String>,
}

/// GET /bus (WebSocket upgrade)
pub async fn bus_socket(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(query): Query<BusQuery>,
) -> Response {
    let role = query.role.unwrap_or_else(|| "observer".to_string());
    let admin = query
        .token
        .as_deref()
        .map(|token| token_matches(token, &state.admin_digest))
        .unwrap_or(false);

    ws.on_upgrade(move |socket| handle_socket(socket, state, role, admin))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, role: String, admin: bool) {
    let connection = Uuid::new_v4();
    let mut rx = state.bus().subscribe();
    info!("Bus connection {} opened (role={}, admin={})", connection, role, admin);

    loop {
        tokio::select! {
            envelope = rx.recv() => {
                match envelope {
                    Ok(envelope) => {
                        let Some(text) = outbound_frame(connection, &envelope) else {
                            continue;
                        };
                        if socket.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Bus connection {} lagged, skipped {} events", connection, n);
                        // Resync with the authoritative snapshot
                        let resync = BusEvent::SessionState(state.hub.snapshot().await);
                        if let Ok(text) = serde_json::to_string(&resync) {
                            if socket.send(Message::Text(text)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }

            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Some(reply) = handle_frame(&state, connection, admin, &text).await else {
                            continue;
                        };
                        match serde_json::to_string(&reply) {
                            Ok(text) => {
                                if socket.send(Message::Text(text)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => warn!("Failed to encode reply: {}", e),
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Err(e)) => {
                        debug!("Bus connection {} error: {}", connection, e);
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("Bus connection {} closed (role={})", connection, role);
}

/// Serialize an envelope for one connection, skipping its own events
fn outbound_frame(connection: Uuid, envelope: &Envelope) -> Option<String> {
    if envelope.origin == Some(connection) {
        return None;
    }
    if matches!(envelope.event, BusEvent::ConnectionStatus { .. }) {
        return None;
    }

    match serde_json::to_string(&envelope.event) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("Failed to encode {}: {}", envelope.event.event_type(), e);
            None
        }
    }
}

async fn handle_frame(
    state: &AppState,
    connection: Uuid,
    admin: bool,
    text: &str,
) -> Option<BusEvent> {
    let event: BusEvent = match serde_json::from_str(text) {
        Ok(event) => event,
        Err(e) => {
            warn!("Unparseable frame from {}: {}", connection, e);
            return None;
        }
    };

    if event.is_admin_only() && !admin {
        warn!(
            "Rejected {} from non-admin connection {}",
            event.event_type(),
            connection
        );
        return None;
    }

    match state.hub.handle_event(connection, event).await {
        Ok(reply) => reply,
        Err(e) => {
            warn!("Bus event from {} rejected: {}", connection, e);
            None
        }
    }
}
