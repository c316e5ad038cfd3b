//! `WebSocket` channel for visualization clients and vehicles.
//!
//! Clients connect to `GET /ws`. On connect they receive a
//! `state_snapshot`; afterwards every junction event published by the
//! workers is forwarded to every client. Clients may send the commands
//! listed in [`protocol`](crate::protocol); replies (`trigger_ack`, `pong`,
//! `state_snapshot`, `error`) go to the sending client only.
//!
//! If a client falls behind, lagged events are skipped. Every event
//! carries the full signal set, so the client recovers on the next one.
//!
//! Frames are plain JSON text `{"event": ..., "data": ...}` with no
//! Socket.IO framing; Socket.IO clients need an adapter.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};
use velocity_types::{JunctionMode, now_millis};

use crate::commands::{self, CommandOutcome};
use crate::error::GatewayError;
use crate::protocol::{ClientMessage, Pong, ServerMessage, StateSnapshotPayload, TriggerAck};
use crate::state::AppState;

/// Upgrade an HTTP request to a `WebSocket` connection.
///
/// # Route
///
/// `GET /ws`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_ws(socket, state))
}

/// Whether the connection should stay open after handling a frame.
enum Flow {
    Continue,
    Close,
}

/// Handle the `WebSocket` lifecycle.
async fn handle_ws(mut socket: WebSocket, state: Arc<AppState>) {
    info!("WebSocket client connected");

    // Subscribe before the snapshot so no event committed after it is lost.
    let mut rx = state.subscribe();

    let snapshot = state_snapshot(&state).await;
    if let Flow::Close = send(&mut socket, &snapshot).await {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Flow::Close = send(&mut socket, &event).await {
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Text(text))) => {
                        let Some(reply) = handle_text(&state, text.as_str()).await else {
                            continue;
                        };
                        if let Flow::Close = send(&mut socket, &reply).await {
                            return;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    Some(Ok(_)) => {
                        // Binary and pong frames carry nothing for us.
                    }
                }
            }
        }
    }
}

/// Decode and act on one client frame, returning the reply for the sender.
async fn handle_text(state: &AppState, text: &str) -> Option<ServerMessage> {
    let message = match ClientMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(error = %e, "Rejected WebSocket message");
            return Some(ServerMessage::error(e.to_string()));
        }
    };

    match message {
        ClientMessage::Ping => Some(ServerMessage::Pong(Pong {
            timestamp: now_millis(),
        })),
        ClientMessage::RequestState => Some(state_snapshot(state).await),
        ClientMessage::Command(command) => {
            match commands::execute(&state.registry, command).await {
                Ok(CommandOutcome::Triggered {
                    junction_id,
                    vehicle_id,
                }) => Some(ServerMessage::TriggerAck(TriggerAck {
                    junction_id,
                    vehicle_id,
                    mode: JunctionMode::Emergency,
                    timestamp: now_millis(),
                })),
                // Overrides and location updates are answered by the
                // broadcast every client receives.
                Ok(CommandOutcome::Overridden { .. } | CommandOutcome::Relocated { .. }) => None,
                Err(e) => Some(ServerMessage::error(e.to_string())),
            }
        }
    }
}

async fn state_snapshot(state: &AppState) -> ServerMessage {
    match state.registry.snapshot().await {
        Ok(snapshot) => ServerMessage::StateSnapshot(StateSnapshotPayload {
            snapshot,
            success: true,
        }),
        Err(e) => ServerMessage::error(GatewayError::from(e).to_string()),
    }
}

/// Serialize and send one message.
async fn send<T: serde::Serialize>(socket: &mut WebSocket, message: &T) -> Flow {
    let json = match serde_json::to_string(message) {
        Ok(j) => j,
        Err(e) => {
            warn!("Failed to serialize WebSocket message: {e}");
            return Flow::Continue;
        }
    };
    if socket.send(Message::Text(json.into())).await.is_err() {
        debug!("WebSocket client disconnected (send failed)");
        return Flow::Close;
    }
    Flow::Continue
}
