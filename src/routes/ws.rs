//! WebSocket handler — bidirectional frame relay.
//!
//! DESIGN
//! ======
//! On upgrade, generates a client ID and enters a `select!` loop:
//! - Incoming client frames → parse + hand to the session gateway
//! - Queued frames from the gateway (echoes, relayed events) → forward to client
//!
//! LIFECYCLE
//! =========
//! 1. Upgrade → register with the session, receive `object_sync` if non-empty
//! 2. Client sends mutation frames → `session::handle_mutation`
//! 3. Queue closed (shutdown) → send Close frame
//! 4. Close / error → unregister

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::frame::Frame;
use crate::services;
use crate::state::AppState;

// =============================================================================
// UPGRADE
// =============================================================================

pub async fn handle_ws(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(move |socket| run_ws(socket, state))
}

// =============================================================================
// CONNECTION
// =============================================================================

async fn run_ws(mut socket: WebSocket, state: AppState) {
    let client_id = Uuid::new_v4();

    // Per-connection queue for frames addressed to this client.
    let (client_tx, mut client_rx) = mpsc::channel::<Frame>(state.client_queue_capacity.max(1));

    services::session::connect(&state, client_id, client_tx).await;
    info!(%client_id, "ws: client connected");

    loop {
        tokio::select! {
            msg = socket.recv() => {
                let Some(msg) = msg else { break };
                let Ok(msg) = msg else { break };
                match msg {
                    Message::Text(text) => process_inbound_text(&state, client_id, text.as_str()).await,
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            frame = client_rx.recv() => {
                let Some(frame) = frame else {
                    // Registry dropped our sender: the server is shutting down.
                    let _ = socket.send(Message::Close(None)).await;
                    break;
                };
                if send_frame(&mut socket, &frame).await.is_err() {
                    break;
                }
            }
        }
    }

    services::session::disconnect(&state, client_id).await;
    info!(%client_id, "ws: client disconnected");
}

// =============================================================================
// FRAME HANDLING
// =============================================================================

/// Parse one inbound text frame and hand it to the session gateway.
/// Unparseable or malformed frames are dropped; the connection stays open.
async fn process_inbound_text(state: &AppState, client_id: Uuid, text: &str) {
    let frame: Frame = match serde_json::from_str(text) {
        Ok(f) => f,
        Err(e) => {
            warn!(%client_id, error = %e, "ws: invalid inbound frame");
            return;
        }
    };

    let kind = frame.kind.clone();
    if let Err(e) = services::session::handle_mutation(state, client_id, frame).await {
        debug!(%client_id, %kind, error = %e, "ws: dropped inbound frame");
    }
}

async fn send_frame(socket: &mut WebSocket, frame: &Frame) -> Result<(), ()> {
    let json = match serde_json::to_string(frame) {
        Ok(j) => j,
        Err(e) => {
            warn!(error = %e, kind = %frame.kind, "ws: failed to encode frame");
            return Ok(());
        }
    };
    socket.send(Message::Text(json.into())).await.map_err(|_| ())
}

#[cfg(test)]
#[path = "ws_test.rs"]
mod tests;
