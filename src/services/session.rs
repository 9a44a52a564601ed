//! Session gateway — per-connection coordination of the sync engine.
//!
//! LIFECYCLE
//! =========
//! 1. Connected → register the client queue, send one `object_sync` with the
//!    reconstructed canvas (skipped when empty or when the store is down).
//! 2. Mutation → build an `Event`, append it to the log, publish it on the
//!    relay, then echo the client's frame to every other local client.
//!    `canvas_clear` goes to every local client, sender included.
//! 3. Disconnected → unregister. No events are produced.
//!
//! Events from other instances arrive through `start_relay` and are
//! re-emitted to every local client.
//!
//! ERROR HANDLING
//! ==============
//! Store and relay failures are logged and the local echo still happens:
//! same-instance peers stay responsive while other instances miss the edit.
//! Malformed mutations are dropped before any side effect.

use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::{Event, EventError, EventKind, Shape};
use crate::frame::Frame;
use crate::services::event_log::EventLogError;
use crate::services::fanout;
use crate::services::relay::{RelayError, RelayHandle};
use crate::state::AppState;

// =============================================================================
// CONNECT / DISCONNECT
// =============================================================================

/// Register a new connection and ship it the current canvas.
pub async fn connect(state: &AppState, client_id: Uuid, tx: mpsc::Sender<Frame>) {
    fanout::register(state, client_id, tx).await;

    match state.event_log.canvas().await {
        Ok(objects) if objects.is_empty() => {}
        Ok(objects) => {
            let count = objects.len();
            if fanout::send_to(state, client_id, Frame::sync(objects)).await {
                debug!(%client_id, count, "sent initial canvas sync");
            } else {
                warn!(%client_id, count, "initial canvas sync could not be queued");
            }
        }
        Err(e) => {
            warn!(%client_id, error = %e, "failed to load canvas state; connecting without sync");
        }
    }
}

pub async fn disconnect(state: &AppState, client_id: Uuid) {
    fanout::unregister(state, client_id).await;
}

/// Current canvas for read-only callers.
///
/// # Errors
///
/// Returns `StoreUnavailable` if the event log cannot be read.
pub async fn snapshot(state: &AppState) -> Result<Vec<Shape>, EventLogError> {
    state.event_log.canvas().await
}

// =============================================================================
// MUTATIONS
// =============================================================================

/// Handle one inbound mutation frame from `client_id`.
///
/// # Errors
///
/// Returns `MalformedMutation` for unknown types or payloads without a usable
/// id. Nothing is persisted, relayed, or echoed in that case.
pub async fn handle_mutation(state: &AppState, client_id: Uuid, frame: Frame) -> Result<(), EventError> {
    let kind: EventKind = frame.kind.parse()?;
    let event = Event::accept(state.origin, kind, frame.payload.clone())?;

    if let Err(e) = state.event_log.append(&event).await {
        warn!(%client_id, %kind, error = %e, "failed to persist canvas event");
    }
    if let Err(e) = state.relay.publish(&event).await {
        warn!(%client_id, %kind, error = %e, "failed to relay canvas event");
    }

    if kind == EventKind::CanvasClear {
        fanout::broadcast(state, &Frame::clear(), None).await;
    } else {
        fanout::broadcast(state, &frame, Some(client_id)).await;
    }
    Ok(())
}

// =============================================================================
// RELAY
// =============================================================================

/// Subscribe this instance to events accepted by other instances.
///
/// # Errors
///
/// Returns `ChannelUnavailable` if the relay channel cannot be established.
pub async fn start_relay(state: &AppState) -> Result<RelayHandle, RelayError> {
    let local = state.clone();
    state
        .relay
        .subscribe(move |event| {
            let local = local.clone();
            async move { deliver_remote(&local, event).await }
        })
        .await
}

/// Re-emit an event from another instance to every local client.
pub async fn deliver_remote(state: &AppState, event: Event) {
    match event.kind() {
        EventKind::CanvasClear => fanout::broadcast(state, &Frame::clear(), None).await,
        EventKind::ObjectAdded | EventKind::ObjectModified | EventKind::ObjectRemoved => {
            fanout::broadcast(state, &Frame::from_event(&event), None).await;
        }
        EventKind::Unknown => {
            debug!(origin = %event.origin(), "ignoring relayed event of unknown type");
        }
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
