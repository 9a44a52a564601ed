//! Frame — the message carried over a client websocket.
//!
//! ARCHITECTURE
//! ============
//! Clients and server exchange JSON text frames of the form
//! `{"type": "object_added", "payload": {...}}`. The four mutation types
//! travel both ways; `object_sync` is server → client only and carries the
//! full reconstructed canvas.
//!
//! DESIGN
//! ======
//! - `type` stays a plain string so unknown client types can be logged and
//!   ignored instead of failing the whole frame.
//! - Payloads are opaque JSON. Mutation payloads are echoed exactly as the
//!   client sent them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::event::{Event, EventKind, Shape};

// =============================================================================
// FIELD CONSTANTS
// =============================================================================

/// Wire type for the one-shot snapshot sent to a new connection.
pub const OBJECT_SYNC: &str = "object_sync";

/// Snapshot payload key holding the shape list.
pub const FRAME_OBJECTS: &str = "objects";

// =============================================================================
// TYPES
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

impl Frame {
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self { kind: kind.into(), payload }
    }

    /// A mutation frame for the given event type.
    #[must_use]
    pub fn mutation(kind: EventKind, payload: Option<Value>) -> Self {
        Self::new(kind.as_str(), payload)
    }

    /// Re-emit a relayed event to local clients.
    #[must_use]
    pub fn from_event(event: &Event) -> Self {
        Self::mutation(event.kind(), event.payload().cloned())
    }

    #[must_use]
    pub fn clear() -> Self {
        Self::mutation(EventKind::CanvasClear, None)
    }

    /// Full-canvas snapshot: `{"objects": [shape, ...]}`.
    #[must_use]
    pub fn sync(objects: Vec<Shape>) -> Self {
        let objects = objects.into_iter().map(Value::Object).collect();
        let mut data = serde_json::Map::new();
        data.insert(FRAME_OBJECTS.into(), Value::Array(objects));
        Self::new(OBJECT_SYNC, Some(Value::Object(data)))
    }
}
