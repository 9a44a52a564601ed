//! Event — the canonical record of one accepted canvas mutation.
//!
//! DESIGN
//! ======
//! Every client mutation becomes an `Event` stamped with the accepting
//! instance's `Origin` and a wall-clock timestamp. Events are immutable once
//! built: fields are private, and the origin is only ever set here.
//!
//! The timestamp is advisory. Ordering comes from arrival order at the store,
//! never from `timestamp`.
//!
//! Shapes are schema-free JSON objects. The engine only looks at `id`.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

// =============================================================================
// TYPES
// =============================================================================

/// A drawable object: arbitrary attributes plus a required `id`.
pub type Shape = serde_json::Map<String, Value>;

/// Identity of the server instance that first accepted an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(Uuid);

impl Origin {
    /// Fresh random identity for a new process.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Mutation type. Unknown names survive decoding so replay can skip them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CanvasClear,
    ObjectAdded,
    ObjectModified,
    ObjectRemoved,
    #[serde(other)]
    Unknown,
}

impl EventKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CanvasClear => "canvas_clear",
            Self::ObjectAdded => "object_added",
            Self::ObjectModified => "object_modified",
            Self::ObjectRemoved => "object_removed",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventKind {
    type Err = EventError;

    /// Parse a wire message type. Only the four mutation types are accepted.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "canvas_clear" => Ok(Self::CanvasClear),
            "object_added" => Ok(Self::ObjectAdded),
            "object_modified" => Ok(Self::ObjectModified),
            "object_removed" => Ok(Self::ObjectRemoved),
            _ => Err(EventError::MalformedMutation("unknown mutation type")),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EventError {
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] serde_json::Error),
    #[error("malformed mutation: {0}")]
    MalformedMutation(&'static str),
}

/// Immutable record of one mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    payload: Option<Value>,
    /// Milliseconds since Unix epoch.
    #[serde(default)]
    timestamp: i64,
    origin: Origin,
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Current time as milliseconds since Unix epoch.
fn now_ms() -> i64 {
    let Ok(dur) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return 0;
    };
    i64::try_from(dur.as_millis()).unwrap_or(0)
}

impl Event {
    /// Build an event without validating the payload. `canvas_clear` never
    /// carries a payload.
    #[must_use]
    pub fn new(origin: Origin, kind: EventKind, payload: Option<Value>) -> Self {
        let payload = match kind {
            EventKind::CanvasClear => None,
            _ => payload,
        };
        Self { kind, payload, timestamp: now_ms(), origin }
    }

    /// Build an event from a client mutation, applying the structural checks:
    /// shape mutations need an object payload with a usable `id`.
    ///
    /// # Errors
    ///
    /// Returns `MalformedMutation` when the payload fails those checks.
    pub fn accept(origin: Origin, kind: EventKind, payload: Option<Value>) -> Result<Self, EventError> {
        match kind {
            EventKind::CanvasClear => Ok(Self::new(origin, kind, None)),
            EventKind::Unknown => Err(EventError::MalformedMutation("unknown mutation type")),
            EventKind::ObjectAdded | EventKind::ObjectModified | EventKind::ObjectRemoved => {
                let Some(value) = payload else {
                    return Err(EventError::MalformedMutation("payload required"));
                };
                if !value.is_object() {
                    return Err(EventError::MalformedMutation("payload must be an object"));
                }
                if shape_id(&value).is_none() {
                    return Err(EventError::MalformedMutation("payload id required"));
                }
                Ok(Self::new(origin, kind, Some(value)))
            }
        }
    }

    /// Decode one serialized event.
    ///
    /// # Errors
    ///
    /// Returns `MalformedEvent` if the text is not a valid event.
    pub fn decode(raw: &str) -> Result<Self, EventError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Serialize for the event log and the relay channel.
    ///
    /// # Errors
    ///
    /// Returns `MalformedEvent` if the payload cannot be serialized.
    pub fn encode(&self) -> Result<String, EventError> {
        Ok(serde_json::to_string(self)?)
    }
}

// =============================================================================
// ACCESSORS
// =============================================================================

impl Event {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    #[must_use]
    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_ref()
    }

    #[must_use]
    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    #[must_use]
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// The shape id this event targets, if any.
    #[must_use]
    pub fn shape_id(&self) -> Option<String> {
        self.payload.as_ref().and_then(shape_id)
    }
}

/// Extract a usable shape id: a non-empty string, or a number keyed by its
/// decimal text.
#[must_use]
pub fn shape_id(payload: &Value) -> Option<String> {
    match payload.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
#[path = "event_test.rs"]
mod tests;
