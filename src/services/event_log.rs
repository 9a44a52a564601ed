//! Event log — append-only, size-bounded history of accepted mutations.
//!
//! DESIGN
//! ======
//! Events are serialized to JSON and pushed onto one substrate list. After
//! each append the list is trimmed to the newest `max_events` entries.
//! A `canvas_clear` deletes the list instead of being appended: replaying an
//! empty log and replaying `[..., clear]` give the same canvas.
//!
//! Append + trim run under a process-local lock so concurrent connections
//! never interleave between the push and the trim. Cross-process atomicity is
//! whatever the substrate provides.
//!
//! ERROR HANDLING
//! ==============
//! Substrate failures surface as `StoreUnavailable`. Entries that fail to
//! decode are logged and skipped on read; one corrupt entry must not block
//! reconstruction of the rest.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::event::{Event, EventError, EventKind, Shape};
use crate::services::replay;
use crate::substrate::{ListStore, SubstrateError};

#[derive(Debug, thiserror::Error)]
pub enum EventLogError {
    #[error("event store unavailable: {0}")]
    StoreUnavailable(#[from] SubstrateError),
    #[error(transparent)]
    Malformed(#[from] EventError),
}

pub struct EventLog {
    list: Arc<dyn ListStore>,
    key: String,
    max_events: Option<usize>,
    append_lock: Mutex<()>,
}

impl EventLog {
    /// `max_events` of `None` keeps every event.
    pub fn new(list: Arc<dyn ListStore>, key: impl Into<String>, max_events: Option<usize>) -> Self {
        Self { list, key: key.into(), max_events, append_lock: Mutex::new(()) }
    }

    /// Persist one event. Clears reset the log.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if any substrate call fails.
    pub async fn append(&self, event: &Event) -> Result<(), EventLogError> {
        let _guard = self.append_lock.lock().await;

        if event.kind() == EventKind::CanvasClear {
            self.list.del(&self.key).await?;
            debug!(key = %self.key, "event log reset by canvas_clear");
            return Ok(());
        }

        let raw = event.encode()?;
        self.list.rpush(&self.key, &raw).await?;

        if let Some(max_events) = self.max_events {
            self.list.ltrim_tail(&self.key, max_events).await?;
        }
        Ok(())
    }

    /// Every retained event in arrival order. Undecodable entries are dropped.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the substrate read fails.
    pub async fn read_all(&self) -> Result<Vec<Event>, EventLogError> {
        let raw = self.list.lrange_all(&self.key).await?;
        let total = raw.len();

        let events: Vec<Event> = raw
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| match Event::decode(entry) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(key = %self.key, index, error = %e, "skipping unreadable event log entry");
                    None
                }
            })
            .collect();

        if events.len() < total {
            debug!(key = %self.key, total, kept = events.len(), "event log read with skipped entries");
        }
        Ok(events)
    }

    /// Current canvas: the fold of every retained event.
    ///
    /// # Errors
    ///
    /// Returns `StoreUnavailable` if the substrate read fails.
    pub async fn canvas(&self) -> Result<Vec<Shape>, EventLogError> {
        let events = self.read_all().await?;
        Ok(replay::reconstruct(&events))
    }
}

#[cfg(test)]
#[path = "event_log_test.rs"]
mod tests;
