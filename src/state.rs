//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is the composition root's bundle of process-wide singletons:
//! this instance's `Origin`, the event log, the relay, and the registry of
//! locally connected clients. It is injected into Axum handlers via the
//! `State` extractor and captured by the relay handler.
//!
//! The origin is created once at startup and handed to every component that
//! builds or filters events.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use crate::config::Config;
use crate::event::Origin;
use crate::frame::Frame;
use crate::services::event_log::EventLog;
use crate::services::relay::Relay;
use crate::substrate::Substrate;

/// Connected clients: `client_id` -> sender for outgoing frames.
pub type Clients = HashMap<Uuid, mpsc::Sender<Frame>>;

/// Shared application state, injected into Axum handlers via State extractor.
/// Clone is required by Axum; all inner fields are Arc-wrapped or Copy.
#[derive(Clone)]
pub struct AppState {
    pub origin: Origin,
    pub event_log: Arc<EventLog>,
    pub relay: Arc<Relay>,
    pub clients: Arc<RwLock<Clients>>,
    /// Outbound queue depth per connection.
    pub client_queue_capacity: usize,
}

impl AppState {
    #[must_use]
    pub fn new(config: &Config, substrate: &Substrate, origin: Origin) -> Self {
        let event_log = EventLog::new(substrate.list.clone(), config.events_key.clone(), config.max_events);
        let relay = Relay::new(substrate.pubsub.clone(), config.updates_channel.clone(), origin);
        Self {
            origin,
            event_log: Arc::new(event_log),
            relay: Arc::new(relay),
            clients: Arc::new(RwLock::new(HashMap::new())),
            client_queue_capacity: config.client_queue_capacity,
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
