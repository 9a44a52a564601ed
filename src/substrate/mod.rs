//! Substrate — the durable list and pub/sub primitives the engine runs on.
//!
//! ARCHITECTURE
//! ============
//! The event log needs an ordered, trimmable list per key. The relay needs a
//! broadcast channel every instance can publish to and listen on. Both are
//! modelled as traits so the engine never depends on a concrete backend:
//!
//! - `postgres://` → `PgSubstrate`: `canvas_events` table + `LISTEN/NOTIFY`.
//! - `memory://`   → `MemorySubstrate`: process-local, for single-instance
//!   runs and tests.
//!
//! Backends serialize their own operations; callers add no locking beyond
//! what the event log needs for append+trim.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

pub use memory::MemorySubstrate;
pub use postgres::PgSubstrate;

/// Buffered messages per subscription before the backend applies backpressure.
pub(crate) const SUBSCRIPTION_BUFFER: usize = 1024;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum SubstrateError {
    #[error("connect failed: {0}")]
    Connect(#[source] sqlx::Error),
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),
    #[error("unsupported store url: {0}")]
    UnsupportedUrl(String),
    /// Stand-in failure for test backends.
    #[cfg(test)]
    #[error("substrate closed")]
    Closed,
}

// =============================================================================
// TRAITS
// =============================================================================

/// Ordered string lists keyed by name.
#[async_trait]
pub trait ListStore: Send + Sync {
    /// Append `value` to the tail of `key`.
    async fn rpush(&self, key: &str, value: &str) -> Result<(), SubstrateError>;

    /// Keep only the newest `keep` entries of `key`.
    async fn ltrim_tail(&self, key: &str, keep: usize) -> Result<(), SubstrateError>;

    /// Every entry of `key`, oldest first.
    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, SubstrateError>;

    /// Drop the whole list.
    async fn del(&self, key: &str) -> Result<(), SubstrateError>;
}

/// Fire-and-forget broadcast channels shared by every instance.
#[async_trait]
pub trait PubSub: Send + Sync {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), SubstrateError>;

    /// Start listening on `channel`. Messages published by this process are
    /// delivered too; filtering is the caller's job.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubstrateError>;
}

// =============================================================================
// SUBSCRIPTION
// =============================================================================

/// Live subscription handle. Dropping it stops the backend listener; `close`
/// also waits for the listener to release its connection.
pub struct Subscription {
    messages: mpsc::Receiver<String>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(messages: mpsc::Receiver<String>, stop: oneshot::Sender<()>, task: JoinHandle<()>) -> Self {
        Self { messages, stop: Some(stop), task: Some(task) }
    }

    /// Next raw message, or `None` once the backend listener has ended.
    pub async fn recv(&mut self) -> Option<String> {
        self.messages.recv().await
    }

    /// Unsubscribe and release the underlying channel handle.
    pub async fn close(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

// =============================================================================
// OPEN
// =============================================================================

/// Handles to one backend, shared by the event log and the relay.
#[derive(Clone)]
pub struct Substrate {
    pub list: Arc<dyn ListStore>,
    pub pubsub: Arc<dyn PubSub>,
}

impl Substrate {
    /// Both handles backed by the same object.
    pub fn shared<T>(backend: Arc<T>) -> Self
    where
        T: ListStore + PubSub + 'static,
    {
        Self { list: backend.clone(), pubsub: backend }
    }

    /// Pick a backend by URL scheme. Postgres connects lazily on first use.
    ///
    /// # Errors
    ///
    /// Returns `UnsupportedUrl` for any scheme other than `postgres`,
    /// `postgresql`, or `memory`.
    pub fn open(url: &str, max_connections: u32) -> Result<Self, SubstrateError> {
        let scheme = url.split_once("://").map_or("", |(scheme, _)| scheme);
        match scheme {
            "postgres" | "postgresql" => Ok(Self::shared(Arc::new(PgSubstrate::new(url, max_connections)))),
            "memory" => Ok(Self::shared(Arc::new(MemorySubstrate::new()))),
            _ => Err(SubstrateError::UnsupportedUrl(url.to_owned())),
        }
    }
}
