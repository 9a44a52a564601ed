//! Relay — cross-instance visibility for locally accepted events.
//!
//! DESIGN
//! ======
//! Every instance publishes the events it accepts on one shared channel and
//! listens on the same channel. The substrate echoes an instance's own
//! publishes back to it, so the subscriber drops anything whose `origin`
//! equals this instance's identity before the handler sees it. That origin
//! check is the only loop guard; there are no sequence numbers.
//!
//! Publishing is fire-and-forget: no outbox, no retry, no delivery guarantee.
//!
//! LIFECYCLE
//! =========
//! `subscribe` spawns one listener task per instance. `RelayHandle::unsubscribe`
//! stops it and releases the channel; it is only used during shutdown.
//! If the backend ends the subscription instead, `RelayHandle::lost` resolves
//! and the process treats it like a relay failure at startup.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use crate::event::{Event, EventError, Origin};
use crate::substrate::{PubSub, SubstrateError};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("relay channel unavailable: {0}")]
    ChannelUnavailable(#[from] SubstrateError),
    #[error(transparent)]
    Malformed(#[from] EventError),
}

pub struct Relay {
    pubsub: Arc<dyn PubSub>,
    channel: String,
    origin: Origin,
}

impl Relay {
    pub fn new(pubsub: Arc<dyn PubSub>, channel: impl Into<String>, origin: Origin) -> Self {
        Self { pubsub, channel: channel.into(), origin }
    }

    #[must_use]
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Send an event to every instance listening on the channel.
    ///
    /// # Errors
    ///
    /// Returns `ChannelUnavailable` if the substrate publish fails.
    pub async fn publish(&self, event: &Event) -> Result<(), RelayError> {
        let raw = event.encode()?;
        self.pubsub.publish(&self.channel, &raw).await?;
        Ok(())
    }

    /// Listen for events from other instances and pass each one to `handler`.
    /// Handler calls run one at a time in arrival order.
    ///
    /// # Errors
    ///
    /// Returns `ChannelUnavailable` if the subscription cannot be established.
    pub async fn subscribe<F, Fut>(&self, handler: F) -> Result<RelayHandle, RelayError>
    where
        F: Fn(Event) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut subscription = self.pubsub.subscribe(&self.channel).await?;
        let origin = self.origin;
        let channel = self.channel.clone();
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let (lost_tx, lost_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    msg = subscription.recv() => {
                        let Some(raw) = msg else {
                            error!(%channel, "relay subscription lost");
                            let _ = lost_tx.send(());
                            break;
                        };
                        if let Some(event) = accept_remote(origin, &raw) {
                            handler(event).await;
                        }
                    }
                }
            }
            subscription.close().await;
        });

        Ok(RelayHandle { stop: stop_tx, lost: lost_rx, task })
    }
}

/// Decode a relayed message and apply the loop guard. Returns `None` for
/// undecodable messages and for events this instance published itself.
#[must_use]
pub fn accept_remote(origin: Origin, raw: &str) -> Option<Event> {
    let event = match Event::decode(raw) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "dropping unreadable relay message");
            return None;
        }
    };
    if event.origin() == origin {
        trace!(kind = %event.kind(), timestamp = event.timestamp(), "skipping self-originated relay event");
        return None;
    }
    Some(event)
}

/// Running relay subscription.
pub struct RelayHandle {
    stop: oneshot::Sender<()>,
    /// Fires only when the subscription ends without `unsubscribe`.
    lost: oneshot::Receiver<()>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// Resolves once the backend subscription has ended on its own. After
    /// that this instance no longer sees other instances' events. Never
    /// resolves while the relay is healthy.
    ///
    /// Must not be polled again after it has resolved.
    pub async fn lost(&mut self) {
        if (&mut self.lost).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Stop listening and close the underlying channel handle.
    pub async fn unsubscribe(self) {
        let _ = self.stop.send(());
        if let Err(e) = self.task.await {
            warn!(error = %e, "relay listener task failed");
        }
    }
}

#[cfg(test)]
#[path = "relay_test.rs"]
mod tests;
