//! In-process substrate. Lists live in a `HashMap`, channels are
//! `tokio::sync::broadcast` senders created on first use.
//!
//! Two `AppState`s sharing one `MemorySubstrate` behave like two instances
//! sharing a store, which is how the cross-instance tests run.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::warn;

use super::{ListStore, PubSub, SUBSCRIPTION_BUFFER, Subscription, SubstrateError};

#[derive(Default)]
pub struct MemorySubstrate {
    lists: Mutex<HashMap<String, Vec<String>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<String>>>,
}

impl MemorySubstrate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn channel(&self, name: &str) -> broadcast::Sender<String> {
        let mut channels = self
            .channels
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        channels
            .entry(name.to_owned())
            .or_insert_with(|| broadcast::channel(SUBSCRIPTION_BUFFER).0)
            .clone()
    }
}

#[async_trait]
impl ListStore for MemorySubstrate {
    async fn rpush(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        let mut lists = self
            .lists
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        lists.entry(key.to_owned()).or_default().push(value.to_owned());
        Ok(())
    }

    async fn ltrim_tail(&self, key: &str, keep: usize) -> Result<(), SubstrateError> {
        let mut lists = self
            .lists
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(list) = lists.get_mut(key) {
            if list.len() > keep {
                let excess = list.len() - keep;
                list.drain(..excess);
            }
        }
        Ok(())
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, SubstrateError> {
        let lists = self
            .lists
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(lists.get(key).cloned().unwrap_or_default())
    }

    async fn del(&self, key: &str) -> Result<(), SubstrateError> {
        let mut lists = self
            .lists
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        lists.remove(key);
        Ok(())
    }
}

#[async_trait]
impl PubSub for MemorySubstrate {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), SubstrateError> {
        // No subscribers is not an error, same as NOTIFY with no listeners.
        let _ = self.channel(channel).send(message.to_owned());
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubstrateError> {
        let mut source = self.channel(channel).subscribe();
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let channel = channel.to_owned();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    msg = source.recv() => match msg {
                        Ok(message) => {
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(%channel, skipped, "memory subscription lagged; messages dropped");
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
        });

        Ok(Subscription::new(rx, stop_tx, task))
    }
}
