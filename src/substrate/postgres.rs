//! Postgres substrate — list storage in `canvas_events`, pub/sub over
//! `LISTEN/NOTIFY`.
//!
//! DESIGN
//! ======
//! The pool is created on first use and memoized in a `OnceCell`. Concurrent
//! first callers await the same in-flight connect; a failed connect leaves
//! the cell empty so the next caller tries again.
//!
//! Each list is the set of rows sharing a `list_key`, ordered by `seq`.
//! `BIGSERIAL` gives arrival order across every instance writing the table.
//!
//! TRADE-OFFS
//! ==========
//! A dropped LISTEN connection is retried until it comes back; notifications
//! sent while it was down are lost.
//!
//! NOTIFY payloads are capped at 8000 bytes by Postgres. A larger event fails
//! to publish and is handled like any other publish failure.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tokio::sync::{OnceCell, mpsc, oneshot};
use tracing::{debug, info, warn};

use super::{ListStore, PubSub, SUBSCRIPTION_BUFFER, Subscription, SubstrateError};

/// Pause between reconnect attempts after the listener connection fails.
const LISTEN_RETRY_DELAY: Duration = Duration::from_secs(1);

pub struct PgSubstrate {
    url: String,
    max_connections: u32,
    pool: OnceCell<PgPool>,
}

impl PgSubstrate {
    pub fn new(url: impl Into<String>, max_connections: u32) -> Self {
        Self { url: url.into(), max_connections, pool: OnceCell::new() }
    }

    /// Shared pool, connecting on first call.
    async fn pool(&self) -> Result<&PgPool, SubstrateError> {
        self.pool
            .get_or_try_init(|| async {
                let pool = crate::db::init_pool(&self.url, self.max_connections)
                    .await
                    .map_err(SubstrateError::Connect)?;
                info!(max_connections = self.max_connections, "postgres substrate connected");
                Ok::<_, SubstrateError>(pool)
            })
            .await
    }
}

#[async_trait]
impl ListStore for PgSubstrate {
    async fn rpush(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        let pool = self.pool().await?;
        sqlx::query("INSERT INTO canvas_events (list_key, body) VALUES ($1, $2)")
            .bind(key)
            .bind(value)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn ltrim_tail(&self, key: &str, keep: usize) -> Result<(), SubstrateError> {
        let pool = self.pool().await?;
        let keep = i64::try_from(keep).unwrap_or(i64::MAX);
        sqlx::query(
            "DELETE FROM canvas_events \
             WHERE list_key = $1 AND seq < ( \
                 SELECT COALESCE(MIN(seq), 0) FROM ( \
                     SELECT seq FROM canvas_events WHERE list_key = $1 ORDER BY seq DESC LIMIT $2 \
                 ) newest \
             )",
        )
        .bind(key)
        .bind(keep)
        .execute(pool)
        .await?;
        Ok(())
    }

    async fn lrange_all(&self, key: &str) -> Result<Vec<String>, SubstrateError> {
        let pool = self.pool().await?;
        let rows = sqlx::query_scalar::<_, String>("SELECT body FROM canvas_events WHERE list_key = $1 ORDER BY seq ASC")
            .bind(key)
            .fetch_all(pool)
            .await?;
        Ok(rows)
    }

    async fn del(&self, key: &str) -> Result<(), SubstrateError> {
        let pool = self.pool().await?;
        sqlx::query("DELETE FROM canvas_events WHERE list_key = $1")
            .bind(key)
            .execute(pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl PubSub for PgSubstrate {
    async fn publish(&self, channel: &str, message: &str) -> Result<(), SubstrateError> {
        let pool = self.pool().await?;
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(channel)
            .bind(message)
            .execute(pool)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, SubstrateError> {
        let pool = self.pool().await?;
        let mut listener = PgListener::connect_with(pool).await.map_err(SubstrateError::Connect)?;
        listener.listen(channel).await?;

        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let channel = channel.to_owned();

        // A failed `recv` leaves the listener disconnected; the next `recv`
        // reconnects and re-issues LISTEN for every channel it holds.
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut stop_rx => break,
                    msg = listener.recv() => match msg {
                        Ok(notification) => {
                            if tx.send(notification.payload().to_owned()).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, %channel, retry = ?LISTEN_RETRY_DELAY, "postgres listener failed; retrying");
                            tokio::select! {
                                _ = &mut stop_rx => break,
                                () = tokio::time::sleep(LISTEN_RETRY_DELAY) => {}
                            }
                        }
                    }
                }
            }
            if let Err(e) = listener.unlisten(&channel).await {
                debug!(error = %e, %channel, "unlisten failed during close");
            }
        });

        Ok(Subscription::new(rx, stop_tx, task))
    }
}
