//! Fan-out — delivery of frames to locally connected clients.
//!
//! DESIGN
//! ======
//! Each websocket registers a bounded `mpsc` sender under its client id.
//! Delivery is non-suspending beyond the registry read lock: `try_send`
//! either queues the frame or drops it for that client when its queue is
//! full or closed.

use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::frame::Frame;
use crate::state::AppState;

/// Start delivering frames to `client_id`.
pub async fn register(state: &AppState, client_id: Uuid, tx: mpsc::Sender<Frame>) {
    let mut clients = state.clients.write().await;
    clients.insert(client_id, tx);
    debug!(%client_id, clients = clients.len(), "client registered");
}

/// Stop delivering frames to `client_id`. Unknown ids are ignored.
pub async fn unregister(state: &AppState, client_id: Uuid) {
    let mut clients = state.clients.write().await;
    if clients.remove(&client_id).is_some() {
        debug!(%client_id, remaining = clients.len(), "client unregistered");
    }
}

/// Queue a frame for one client. Returns whether it was queued.
pub async fn send_to(state: &AppState, client_id: Uuid, frame: Frame) -> bool {
    let clients = state.clients.read().await;
    let Some(tx) = clients.get(&client_id) else {
        return false;
    };
    tx.try_send(frame).is_ok()
}

/// Broadcast a frame to all local clients, optionally excluding one.
pub async fn broadcast(state: &AppState, frame: &Frame, exclude: Option<Uuid>) {
    let clients = state.clients.read().await;
    for (client_id, tx) in clients.iter() {
        if exclude == Some(*client_id) {
            continue;
        }
        // Best-effort: if a client's channel is full, skip it.
        if tx.try_send(frame.clone()).is_err() {
            debug!(%client_id, kind = %frame.kind, "dropped frame for slow or closed client");
        }
    }
}

/// Drop every client sender so each socket task sees its queue close.
/// Returns how many clients were disconnected.
pub async fn close_all(state: &AppState) -> usize {
    let mut clients = state.clients.write().await;
    let count = clients.len();
    clients.clear();
    info!(count, "closed all local client queues");
    count
}

#[cfg(test)]
pub async fn client_count(state: &AppState) -> usize {
    state.clients.read().await.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::test_helpers;
    use tokio::time::{Duration, timeout};

    async fn assert_channel_has_frame(rx: &mut mpsc::Receiver<Frame>) -> Frame {
        timeout(Duration::from_millis(200), rx.recv())
            .await
            .expect("frame receive timed out")
            .expect("channel closed")
    }

    async fn assert_channel_empty(rx: &mut mpsc::Receiver<Frame>) {
        assert!(
            timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
            "expected channel to remain empty"
        );
    }

    #[tokio::test]
    async fn broadcast_sends_to_all_except_excluded_client() {
        let state = test_helpers::test_app_state();
        let (client_a, client_b, client_c) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        let (tx_c, mut rx_c) = mpsc::channel(8);
        register(&state, client_a, tx_a).await;
        register(&state, client_b, tx_b).await;
        register(&state, client_c, tx_c).await;

        broadcast(&state, &Frame::clear(), Some(client_b)).await;

        assert_eq!(assert_channel_has_frame(&mut rx_a).await.kind, "canvas_clear");
        assert_eq!(assert_channel_has_frame(&mut rx_c).await.kind, "canvas_clear");
        assert_channel_empty(&mut rx_b).await;
    }

    #[tokio::test]
    async fn broadcast_without_exclusion_reaches_everyone() {
        let state = test_helpers::test_app_state();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        register(&state, Uuid::new_v4(), tx_a).await;
        register(&state, Uuid::new_v4(), tx_b).await;

        broadcast(&state, &Frame::clear(), None).await;

        assert_channel_has_frame(&mut rx_a).await;
        assert_channel_has_frame(&mut rx_b).await;
    }

    #[tokio::test]
    async fn full_queue_drops_frame_without_blocking_others() {
        let state = test_helpers::test_app_state();
        let (slow_tx, mut slow_rx) = mpsc::channel(1);
        let (fast_tx, mut fast_rx) = mpsc::channel(8);
        register(&state, Uuid::new_v4(), slow_tx).await;
        register(&state, Uuid::new_v4(), fast_tx).await;

        broadcast(&state, &Frame::clear(), None).await;
        broadcast(&state, &Frame::clear(), None).await;

        assert_channel_has_frame(&mut slow_rx).await;
        assert_channel_empty(&mut slow_rx).await;
        assert_channel_has_frame(&mut fast_rx).await;
        assert_channel_has_frame(&mut fast_rx).await;
    }

    #[tokio::test]
    async fn send_to_targets_one_client() {
        let state = test_helpers::test_app_state();
        let (client_a, client_b) = (Uuid::new_v4(), Uuid::new_v4());
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        register(&state, client_a, tx_a).await;
        register(&state, client_b, tx_b).await;

        assert!(send_to(&state, client_a, Frame::sync(Vec::new())).await);
        assert!(!send_to(&state, Uuid::new_v4(), Frame::clear()).await);

        assert_eq!(assert_channel_has_frame(&mut rx_a).await.kind, "object_sync");
        assert_channel_empty(&mut rx_b).await;
    }

    #[tokio::test]
    async fn unregister_and_close_all_drop_senders() {
        let state = test_helpers::test_app_state();
        let client_a = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::channel(8);
        let (tx_b, mut rx_b) = mpsc::channel(8);
        register(&state, client_a, tx_a).await;
        register(&state, Uuid::new_v4(), tx_b).await;

        unregister(&state, client_a).await;
        assert_eq!(client_count(&state).await, 1);
        assert!(rx_a.recv().await.is_none());

        assert_eq!(close_all(&state).await, 1);
        assert_eq!(client_count(&state).await, 0);
        assert!(rx_b.recv().await.is_none());
    }
}
