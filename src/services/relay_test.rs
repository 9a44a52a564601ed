use super::*;
use crate::event::EventKind;
use crate::state::test_helpers::FailingSubstrate;
use crate::substrate::{MemorySubstrate, Subscription};
use serde_json::json;
use std::sync::{Mutex, PoisonError};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Duration, timeout};

const CHANNEL: &str = "test_updates";

async fn collecting_relay(pubsub: Arc<dyn PubSub>, origin: Origin) -> (Relay, RelayHandle, mpsc::Receiver<Event>) {
    let relay = Relay::new(pubsub, CHANNEL, origin);
    let (tx, rx) = mpsc::channel(16);
    let handle = relay
        .subscribe(move |event| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(event).await;
            }
        })
        .await
        .expect("subscribe should succeed");
    (relay, handle, rx)
}

/// Backend whose single subscription is fed by the test and ends when the
/// test drops the feeding sender.
struct FeedPubSub {
    messages: Mutex<Option<mpsc::Receiver<String>>>,
}

impl FeedPubSub {
    fn new() -> (Arc<Self>, mpsc::Sender<String>) {
        let (feed, messages) = mpsc::channel(8);
        (Arc::new(Self { messages: Mutex::new(Some(messages)) }), feed)
    }
}

#[async_trait::async_trait]
impl PubSub for FeedPubSub {
    async fn publish(&self, _channel: &str, _message: &str) -> Result<(), SubstrateError> {
        Ok(())
    }

    async fn subscribe(&self, _channel: &str) -> Result<Subscription, SubstrateError> {
        let messages = self
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .ok_or(SubstrateError::Closed)?;
        let (stop, _stopped) = oneshot::channel();
        Ok(Subscription::new(messages, stop, tokio::spawn(async {})))
    }
}

async fn assert_no_event(rx: &mut mpsc::Receiver<Event>) {
    assert!(
        timeout(Duration::from_millis(80), rx.recv()).await.is_err(),
        "expected no relayed event"
    );
}

#[tokio::test]
async fn remote_events_reach_handler() {
    let substrate = Arc::new(MemorySubstrate::new());
    let (_relay_a, handle_a, mut rx_a) = collecting_relay(substrate.clone(), Origin::generate()).await;
    let relay_b = Relay::new(substrate.clone(), CHANNEL, Origin::generate());

    let event = Event::new(Origin::generate(), EventKind::ObjectAdded, Some(json!({"id": "s1"})));
    relay_b.publish(&event).await.unwrap();

    let received = timeout(Duration::from_millis(200), rx_a.recv())
        .await
        .expect("relay receive timed out")
        .expect("relay channel closed");
    assert_eq!(received, event);
    handle_a.unsubscribe().await;
}

#[tokio::test]
async fn own_events_are_never_handed_back() {
    let substrate = Arc::new(MemorySubstrate::new());
    let origin = Origin::generate();
    let (relay, handle, mut rx) = collecting_relay(substrate, origin).await;

    let own = Event::new(origin, EventKind::ObjectAdded, Some(json!({"id": "mine"})));
    relay.publish(&own).await.unwrap();
    assert_no_event(&mut rx).await;

    handle.unsubscribe().await;
}

#[tokio::test]
async fn garbage_messages_are_dropped() {
    let substrate = Arc::new(MemorySubstrate::new());
    let (_relay, handle, mut rx) = collecting_relay(substrate.clone(), Origin::generate()).await;

    substrate.publish(CHANNEL, "{{{").await.unwrap();
    let event = Event::new(Origin::generate(), EventKind::CanvasClear, None);
    substrate.publish(CHANNEL, &event.encode().unwrap()).await.unwrap();

    let received = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("relay receive timed out")
        .expect("relay channel closed");
    assert_eq!(received.kind(), EventKind::CanvasClear);
    handle.unsubscribe().await;
}

#[tokio::test]
async fn unsubscribe_stops_delivery() {
    let substrate = Arc::new(MemorySubstrate::new());
    let (_relay, handle, mut rx) = collecting_relay(substrate.clone(), Origin::generate()).await;
    handle.unsubscribe().await;

    let publisher = Relay::new(substrate, CHANNEL, Origin::generate());
    let event = Event::new(Origin::generate(), EventKind::ObjectRemoved, Some(json!({"id": "x"})));
    publisher.publish(&event).await.unwrap();

    // Sender half was dropped with the listener task, so the queue ends empty.
    let next = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("receiver should resolve once the listener is gone");
    assert!(next.is_none());
}

#[test]
fn accept_remote_applies_origin_guard() {
    let me = Origin::generate();
    let other = Origin::generate();
    let mine = Event::new(me, EventKind::ObjectAdded, Some(json!({"id": 1})));
    let theirs = Event::new(other, EventKind::ObjectAdded, Some(json!({"id": 1})));

    assert!(accept_remote(me, &mine.encode().unwrap()).is_none());
    assert_eq!(accept_remote(me, &theirs.encode().unwrap()), Some(theirs));
    assert!(accept_remote(me, "nope").is_none());
}

#[tokio::test]
async fn unreachable_channel_fails_subscribe_and_publish() {
    let relay = Relay::new(Arc::new(FailingSubstrate), CHANNEL, Origin::generate());

    let err = relay.subscribe(|_event| async {}).await.err().expect("subscribe should fail");
    assert!(matches!(err, RelayError::ChannelUnavailable(_)));

    let event = Event::new(Origin::generate(), EventKind::CanvasClear, None);
    let err = relay.publish(&event).await.unwrap_err();
    assert!(matches!(err, RelayError::ChannelUnavailable(_)));
}

#[tokio::test]
async fn ended_subscription_is_reported_as_lost() {
    let (pubsub, feed) = FeedPubSub::new();
    let (_relay, mut handle, mut rx) = collecting_relay(pubsub, Origin::generate()).await;

    let event = Event::new(Origin::generate(), EventKind::ObjectAdded, Some(json!({"id": "before"})));
    feed.send(event.encode().unwrap()).await.unwrap();
    let received = timeout(Duration::from_millis(200), rx.recv())
        .await
        .expect("relay receive timed out")
        .expect("relay channel closed");
    assert_eq!(received, event);

    // Backend drops the subscription mid-run.
    drop(feed);
    timeout(Duration::from_millis(200), handle.lost())
        .await
        .expect("lost subscription should be reported");
    handle.unsubscribe().await;
}

#[tokio::test]
async fn healthy_or_unsubscribed_relay_is_never_lost() {
    let substrate = Arc::new(MemorySubstrate::new());
    let (_relay, mut handle, _rx) = collecting_relay(substrate, Origin::generate()).await;

    assert!(
        timeout(Duration::from_millis(80), handle.lost()).await.is_err(),
        "healthy relay must not report loss"
    );
    handle.unsubscribe().await;
}
