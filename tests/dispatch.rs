//! End-to-end tests of the publish/dispatch/wait protocol over the
//! in-process broker: one shared queue, many patterns, consumers that only
//! accept their own messages.

use std::{
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use serde_json::{Value, json};

use notiq::{
    Config, Dispatcher, HandlerRegistry, MemoryBroker, PatternWaiter, Publisher, UserEvent,
    UserEventPublisher,
    broker::{Channel as _, Properties},
    notifier, pattern,
};

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn broker() -> MemoryBroker {
    init_tracing();
    MemoryBroker::new(Config::default().with_queue("q").with_channel_size(16))
}

#[tokio::test]
async fn test_mismatched_dispatcher_requeues_without_invoking_handlers() {
    let broker = broker();
    let channel = broker.channel();
    let invoked = Arc::new(AtomicUsize::new(0));

    // A consumer interested only in user.updated.
    let i = invoked.clone();
    let registry = HandlerRegistry::new().on(pattern::USER_UPDATED, move |_| {
        let i = i.clone();
        async move {
            i.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    let subscription = Dispatcher::new(channel.clone())
        .listen("q", registry)
        .await
        .unwrap();

    Publisher::new(channel.clone(), "q")
        .publish(
            pattern::USER_CREATED,
            &json!({"id": "1", "name": "Ann", "email": "a@x.com"}),
        )
        .await
        .unwrap();

    // The dispatcher keeps declining the message; a waiter sharing the
    // queue must still be able to pick it up.
    let payload: Option<Value> = PatternWaiter::new(channel)
        .await_pattern("q", pattern::USER_CREATED, Duration::from_secs(2))
        .await
        .unwrap();

    assert_eq!(
        payload,
        Some(json!({"id": "1", "name": "Ann", "email": "a@x.com"}))
    );
    assert_eq!(invoked.load(Ordering::SeqCst), 0);
    subscription.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_waiter_observes_published_event_within_timeout() {
    let broker = broker();
    let channel = broker.channel();

    Publisher::new(channel.clone(), "q")
        .publish(pattern::USER_UPDATED, &json!({"id": "1", "name": "Ann2"}))
        .await
        .unwrap();

    let payload: Option<Value> = PatternWaiter::new(channel)
        .await_pattern("q", pattern::USER_UPDATED, Duration::from_millis(2000))
        .await
        .unwrap();
    assert_eq!(payload, Some(json!({"id": "1", "name": "Ann2"})));
}

#[tokio::test]
async fn test_waiter_times_out_and_fully_cancels() {
    let broker = broker();
    let channel = broker.channel();
    let waiter = PatternWaiter::new(channel.clone());

    let start = Instant::now();
    let payload: Option<Value> = waiter
        .await_pattern("q", pattern::USER_DELETED, Duration::from_millis(500))
        .await
        .unwrap();
    let elapsed = start.elapsed();

    assert!(payload.is_none());
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(1500), "timed out too slowly");

    // The timed-out subscription must be gone: a message published now is
    // still there for a fresh consumer, not swallowed by the old one.
    Publisher::new(channel.clone(), "q")
        .publish(pattern::USER_DELETED, &json!({"id": "9"}))
        .await
        .unwrap();
    let payload: Option<Value> = waiter
        .await_pattern("q", pattern::USER_DELETED, Duration::from_secs(1))
        .await
        .unwrap();
    assert_eq!(payload, Some(json!({"id": "9"})));
}

#[tokio::test]
async fn test_malformed_message_does_not_poison_the_queue() {
    let broker = broker();
    let channel = broker.channel();

    // Raw bytes that are not an envelope at all.
    channel
        .publish("q", b"{not really json".to_vec(), Properties::persistent_json())
        .await
        .unwrap();
    Publisher::new(channel.clone(), "q")
        .publish(pattern::USER_CREATED, &json!({"id": "2", "name": "Bo"}))
        .await
        .unwrap();

    let waiter = PatternWaiter::new(channel);
    let payload: Option<Value> = waiter
        .await_pattern("q", pattern::USER_CREATED, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(payload, Some(json!({"id": "2", "name": "Bo"})));

    // The bad message was rejected, not requeued: nothing is left behind.
    let leftover: Option<Value> = waiter
        .await_pattern("q", pattern::USER_CREATED, Duration::from_millis(300))
        .await
        .unwrap();
    assert!(leftover.is_none());
}

#[tokio::test]
async fn test_zero_timeout_with_pending_mismatch_returns_none() {
    let broker = broker();
    let channel = broker.channel();
    Publisher::new(channel.clone(), "q")
        .publish(pattern::USER_CREATED, &json!({"id": "1"}))
        .await
        .unwrap();

    let payload: Option<Value> = PatternWaiter::new(channel)
        .await_pattern("q", pattern::USER_UPDATED, Duration::ZERO)
        .await
        .unwrap();
    assert!(payload.is_none());
}

#[tokio::test]
async fn test_notifier_consumes_all_three_user_patterns() {
    let broker = broker();
    let channel = broker.channel();

    let subscription = Dispatcher::new(channel.clone())
        .listen("q", notifier::user_event_handlers())
        .await
        .unwrap();

    let users = UserEventPublisher::new(Publisher::new(channel.clone(), "q"));
    let user = UserEvent {
        id: "1".into(),
        name: "Ann".into(),
        email: "a@x.com".into(),
        created_at: Some("2024-05-01T10:00:00Z".into()),
    };
    users.publish_created(&user).await.unwrap();
    users.publish_updated(&user).await.unwrap();
    users.publish_deleted(&user).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    subscription.shutdown().await.unwrap();

    // Everything was accepted and acked; the queue holds nothing for a
    // later consumer.
    let waiter = PatternWaiter::new(channel);
    for p in [
        pattern::USER_CREATED,
        pattern::USER_UPDATED,
        pattern::USER_DELETED,
    ] {
        let leftover: Option<UserEvent> = waiter
            .await_pattern("q", p, Duration::from_millis(200))
            .await
            .unwrap();
        assert!(leftover.is_none(), "pattern {p} was not consumed");
    }
}

#[tokio::test]
async fn test_typed_payload_round_trip_through_the_queue() {
    let broker = broker();
    let channel = broker.channel();

    let users = UserEventPublisher::new(Publisher::new(channel.clone(), "q"));
    let user = UserEvent {
        id: "42".into(),
        name: "Ann".into(),
        email: "a@x.com".into(),
        created_at: None,
    };
    users.publish_updated(&user).await.unwrap();

    let received: Option<UserEvent> = PatternWaiter::new(channel)
        .await_pattern("q", pattern::USER_UPDATED, Duration::from_secs(2))
        .await
        .unwrap();
    assert_eq!(received, Some(user));
}

#[tokio::test]
async fn test_two_dispatchers_split_the_queue_by_pattern() {
    let broker = broker();
    let channel = broker.channel();
    let created = Arc::new(AtomicUsize::new(0));
    let deleted = Arc::new(AtomicUsize::new(0));

    let c = created.clone();
    let created_only = HandlerRegistry::new().on(pattern::USER_CREATED, move |_| {
        let c = c.clone();
        async move {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });
    let d = deleted.clone();
    let deleted_only = HandlerRegistry::new().on(pattern::USER_DELETED, move |_| {
        let d = d.clone();
        async move {
            d.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    });

    let dispatcher = Dispatcher::new(channel.clone());
    let first = dispatcher.listen("q", created_only).await.unwrap();
    let second = dispatcher.listen("q", deleted_only).await.unwrap();

    let publisher = Publisher::new(channel, "q");
    publisher
        .publish(pattern::USER_CREATED, &json!({"id": "1"}))
        .await
        .unwrap();
    publisher
        .publish(pattern::USER_DELETED, &json!({"id": "1"}))
        .await
        .unwrap();

    // Whichever consumer a message lands on first, requeue-on-mismatch
    // must walk it over to the right one.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(deleted.load(Ordering::SeqCst), 1);

    first.shutdown().await.unwrap();
    second.shutdown().await.unwrap();
}
