use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use tokio::sync::mpsc;

use chatrelay::aggregate::{AggregateStore, Snapshot};
use chatrelay::error::{RelayError, Result};
use chatrelay::limiters::RateLimiter;
use chatrelay::notify::{LogNotifier, Notifier};
use chatrelay::relay::{EventSource, InboundEvent, RelayEngine};
use chatrelay::settings::{
    AggregateMode, CountingPolicy, RateLimitSettings, Settings, Vocabulary,
};
use chatrelay::subscribers::{
    BroadcastMessage, MessageHistory, SubscriberHandle, SubscriberRegistry,
};

/// Forwards every notice to a channel so tests can await it
struct RecordingNotifier {
    tx: mpsc::UnboundedSender<(String, String)>,
    fail: bool,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, sender_id: &str, message: &str) -> Result<()> {
        let _ = self.tx.send((sender_id.to_string(), message.to_string()));
        if self.fail {
            Err(RelayError::Notify("push endpoint down".to_string()))
        } else {
            Ok(())
        }
    }
}

fn t(seconds: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap() + Duration::seconds(seconds)
}

fn engine_with(
    mode: AggregateMode,
    counting: CountingPolicy,
    fail_notify: bool,
) -> (RelayEngine, mpsc::UnboundedReceiver<(String, String)>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let engine = RelayEngine::new(
        Arc::new(RateLimiter::new(RateLimitSettings { window_seconds: 5 })),
        Arc::new(AggregateStore::new(&mode)),
        Arc::new(SubscriberRegistry::new(16)),
        Arc::new(MessageHistory::new(16)),
        Arc::new(RecordingNotifier {
            tx,
            fail: fail_notify,
        }),
        counting,
        "Too many messages. Please wait 5 seconds before sending again.",
    );
    (engine, rx)
}

#[tokio::test]
async fn test_rate_limited_sender_is_notified_not_broadcast() {
    let (engine, mut notices) =
        engine_with(AggregateMode::FreeForm, CountingPolicy::Always, false);
    let mut subscription = engine.subscribers().subscribe();

    let report = engine.process_batch(vec![
        InboundEvent::from_user("U1", "hello", t(0)),
        InboundEvent::from_user("U1", "again", t(2)),
    ]);
    assert_eq!(report.broadcast, 1);
    assert_eq!(report.rate_limited, 1);

    assert_eq!(subscription.recv().await.unwrap().text, "hello");
    let (sender, notice) = notices.recv().await.unwrap();
    assert_eq!(sender, "U1");
    assert!(notice.contains("5 seconds"));

    let report = engine.process_batch(vec![InboundEvent::from_user("U1", "later", t(6))]);
    assert_eq!(report.broadcast, 1);
    assert_eq!(subscription.recv().await.unwrap().text, "later");
    assert_eq!(engine.limiter().last_accepted_at("U1"), Some(t(6)));
}

#[tokio::test]
async fn test_notifier_failure_does_not_affect_batch() {
    let (engine, mut notices) =
        engine_with(AggregateMode::FreeForm, CountingPolicy::Always, true);
    let report = engine.process_batch(vec![
        InboundEvent::from_user("U1", "a", t(0)),
        InboundEvent::from_user("U1", "b", t(1)),
        InboundEvent::from_user("U2", "c", t(1)),
    ]);
    assert_eq!(report.broadcast, 2);
    assert_eq!(report.rate_limited, 1);
    assert_eq!(notices.recv().await.unwrap().0, "U1");
}

#[tokio::test]
async fn test_senders_are_limited_independently() {
    let (engine, _notices) = engine_with(AggregateMode::FreeForm, CountingPolicy::Always, false);
    let report = engine.process_batch(vec![
        InboundEvent::from_user("U1", "a", t(0)),
        InboundEvent::from_user("U2", "b", t(0)),
        InboundEvent::new(
            EventSource::Group {
                group_id: "G1".to_string(),
                user_id: Some("U3".to_string()),
            },
            "c",
            t(0),
        ),
    ]);
    assert_eq!(report.broadcast, 3);
    assert_eq!(engine.limiter().len(), 3);
}

#[tokio::test]
async fn test_group_message_without_user_is_anonymous() {
    let (engine, _notices) = engine_with(AggregateMode::FreeForm, CountingPolicy::Always, false);
    let source = EventSource::Room {
        room_id: "R1".to_string(),
        user_id: None,
    };
    let report = engine.process_batch(vec![
        InboundEvent::new(source.clone(), "x", t(0)),
        InboundEvent::new(source, "y", t(1)),
    ]);
    assert_eq!(report.broadcast, 2);
    assert!(engine.limiter().is_empty());
}

#[tokio::test]
async fn test_vocabulary_counts_filter_but_broadcast_everything() {
    let vocabulary = Vocabulary::parse("xkh").unwrap();
    let (engine, _notices) = engine_with(
        AggregateMode::Vocabulary(vocabulary),
        CountingPolicy::Always,
        false,
    );
    let mut subscription = engine.subscribers().subscribe();

    let events = vec![
        InboundEvent::anonymous("k"),
        InboundEvent::anonymous("K"),
        InboundEvent::anonymous("k"),
        InboundEvent::anonymous("zz"),
    ];
    let report = engine.process_batch(events);
    assert_eq!(report.broadcast, 4);
    assert_eq!(report.counted, 3);

    for expected in ["k", "K", "k", "zz"] {
        assert_eq!(subscription.recv().await.unwrap().text, expected);
    }

    match engine.aggregate().snapshot_and_reset() {
        Snapshot::Vocabulary(snapshot) => assert_eq!(snapshot.counts(), &[0, 3, 0]),
        other => panic!("unexpected snapshot {:?}", other),
    }
}

#[tokio::test]
async fn test_counting_policy_always_counts_rate_limited_events() {
    let (engine, _notices) = engine_with(AggregateMode::FreeForm, CountingPolicy::Always, false);
    engine.process_batch(vec![
        InboundEvent::from_user("U1", "vote", t(0)),
        InboundEvent::from_user("U1", "vote", t(1)),
        InboundEvent::from_user("U1", "vote", t(2)),
    ]);
    match engine.aggregate().snapshot_and_reset() {
        Snapshot::FreeForm(snapshot) => {
            assert_eq!(snapshot.counts.get("vote"), Some(&3));
            assert_eq!(
                snapshot.timestamps.get("vote"),
                Some(&t(2).timestamp_millis())
            );
        }
        other => panic!("unexpected snapshot {:?}", other),
    }
}

#[tokio::test]
async fn test_counting_policy_accepted_only() {
    let (engine, _notices) =
        engine_with(AggregateMode::FreeForm, CountingPolicy::AcceptedOnly, false);
    engine.process_batch(vec![
        InboundEvent::from_user("U1", "vote", t(0)),
        InboundEvent::from_user("U1", "vote", t(1)),
        InboundEvent::anonymous("vote"),
    ]);
    assert_eq!(engine.aggregate().pending(), 2);
}

#[tokio::test]
async fn test_dead_subscriber_is_pruned_during_relay() {
    let (engine, _notices) = engine_with(AggregateMode::FreeForm, CountingPolicy::Always, false);
    let registry = engine.subscribers();

    let (a, mut rx_a) = SubscriberHandle::channel(4);
    let (b, rx_b) = SubscriberHandle::channel(4);
    let (c, mut rx_c) = SubscriberHandle::channel(4);
    let b_id = b.id();
    for handle in [a, b, c] {
        assert!(registry.register(handle));
    }
    drop(rx_b);

    engine.process_batch(vec![InboundEvent::anonymous("one")]);
    assert!(!registry.contains(b_id));
    assert_eq!(registry.len(), 2);

    engine.process_batch(vec![InboundEvent::anonymous("two")]);
    for rx in [&mut rx_a, &mut rx_c] {
        assert_eq!(rx.recv().await.unwrap().text, "one");
        assert_eq!(rx.recv().await.unwrap().text, "two");
    }
    assert_eq!(registry.get_stats().pruned, 1);
}

#[tokio::test]
async fn test_empty_batch_has_no_effect() {
    let (engine, _notices) = engine_with(AggregateMode::FreeForm, CountingPolicy::Always, false);
    let report = engine.process_batch(Vec::new());
    assert_eq!(report.events, 0);
    assert!(engine.history().is_empty());
    assert_eq!(engine.aggregate().pending(), 0);
}

#[tokio::test]
async fn test_engine_from_settings() {
    let mut settings = Settings::default();
    settings.rate_limit.window_seconds = 9;
    settings.counting_policy = CountingPolicy::AcceptedOnly;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let engine = RelayEngine::from_settings(
        &settings,
        Arc::new(RecordingNotifier { tx, fail: false }),
    );
    assert_eq!(engine.counting_policy(), CountingPolicy::AcceptedOnly);
    assert_eq!(engine.limiter().get_settings().window_seconds, 9);

    engine.process_batch(vec![
        InboundEvent::from_user("U1", "a", t(0)),
        InboundEvent::from_user("U1", "b", t(8)),
    ]);
    let (_, notice) = rx.recv().await.unwrap();
    assert_eq!(
        notice,
        "Too many messages. Please wait 9 seconds before sending again."
    );
}

#[tokio::test]
async fn test_broadcast_without_subscribers_leaves_registry_untouched() {
    let engine = RelayEngine::from_settings(&Settings::default(), Arc::new(LogNotifier));
    let registry = engine.subscribers();
    let report = registry.broadcast(&BroadcastMessage::now("nobody"));
    assert_eq!(report.delivered, 0);
    assert_eq!(registry.get_stats().broadcasts, 0);
    assert!(engine.history().is_empty());

    // accepted messages are still kept for the viewer
    engine.process_batch(vec![InboundEvent::anonymous("seen")]);
    assert_eq!(registry.get_stats().broadcasts, 0);
    let texts: Vec<String> = engine
        .history()
        .recent()
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, vec!["seen"]);
}
