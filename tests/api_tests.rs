use std::sync::Arc;

use axum::body::{Body, HttpBody};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use serde_json::{json, Value};
use tokio::sync::watch;
use tower::ServiceExt;

use chatrelay::api::{self, paths, AppState};
use chatrelay::emitter::EmitterStats;
use chatrelay::notify::LogNotifier;
use chatrelay::relay::RelayEngine;
use chatrelay::settings::Settings;
use chatrelay::transport::TransportStats;

struct TestApp {
    app: Router,
    engine: Arc<RelayEngine>,
    shutdown: watch::Sender<bool>,
}

fn test_app() -> TestApp {
    let engine = Arc::new(RelayEngine::from_settings(
        &Settings::default(),
        Arc::new(LogNotifier),
    ));
    let (shutdown, shutdown_rx) = watch::channel(false);
    let state = AppState::new(
        engine.clone(),
        Arc::new(EmitterStats::default()),
        Arc::new(TransportStats::default()),
        shutdown_rx,
    );
    TestApp {
        app: api::api(state),
        engine,
        shutdown,
    }
}

fn post_json(uri: &str, body: impl Into<String>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.into()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_bytes(response: Response) -> Vec<u8> {
    let mut body = response.into_body();
    let mut bytes = Vec::new();
    while let Some(chunk) = body.data().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    bytes
}

async fn body_json(response: Response) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

fn webhook_body(user_id: &str, text: &str, timestamp: i64) -> String {
    json!({
        "destination": "Ubot",
        "events": [{
            "type": "message",
            "timestamp": timestamp,
            "source": {"type": "user", "userId": user_id},
            "message": {"type": "text", "id": "1", "text": text}
        }]
    })
    .to_string()
}

#[tokio::test]
async fn test_health_and_about() {
    let TestApp { app, .. } = test_app();
    let response = app.clone().oneshot(get(paths::base::HEALTH)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, b"OK");

    let response = app.oneshot(get(paths::base::ABOUT)).await.unwrap();
    let about = body_json(response).await;
    assert_eq!(about["name"], "chatrelay");
    assert_eq!(about["version"], env!("CARGO_PKG_VERSION"));
    assert_eq!(about["events"], paths::stream::EVENTS);
}

#[tokio::test]
async fn test_webhook_relays_text_messages() {
    let TestApp { app, engine, .. } = test_app();
    let mut subscription = engine.subscribers().subscribe();

    let response = app
        .clone()
        .oneshot(post_json(
            paths::intake::WEBHOOK,
            webhook_body("U1", "hello", 1_700_000_000_000),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"status": "OK"}));
    assert_eq!(subscription.recv().await.unwrap().text, "hello");

    // same sender two seconds later, through the legacy path
    let response = app
        .oneshot(post_json(
            paths::intake::WEBHOOK_LEGACY,
            webhook_body("U1", "again", 1_700_000_002_000),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(engine.history().len(), 1);
    assert_eq!(engine.aggregate().pending(), 2);
}

#[tokio::test]
async fn test_webhook_rejects_invalid_json() {
    let TestApp { app, .. } = test_app();
    let response = app
        .oneshot(post_json(paths::intake::WEBHOOK, "{not json"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "api_error");
}

#[tokio::test]
async fn test_post_message_requires_text() {
    let TestApp { app, .. } = test_app();
    for body in [r#"{}"#, r#"{"text": ""}"#] {
        let response = app
            .clone()
            .oneshot(post_json(paths::intake::MESSAGE, body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}

#[tokio::test]
async fn test_posted_messages_are_listed() {
    let TestApp { app, .. } = test_app();
    for text in ["first", "second"] {
        let response = app
            .clone()
            .oneshot(post_json(
                paths::intake::MESSAGE,
                json!({ "text": text }).to_string(),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app.oneshot(get(paths::MESSAGES)).await.unwrap();
    let messages = body_json(response).await;
    let texts: Vec<&str> = messages
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["first", "second"]);
}

#[tokio::test]
async fn test_stats_and_expire_keys() {
    let TestApp { app, engine, .. } = test_app();
    app.clone()
        .oneshot(post_json(
            paths::intake::WEBHOOK,
            // long ago: the entry is already past its window
            webhook_body("U1", "hi", 1_600_000_000_000),
        ))
        .await
        .unwrap();
    assert_eq!(engine.limiter().len(), 1);

    let response = app.clone().oneshot(get(paths::STATS)).await.unwrap();
    let stats = body_json(response).await;
    assert_eq!(stats["tracked_senders"], 1);
    assert_eq!(stats["subscribers"], 0);
    assert_eq!(stats["pending_events"], 1);
    assert_eq!(stats["emitter"]["ticks"], 0);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(paths::EXPIRE_KEYS)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(engine.limiter().is_empty());
}

#[tokio::test]
async fn test_event_stream_delivers_and_ends_on_shutdown() {
    let TestApp {
        app,
        engine,
        shutdown,
    } = test_app();
    let response = app.oneshot(get(paths::stream::EVENTS)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "text/event-stream");
    assert_eq!(engine.subscribers().len(), 1);

    let mut body = response.into_body();
    engine
        .subscribers()
        .broadcast(&chatrelay::subscribers::BroadcastMessage::now("live"));
    let chunk = body.data().await.unwrap().unwrap();
    let frame = String::from_utf8(chunk.to_vec()).unwrap();
    assert!(frame.starts_with("data:"));
    let data = frame
        .lines()
        .find_map(|line| line.strip_prefix("data:"))
        .unwrap();
    let message: Value = serde_json::from_str(data.trim()).unwrap();
    assert_eq!(message["text"], "live");
    assert!(message["timestamp"].is_string());

    shutdown.send(true).unwrap();
    assert!(body.data().await.is_none());
    drop(body);
    assert!(engine.subscribers().is_empty());
}

#[tokio::test]
async fn test_event_stream_unregisters_on_disconnect() {
    let TestApp { app, engine, .. } = test_app();
    let response = app.oneshot(get(paths::stream::EVENTS_LEGACY)).await.unwrap();
    assert_eq!(engine.subscribers().len(), 1);
    drop(response);
    assert!(engine.subscribers().is_empty());
}
