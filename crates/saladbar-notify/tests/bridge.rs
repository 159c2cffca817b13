//! End-to-end tests driving the bridge with a real websocket client.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::Path;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

use saladbar_notify::broker::{BrokerPool, PoolConfig, Relay, SharedBrokerPool};
use saladbar_notify::config::NotifyConfig;
use saladbar_notify::create_router;
use saladbar_notify::state::AppState;
use saladbar_notify::validator::PathValidator;
use saladbar_proto::ChangePayload;

const TIMEOUT: Duration = Duration::from_secs(5);

type WsStream = tokio_tungstenite::WebSocketStream<
    tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
>;

static NEXT_URL: AtomicUsize = AtomicUsize::new(0);

struct TestBridge {
    addr: String,
    broker: SharedBrokerPool,
    _relay: Relay,
}

impl TestBridge {
    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    async fn connect(&self, path: &str) -> WsStream {
        let (ws, _) = timeout(TIMEOUT, connect_async(self.ws_url(path)))
            .await
            .expect("connect timed out")
            .expect("connect failed");
        ws
    }
}

/// Resource API stand-in: salads below 500 exist.
async fn boot_resource_api() -> String {
    async fn salad(Path(id): Path<u32>) -> StatusCode {
        if id < 500 {
            StatusCode::OK
        } else {
            StatusCode::NOT_FOUND
        }
    }

    let app = Router::new()
        .route("/api/salads", get(|| async { StatusCode::OK }))
        .route("/api/salads/:id", get(salad));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

async fn boot_with(max_subscribers: usize) -> TestBridge {
    let n = NEXT_URL.fetch_add(1, Ordering::Relaxed);
    let relay = Relay::bind(
        &format!("inproc://bridge-test-in-{}", n),
        &format!("inproc://bridge-test-out-{}", n),
    )
    .unwrap();

    let config = NotifyConfig::default()
        .with_broker(relay.ingress_url(), relay.egress_url())
        .with_max_subscribers(max_subscribers)
        .with_acquire_timeout(Duration::from_millis(100))
        .with_poll_interval(Duration::from_millis(10));

    let broker = Arc::new(BrokerPool::connect(PoolConfig::from(&config)).unwrap());
    let validator = PathValidator::new(boot_resource_api().await, Duration::from_secs(2)).unwrap();
    let app = create_router(AppState::new(broker.clone(), validator, config));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestBridge {
        addr,
        broker,
        _relay: relay,
    }
}

async fn boot() -> TestBridge {
    boot_with(16).await
}

async fn send_json(ws: &mut WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

async fn recv_json(ws: &mut WsStream) -> Value {
    loop {
        let msg = timeout(TIMEOUT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}

/// Wait for the close frame and return its code and reason.
async fn recv_close(ws: &mut WsStream) -> (u16, String) {
    let msg = timeout(TIMEOUT, ws.next())
        .await
        .expect("timed out waiting for close")
        .expect("stream ended")
        .expect("websocket error");
    match msg {
        Message::Close(Some(frame)) => (u16::from(frame.code), frame.reason.as_str().to_string()),
        other => panic!("expected a close frame, got {:?}", other),
    }
}

#[tokio::test]
async fn test_initial_path_subscribes_and_forwards_changes() {
    let bridge = boot().await;
    let mut ws = bridge.connect("/api/salads/123/ws").await;

    assert_eq!(
        recv_json(&mut ws).await,
        json!({"function": "subscribe", "path": "/api/salads/123"})
    );

    // The subscriber may still be attaching to the relay, so keep publishing
    // until the change shows up.
    let payload = ChangePayload::created(json!({"name": "tomato"}));
    let mut received = None;
    for _ in 0..100 {
        bridge.broker.publish("/api/salads/123", &payload).unwrap();
        if let Ok(Some(Ok(Message::Text(text)))) =
            timeout(Duration::from_millis(50), ws.next()).await
        {
            received = Some(serde_json::from_str::<Value>(text.as_str()).unwrap());
            break;
        }
    }

    assert_eq!(
        received.expect("change was never forwarded"),
        json!({
            "function": "message",
            "path": "/api/salads/123",
            "data": {"name": "tomato"},
            "type": "CREATE"
        })
    );
}

#[tokio::test]
async fn test_subscribe_nonexistent_resource() {
    let bridge = boot().await;
    let mut ws = bridge.connect("/").await;

    send_json(&mut ws, json!({"function": "subscribe", "path": "/api/salads/999"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"error": "Invalid path: /api/salads/999"})
    );

    send_json(&mut ws, json!({"function": "ls"})).await;
    assert_eq!(recv_json(&mut ws).await, json!([]));
}

#[tokio::test]
async fn test_malformed_frames_keep_connection_open() {
    let bridge = boot().await;
    let mut ws = bridge.connect("/").await;

    ws.send(Message::Text("not json".into())).await.unwrap();
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"error": "Message is not json loadable."})
    );

    send_json(&mut ws, json!(["/api/salads"])).await;
    assert_eq!(recv_json(&mut ws).await, json!({"error": "Message must be a dict."}));

    send_json(&mut ws, json!({"function": "drop"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"error": "function must be one of: ls, subscribe, unsubscribe."})
    );

    send_json(&mut ws, json!({"function": "subscribe"})).await;
    assert_eq!(recv_json(&mut ws).await, json!({"error": "Missing path."}));

    ws.send(Message::Binary(vec![1, 2, 3].into())).await.unwrap();
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"error": "Message is not json loadable."})
    );

    send_json(&mut ws, json!({"function": "subscribe", "path": "/api/salads"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"function": "subscribe", "path": "/api/salads"})
    );
}

#[tokio::test]
async fn test_invalid_initial_path_closes_connection() {
    let bridge = boot().await;
    let mut ws = bridge.connect("/salads/1/ws").await;

    let (code, reason) = recv_close(&mut ws).await;
    assert_eq!(code, 4000);
    assert_eq!(reason, "Invalid path.");
}

#[tokio::test]
async fn test_subscription_commands() {
    let bridge = boot().await;
    let mut ws = bridge.connect("/").await;

    for path in ["/api/salads/9", "/api/salads/10/", "/api/salads"] {
        send_json(&mut ws, json!({"function": "subscribe", "path": path})).await;
        let ack = recv_json(&mut ws).await;
        assert_eq!(ack["function"], "subscribe");
    }

    send_json(&mut ws, json!({"function": "ls"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!(["/api/salads", "/api/salads/10", "/api/salads/9"])
    );

    send_json(&mut ws, json!({"function": "subscribe", "path": "/api/salads/9/ws"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"error": "Already subscribed to path: /api/salads/9"})
    );

    send_json(&mut ws, json!({"function": "unsubscribe", "path": "/api/salads/10"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"function": "unsubscribe", "path": "/api/salads/10"})
    );

    send_json(&mut ws, json!({"function": "unsubscribe", "path": "/api/salads/10"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"error": "Not subscribed to path: /api/salads/10"})
    );

    send_json(&mut ws, json!({"function": "ls"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!(["/api/salads", "/api/salads/9"])
    );
}

#[tokio::test]
async fn test_pool_exhausted_closes_connection() {
    let bridge = boot_with(1).await;

    let mut first = bridge.connect("/").await;
    send_json(&mut first, json!({"function": "ls"})).await;
    assert_eq!(recv_json(&mut first).await, json!([]));

    let mut second = bridge.connect("/").await;
    let (code, reason) = recv_close(&mut second).await;
    assert_eq!(code, 1013);
    assert_eq!(reason, "Try again later.");
}

#[tokio::test]
async fn test_health_reports_subscribers() {
    let bridge = boot().await;
    let health_url = format!("http://{}/health", bridge.addr);

    let mut ws = bridge.connect("/").await;
    send_json(&mut ws, json!({"function": "ls"})).await;
    assert_eq!(recv_json(&mut ws).await, json!([]));

    let body: Value = reqwest::get(&health_url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "saladbar-notify");
    assert_eq!(body["subscribers"], json!({"active": 1, "max": 16}));

    ws.close(None).await.unwrap();
    drop(ws);

    // The handle is released once the server notices the close.
    let mut active = None;
    for _ in 0..50 {
        let body: Value = reqwest::get(&health_url).await.unwrap().json().await.unwrap();
        active = body["subscribers"]["active"].as_u64();
        if active == Some(0) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(active, Some(0));
}

#[tokio::test]
async fn test_events_survive_interleaved_commands() {
    const CHANGES: u64 = 20;

    let bridge = boot().await;
    let mut ws = bridge.connect("/api/salads/1/ws").await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"function": "subscribe", "path": "/api/salads/1"})
    );

    send_json(&mut ws, json!({"function": "subscribe", "path": "/api/salads/2"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!({"function": "subscribe", "path": "/api/salads/2"})
    );

    // Wait until the subscriber is attached to the relay before counting.
    let warmup = ChangePayload::created(json!({"warmup": true}));
    let mut attached = false;
    for _ in 0..100 {
        bridge.broker.publish("/api/salads/1", &warmup).unwrap();
        if let Ok(Some(Ok(Message::Text(_)))) = timeout(Duration::from_millis(50), ws.next()).await {
            attached = true;
            break;
        }
    }
    assert!(attached, "subscriber never attached");

    // Even steps drop /api/salads/2 and odd steps take it back, so every
    // command succeeds and the set ends where it started.
    for seq in 0..CHANGES {
        let change = ChangePayload::created(json!({"seq": seq}));
        bridge.broker.publish("/api/salads/1", &change).unwrap();

        send_json(&mut ws, json!({"function": "ls"})).await;
        let function = if seq % 2 == 0 { "unsubscribe" } else { "subscribe" };
        send_json(&mut ws, json!({"function": function, "path": "/api/salads/2"})).await;

        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let mut seqs = Vec::new();
    let mut listings = 0;
    let mut acks = Vec::new();
    while seqs.len() < CHANGES as usize || listings < CHANGES || acks.len() < CHANGES as usize {
        let frame = recv_json(&mut ws).await;
        match &frame {
            Value::Array(_) => listings += 1,
            Value::Object(fields) if fields.contains_key("error") => {
                panic!("unexpected error reply: {}", frame)
            }
            Value::Object(fields) => match fields["function"].as_str() {
                Some("message") => {
                    assert_eq!(fields["path"], "/api/salads/1");
                    if let Some(seq) = fields["data"]["seq"].as_u64() {
                        seqs.push(seq);
                    }
                }
                Some(function) => {
                    assert_eq!(fields["path"], "/api/salads/2");
                    acks.push(function.to_string());
                }
                None => panic!("unexpected frame: {}", frame),
            },
            other => panic!("unexpected frame: {}", other),
        }
    }

    assert_eq!(seqs, (0..CHANGES).collect::<Vec<_>>());
    let expected_acks: Vec<String> = (0..CHANGES)
        .map(|seq| if seq % 2 == 0 { "unsubscribe" } else { "subscribe" }.to_string())
        .collect();
    assert_eq!(acks, expected_acks);

    send_json(&mut ws, json!({"function": "ls"})).await;
    assert_eq!(
        recv_json(&mut ws).await,
        json!(["/api/salads/1", "/api/salads/2"])
    );
}
