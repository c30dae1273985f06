//! Gateway integration tests.
//!
//! Drives the client against a mock websocket server that speaks the
//! gateway protocol, covering the handshake, heartbeats, resumption and
//! the close/reconnect lifecycle.

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tether_gateway::{ConnectionState, Gateway, GatewayBuilder, GatewayConfig, GatewayError, ReconnectConfig};
use tether_proto::{Event, Frame, OpCode};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const WAIT: Duration = Duration::from_secs(5);
const SLOW_HEARTBEAT_MS: u64 = 45_000;

// ============================================================================
// Test Helpers - Mock Gateway Server
// ============================================================================

/// A mock gateway server for testing.
struct MockGateway {
    listener: TcpListener,
    addr: SocketAddr,
}

impl MockGateway {
    /// Create a new mock gateway bound to an available port.
    async fn new() -> Result<Self, std::io::Error> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        Ok(Self { listener, addr })
    }

    /// Get the WebSocket URL for this gateway.
    fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    /// Accept a single connection and return the WebSocket stream.
    async fn accept(&self) -> WebSocketStream<TcpStream> {
        let (stream, _) = timeout(WAIT, self.listener.accept())
            .await
            .expect("timed out waiting for a connection")
            .expect("accept failed");
        accept_async(stream).await.expect("websocket upgrade failed")
    }

    /// Accept a connection, send Hello, and return the client's first frame.
    async fn accept_and_hello(&self, heartbeat_ms: u64) -> (WebSocketStream<TcpStream>, Value) {
        let mut ws = self.accept().await;
        send_json(&mut ws, json!({"op": 10, "d": {"heartbeat_interval": heartbeat_ms}})).await;
        let first = recv_frame(&mut ws).await;
        (ws, first)
    }
}

async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("failed to send frame");
}

/// Next text frame from the client, parsed as JSON.
async fn recv_frame(ws: &mut WebSocketStream<TcpStream>) -> Value {
    loop {
        let msg = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("client hung up")
            .expect("read failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("frame is not JSON");
        }
    }
}

/// Next frame with opcode `op`, skipping others such as heartbeats.
async fn recv_op(ws: &mut WebSocketStream<TcpStream>, op: u64) -> Value {
    loop {
        let frame = recv_frame(ws).await;
        if frame["op"] == op {
            return frame;
        }
    }
}

/// Read until the client closes the connection.
async fn drain_until_closed(ws: &mut WebSocketStream<TcpStream>) {
    while let Ok(Some(Ok(msg))) = timeout(WAIT, ws.next()).await {
        if msg.is_close() {
            break;
        }
    }
}

fn ready(seq: u64, session_id: &str) -> Value {
    json!({
        "op": 0,
        "s": seq,
        "t": "READY",
        "d": {
            "v": 6,
            "session_id": session_id,
            "user": {"id": "1", "username": "tether", "discriminator": "0001", "avatar": null, "bot": true},
            "guilds": []
        }
    })
}

fn dispatch(seq: u64, name: &str, data: Value) -> Value {
    json!({"op": 0, "s": seq, "t": name, "d": data})
}

// ============================================================================
// Test Helpers - Client
// ============================================================================

struct Client {
    gateway: Gateway,
    events: mpsc::Receiver<Event>,
    errors: mpsc::UnboundedReceiver<String>,
    closes: mpsc::UnboundedReceiver<Option<String>>,
}

impl Client {
    fn new(url: String, config: GatewayConfig) -> Self {
        let (error_tx, errors) = mpsc::unbounded_channel();
        let (close_tx, closes) = mpsc::unbounded_channel();

        let (gateway, events) = GatewayBuilder::new(url, "test-token")
            .with_config(config)
            .with_error_log(move |err| {
                let _ = error_tx.send(err.to_string());
            })
            .with_after_close(move |err| {
                let _ = close_tx.send(err.map(ToString::to_string));
            })
            .build()
            .expect("valid config");

        Self {
            gateway,
            events,
            errors,
            closes,
        }
    }

    async fn next_event(&mut self) -> Event {
        timeout(WAIT, self.events.recv())
            .await
            .expect("timed out waiting for an event")
            .expect("event queue closed")
    }

    /// Wait until an error containing `needle` is reported.
    async fn expect_error(&mut self, needle: &str) {
        loop {
            let err = timeout(WAIT, self.errors.recv())
                .await
                .unwrap_or_else(|_| panic!("timed out waiting for error containing {needle:?}"))
                .expect("error log closed");
            if err.contains(needle) {
                return;
            }
        }
    }
}

// ============================================================================
// Handshake Tests
// ============================================================================

#[tokio::test]
async fn test_identify_then_ready() {
    // Arrange: mock gateway that identifies one session and sends one message
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut ws, identify) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        assert_eq!(identify["op"], 2);
        assert_eq!(identify["d"]["token"], "test-token");
        assert!(identify["d"]["properties"]["$os"].is_string());

        send_json(&mut ws, ready(1, "abc")).await;

        // The pacemaker beats as soon as the handshake is done.
        let heartbeat = recv_frame(&mut ws).await;
        assert_eq!(heartbeat["op"], 1);
        assert_eq!(heartbeat["d"], 1);
        send_json(&mut ws, json!({"op": 11})).await;

        send_json(
            &mut ws,
            dispatch(2, "MESSAGE_CREATE", json!({"id": "10", "channel_id": "20", "content": "hello"})),
        )
        .await;
        drain_until_closed(&mut ws).await;
    });

    // Act
    client.gateway.open().await.expect("open failed");

    // Assert
    assert_eq!(client.gateway.state(), ConnectionState::Connected);
    match client.next_event().await {
        Event::Ready(ready) => assert_eq!(ready.session_id, "abc"),
        other => panic!("expected Ready, got {other:?}"),
    }
    match client.next_event().await {
        Event::MessageCreate(message) => assert_eq!(message.content, "hello"),
        other => panic!("expected MessageCreate, got {other:?}"),
    }
    assert_eq!(client.gateway.session_id().as_deref(), Some("abc"));
    assert_eq!(client.gateway.sequence(), 2);

    client.gateway.close().await.expect("close failed");
    assert_eq!(client.gateway.state(), ConnectionState::Idle);
    assert_eq!(client.closes.recv().await, Some(None));

    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_wrong_first_opcode_fails_open() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let mut ws = mock.accept().await;
        send_json(&mut ws, json!({"op": 11})).await;
        drain_until_closed(&mut ws).await;
    });

    let err = client.gateway.open().await.unwrap_err();
    assert!(matches!(
        err,
        GatewayError::UnexpectedOpCode {
            expected: OpCode::Hello,
            got: OpCode::HeartbeatAck
        }
    ));
    assert_eq!(client.gateway.state(), ConnectionState::Idle);

    let closed = client.closes.recv().await.expect("after-close hook not called");
    assert!(closed.expect("close should carry the cause").contains("unexpected opcode"));

    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_handshake_timeout() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let config = GatewayConfig {
        timeout_secs: 1,
        ..GatewayConfig::default()
    };
    let client = Client::new(mock.url(), config);

    let server = tokio::spawn(async move {
        // Hello and Identify go through, but READY never comes.
        let (mut ws, identify) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        assert_eq!(identify["op"], 2);
        drain_until_closed(&mut ws).await;
    });

    let err = client.gateway.open().await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout { stage: "handshake", .. }));
    assert_eq!(client.gateway.state(), ConnectionState::Idle);

    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_frame_tap_sees_hello() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let (tap_tx, mut tap_rx) = mpsc::channel::<Frame>(16);
    let (gateway, _events) = GatewayBuilder::new(mock.url(), "test-token")
        .with_frame_tap(tap_tx)
        .build()
        .expect("valid config");

    let server = tokio::spawn(async move {
        let (mut ws, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut ws, ready(1, "abc")).await;
        drain_until_closed(&mut ws).await;
    });

    gateway.open().await.expect("open failed");

    let hello = tap_rx.recv().await.expect("tap closed");
    assert_eq!(hello.op, OpCode::Hello);
    let ready = tap_rx.recv().await.expect("tap closed");
    assert!(ready.is_dispatch_of("READY"));

    gateway.close().await.expect("close failed");
    server.await.expect("server task panicked");
}

// ============================================================================
// Heartbeat Tests
// ============================================================================

#[tokio::test]
async fn test_server_requested_heartbeat() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut ws, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut ws, ready(4, "abc")).await;

        let scheduled = recv_op(&mut ws, 1).await;
        assert_eq!(scheduled["d"], 4);

        // The next scheduled beat is 45s away, so this one answers the request.
        send_json(&mut ws, json!({"op": 1})).await;
        let requested = recv_op(&mut ws, 1).await;
        assert_eq!(requested["d"], 4);

        drain_until_closed(&mut ws).await;
    });

    client.gateway.open().await.expect("open failed");
    // Give the server time to request and receive the extra beat.
    tokio::time::sleep(Duration::from_millis(200)).await;
    client.gateway.close().await.ok();
    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_missing_acks_trigger_resume() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        // First connection beats fast and never acknowledges.
        let (mut first, identify) = mock.accept_and_hello(50).await;
        assert_eq!(identify["op"], 2);
        send_json(&mut first, ready(1, "abc")).await;

        let (mut second, resume) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        assert_eq!(resume["op"], 6);
        assert_eq!(resume["d"]["session_id"], "abc");
        assert_eq!(resume["d"]["seq"], 1);
        send_json(&mut second, dispatch(2, "RESUMED", json!({}))).await;

        drain_until_closed(&mut second).await;
        drop(first);
    });

    client.gateway.open().await.expect("open failed");
    assert!(matches!(client.next_event().await, Event::Ready(_)));

    client.expect_error("no heartbeat replied").await;
    assert!(matches!(client.next_event().await, Event::Resumed));
    assert_eq!(client.gateway.sequence(), 2);

    client.gateway.close().await.ok();
    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_stray_frames_keep_connection_up() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut ws, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut ws, ready(1, "abc")).await;
        send_json(&mut ws, json!({"op": 42})).await;
        send_json(&mut ws, json!({"op": 10, "d": {"heartbeat_interval": 1000}})).await;
        send_json(&mut ws, dispatch(2, "TYPING_START", json!("not an object"))).await;
        send_json(
            &mut ws,
            dispatch(3, "MESSAGE_CREATE", json!({"id": "10", "channel_id": "20", "content": "still here"})),
        )
        .await;
        drain_until_closed(&mut ws).await;
    });

    client.gateway.open().await.expect("open failed");
    assert!(matches!(client.next_event().await, Event::Ready(_)));
    match client.next_event().await {
        Event::MessageCreate(message) => assert_eq!(message.content, "still here"),
        other => panic!("expected MessageCreate, got {other:?}"),
    }

    client.expect_error("protocol error").await;
    assert_eq!(client.gateway.sequence(), 3);
    assert_eq!(client.gateway.state(), ConnectionState::Connected);
    assert!(client.closes.try_recv().is_err(), "connection was torn down");

    client.gateway.close().await.expect("close failed");
    server.await.expect("server task panicked");
}

// ============================================================================
// Reconnect Tests
// ============================================================================

#[tokio::test]
async fn test_resume_after_transport_drop() {
    // Arrange: first connection closes after a few dispatches
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut first, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut first, ready(1, "abc")).await;
        send_json(&mut first, dispatch(5, "GUILD_CREATE", json!({"id": "9"}))).await;
        first.close(None).await.ok();

        let (mut second, resume) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut second, dispatch(6, "RESUMED", json!({}))).await;
        drain_until_closed(&mut second).await;
        resume
    });

    // Act
    client.gateway.open().await.expect("open failed");

    // Assert
    assert!(matches!(client.next_event().await, Event::Ready(_)));
    assert_eq!(client.next_event().await.name(), "GUILD_CREATE");
    assert!(matches!(client.next_event().await, Event::Resumed));

    // The dropped connection was closed with its cause before reopening.
    let closed = client.closes.recv().await.expect("after-close hook not called");
    assert!(closed.is_some());

    client.gateway.close().await.ok();
    let resume = server.await.expect("server task panicked");
    assert_eq!(resume["op"], 6);
    assert_eq!(resume["d"]["token"], "test-token");
    assert_eq!(resume["d"]["session_id"], "abc");
    assert_eq!(resume["d"]["seq"], 5);
}

#[tokio::test]
async fn test_invalid_session_identifies_again() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut first, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut first, ready(1, "abc")).await;
        send_json(&mut first, json!({"op": 9, "d": false})).await;

        let (mut second, handshake) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut second, ready(1, "def")).await;
        drain_until_closed(&mut second).await;
        drop(first);
        handshake
    });

    client.gateway.open().await.expect("open failed");
    assert!(matches!(client.next_event().await, Event::Ready(_)));

    client.expect_error("session invalidated").await;
    match client.next_event().await {
        Event::Ready(ready) => assert_eq!(ready.session_id, "def"),
        other => panic!("expected Ready, got {other:?}"),
    }
    assert_eq!(client.gateway.session_id().as_deref(), Some("def"));

    client.gateway.close().await.ok();
    let handshake = server.await.expect("server task panicked");
    assert_eq!(handshake["op"], 2, "expected Identify after invalid session");
}

#[tokio::test]
async fn test_server_reconnect_request_resumes() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut first, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut first, ready(3, "abc")).await;
        send_json(&mut first, json!({"op": 7})).await;

        let (mut second, handshake) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut second, dispatch(4, "RESUMED", json!({}))).await;
        drain_until_closed(&mut second).await;
        drop(first);
        handshake
    });

    client.gateway.open().await.expect("open failed");
    assert!(matches!(client.next_event().await, Event::Ready(_)));

    client.expect_error("requested a reconnect").await;
    assert!(matches!(client.next_event().await, Event::Resumed));

    client.gateway.close().await.ok();
    let handshake = server.await.expect("server task panicked");
    assert_eq!(handshake["op"], 6);
    assert_eq!(handshake["d"]["seq"], 3);
}

#[tokio::test]
async fn test_gives_up_after_max_attempts() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let config = GatewayConfig {
        reconnect: ReconnectConfig {
            max_attempts: Some(2),
            ..ReconnectConfig::default()
        },
        ..GatewayConfig::default()
    };
    let mut client = Client::new(mock.url(), config);

    let server = tokio::spawn(async move {
        let (mut ws, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut ws, ready(1, "abc")).await;
        // Stop listening, then drop the live connection.
        drop(mock);
        ws.close(None).await.ok();
    });

    client.gateway.open().await.expect("open failed");
    server.await.expect("server task panicked");

    client.expect_error("max reconnect attempts reached (2)").await;
    assert_eq!(client.gateway.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_silent_connection_hits_read_deadline() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let config = GatewayConfig {
        read_grace_ms: Some(100),
        ..GatewayConfig::default()
    };
    let mut client = Client::new(mock.url(), config);

    let server = tokio::spawn(async move {
        // Heartbeats are never acknowledged, but the read deadline fires first.
        let (mut first, _) = mock.accept_and_hello(300).await;
        send_json(&mut first, ready(1, "abc")).await;

        let (mut second, resume) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut second, dispatch(2, "RESUMED", json!({}))).await;
        drain_until_closed(&mut second).await;
        drop(first);
        resume
    });

    client.gateway.open().await.expect("open failed");
    assert!(matches!(client.next_event().await, Event::Ready(_)));

    client.expect_error("timed out during read").await;
    assert!(matches!(client.next_event().await, Event::Resumed));

    client.gateway.close().await.ok();
    let resume = server.await.expect("server task panicked");
    assert_eq!(resume["op"], 6);
}

#[tokio::test]
async fn test_close_during_outage_stops_reconnecting() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let addr = mock.addr;
    let config = GatewayConfig {
        reconnect: ReconnectConfig {
            initial_delay_ms: 10,
            max_delay_ms: 10,
            ..ReconnectConfig::default()
        },
        ..GatewayConfig::default()
    };
    let mut client = Client::new(mock.url(), config);

    let server = tokio::spawn(async move {
        let (mut ws, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut ws, ready(1, "abc")).await;
        // Stop listening, then drop the live connection.
        drop(mock);
        ws.close(None).await.ok();
    });

    client.gateway.open().await.expect("open failed");
    server.await.expect("server task panicked");

    // The gateway is now retrying against a dead port.
    client.expect_error("failed to dial").await;
    client.gateway.close().await.ok();
    assert_eq!(client.gateway.state(), ConnectionState::Idle);

    // The server comes back on the same address; nobody should dial it.
    let listener = TcpListener::bind(addr).await.expect("failed to rebind");
    let dialed = timeout(Duration::from_millis(500), listener.accept()).await;
    assert!(dialed.is_err(), "gateway dialed again after close");
    assert_eq!(client.gateway.state(), ConnectionState::Idle);
}

// ============================================================================
// Lifecycle Tests
// ============================================================================

#[tokio::test]
async fn test_double_close_fires_hook_twice() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let mut client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut ws, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut ws, ready(1, "abc")).await;
        drain_until_closed(&mut ws).await;
    });

    client.gateway.open().await.expect("open failed");
    client.gateway.close().await.expect("first close failed");
    client.gateway.close().await.expect("second close failed");

    assert_eq!(client.closes.recv().await, Some(None));
    assert_eq!(client.closes.recv().await, Some(None));
    assert_eq!(client.gateway.state(), ConnectionState::Idle);

    server.await.expect("server task panicked");
}

#[tokio::test]
async fn test_send_presence_while_connected() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let client = Client::new(mock.url(), GatewayConfig::default());

    let server = tokio::spawn(async move {
        let (mut ws, _) = mock.accept_and_hello(SLOW_HEARTBEAT_MS).await;
        send_json(&mut ws, ready(1, "abc")).await;
        let presence = recv_op(&mut ws, 3).await;
        drain_until_closed(&mut ws).await;
        presence
    });

    client.gateway.open().await.expect("open failed");
    client
        .gateway
        .send(OpCode::PresenceUpdate, Some(&json!({"status": "online", "afk": false})))
        .await
        .expect("send failed");
    client.gateway.close().await.expect("close failed");

    let presence = server.await.expect("server task panicked");
    assert_eq!(presence["d"]["status"], "online");
}

#[tokio::test]
async fn test_send_without_connection() {
    let client = Client::new("ws://127.0.0.1:9".to_string(), GatewayConfig::default());

    let err = client
        .gateway
        .send(OpCode::Heartbeat, None::<&Value>)
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::NotConnected));
}

#[tokio::test]
async fn test_open_fails_when_nothing_listens() {
    let mock = MockGateway::new().await.expect("failed to create mock gateway");
    let url = mock.url();
    drop(mock);

    let client = Client::new(url, GatewayConfig::default());
    let err = client.gateway.open().await.unwrap_err();
    assert!(matches!(err, GatewayError::Dial(_)));
    assert_eq!(client.gateway.state(), ConnectionState::Idle);
}
