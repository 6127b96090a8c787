// Integration tests for the socket session driver
//
// A fake connector stands in for the network. The tokio clock is paused, so
// reconnect delays and heartbeats are measured exactly.

mod common;

use common::FakeConnector;
use memory_keeper::socket::{
    ConnectionState, InboundMessage, OutboundMessage, ReconnectPolicy, SocketConfig, SocketSession,
};
use std::sync::atomic::Ordering;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn config(max_attempts: u32, base_ms: u64, heartbeat_ms: u64) -> SocketConfig {
    SocketConfig {
        url: "ws://memory.test/ws".into(),
        heartbeat_interval: Duration::from_millis(heartbeat_ms),
        policy: ReconnectPolicy {
            base_interval: Duration::from_millis(base_ms),
            max_attempts,
            ..Default::default()
        },
    }
}

async fn wait_for_state(session: &SocketSession, wanted: impl Fn(&ConnectionState) -> bool) {
    let mut status = session.subscribe();
    tokio::time::timeout(Duration::from_secs(60), status.wait_for(|s| wanted(&s.state)))
        .await
        .expect("timed out waiting for state")
        .expect("driver stopped");
}

#[tokio::test(start_paused = true)]
async fn test_reconnect_delays_are_linear_and_bounded() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(3, 1000, 0), connector, inbound_tx);

    session.start();
    let mut transport = server.next_open().await;
    assert_eq!(transport.url, "ws://memory.test/ws");

    let mut delays = Vec::new();
    for _ in 0..3 {
        let closed_at = Instant::now();
        transport.close();
        transport = server.next_open().await;
        delays.push(transport.at.duration_since(closed_at));
    }

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(3000)
        ]
    );

    transport.close();
    wait_for_state(&session, |s| *s == ConnectionState::Failed).await;

    // No 4th attempt, however long we wait
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert!(server.opened.try_recv().is_err());

    let status = session.status();
    assert!(!status.connected());
    assert!(status
        .last_error
        .unwrap()
        .contains("Max reconnection attempts reached"));
}

#[tokio::test(start_paused = true)]
async fn test_open_resets_attempt_counter() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(3, 1000, 0), connector, inbound_tx);

    session.start();
    let first = server.next_open().await;
    first.close();

    let second = server.next_open().await;
    second.open();
    wait_for_state(&session, |s| *s == ConnectionState::Open).await;
    assert_eq!(session.status().attempts, 0);
    assert!(session.is_connected());

    // Next drop starts again from the first delay
    let closed_at = Instant::now();
    second.close();
    let third = server.next_open().await;
    assert_eq!(third.at.duration_since(closed_at), Duration::from_millis(1000));
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_cancels_pending_reconnect() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(5, 1000, 0), connector, inbound_tx);

    session.start();
    let transport = server.next_open().await;
    transport.open();
    transport.close();
    wait_for_state(&session, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;

    session.disconnect();
    wait_for_state(&session, |s| *s == ConnectionState::Closed).await;

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert!(server.opened.try_recv().is_err(), "No connection after disconnect");

    // Idempotent
    session.disconnect();
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_pings_while_open() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(5, 1000, 15_000), connector, inbound_tx);

    session.start();
    let transport = server.next_open().await;
    let opened_at = Instant::now();
    transport.open();

    let ping = server.next_sent().await;
    assert_eq!(ping, serde_json::json!({ "type": "ping" }));
    assert_eq!(opened_at.elapsed(), Duration::from_millis(15_000));

    // Heartbeat stops with the connection
    transport.close();
    wait_for_state(&session, |s| matches!(s, ConnectionState::Reconnecting { .. })).await;
    session.disconnect();
    tokio::time::sleep(Duration::from_secs(120)).await;
    assert!(server.sent.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_heartbeat_restarts_with_single_cadence_after_reconnect() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(5, 1000, 15_000), connector, inbound_tx);

    session.start();
    let first = server.next_open().await;
    first.open();
    assert_eq!(server.next_sent().await["type"], "ping");

    // Drop mid-interval, so a leftover timer would fire 10s later
    tokio::time::sleep(Duration::from_secs(5)).await;
    first.close();
    let second = server.next_open().await;
    assert!(server.sent.try_recv().is_err(), "No ping while reconnecting");

    let reopened_at = Instant::now();
    second.open();

    for n in 1..=3u32 {
        assert_eq!(server.next_sent().await["type"], "ping");
        assert_eq!(reopened_at.elapsed(), Duration::from_secs(15) * n);
    }

    // Exactly one ping per interval
    tokio::time::sleep(Duration::from_secs(14)).await;
    assert!(server.sent.try_recv().is_err());
    assert_eq!(server.next_sent().await["type"], "ping");
    assert_eq!(reopened_at.elapsed(), Duration::from_secs(60));
}

#[tokio::test(start_paused = true)]
async fn test_pong_is_filtered_and_order_is_kept() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(5, 1000, 0), connector, inbound_tx);

    session.start();
    let transport = server.next_open().await;
    transport.open();
    transport.frame(r#"{"type":"text","payload":"first","sentence_id":0}"#);
    transport.frame(r#"{"type":"pong"}"#);
    transport.frame("{broken");
    transport.frame(r#"{"type":"error","payload":"second"}"#);

    assert_eq!(inbound_rx.recv().await, Some(InboundMessage::Text("first".into())));
    assert_eq!(inbound_rx.recv().await, Some(InboundMessage::Error("second".into())));
    assert!(session.is_connected(), "Malformed frames leave the connection alone");

    session.shutdown().await;
    assert_eq!(inbound_rx.recv().await, None);
}

#[tokio::test(start_paused = true)]
async fn test_send_only_when_open() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(5, 1000, 0), connector, inbound_tx);

    session.start();
    let transport = server.next_open().await;

    // Still connecting: dropped, not queued
    session.send(OutboundMessage::Text("too early".into()));
    tokio::time::sleep(Duration::from_millis(1)).await;

    transport.open();
    wait_for_state(&session, |s| *s == ConnectionState::Open).await;
    session.send(OutboundMessage::Text("hello".into()));

    let frame = server.next_sent().await;
    assert_eq!(
        frame,
        serde_json::json!({ "type": "text", "payload": "hello", "sentence_id": 0 })
    );
    assert!(server.sent.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_stale_transport_events_are_ignored() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
    let session = SocketSession::spawn(config(5, 1000, 0), connector, inbound_tx);

    session.start();
    let old = server.next_open().await;
    old.close();
    let current = server.next_open().await;
    assert_eq!(server.closed.load(Ordering::SeqCst), 1, "Old transport released");

    // The released transport keeps talking; none of it counts
    old.open();
    old.frame(r#"{"type":"text","payload":"ghost"}"#);
    old.close();

    current.open();
    current.frame(r#"{"type":"text","payload":"live"}"#);

    assert_eq!(inbound_rx.recv().await, Some(InboundMessage::Text("live".into())));
    assert!(session.is_connected());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_releases_transport() {
    let (connector, mut server) = FakeConnector::new();
    let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<InboundMessage>();
    let session = SocketSession::spawn(config(5, 1000, 0), connector, inbound_tx);

    session.start();
    let transport = server.next_open().await;
    transport.open();

    drop(session);

    // Driver exits, which closes the inbound channel
    assert_eq!(inbound_rx.recv().await, None);
    assert_eq!(server.closed.load(Ordering::SeqCst), 1);
}
