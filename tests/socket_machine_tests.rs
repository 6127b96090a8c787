// Unit tests for the connection state machine
//
// These drive the machine with events directly and check the effects it asks
// the driver to perform.

use memory_keeper::socket::{
    ConnectionMachine, ConnectionState, Effect, Event, InboundMessage, ReconnectPolicy,
};
use std::time::Duration;

fn machine(max_attempts: u32, base_ms: u64) -> ConnectionMachine {
    ConnectionMachine::new(ReconnectPolicy {
        base_interval: Duration::from_millis(base_ms),
        max_attempts,
        ..Default::default()
    })
}

fn closed() -> Event {
    Event::TransportClosed {
        code: Some(1006),
        reason: String::new(),
    }
}

fn scheduled_delay(effects: &[Effect]) -> Option<Duration> {
    effects.iter().find_map(|e| match e {
        Effect::ScheduleReconnect(d) => Some(*d),
        _ => None,
    })
}

#[test]
fn test_start_opens_transport_once() {
    let mut m = machine(5, 3000);

    assert_eq!(m.handle(Event::Start), vec![Effect::OpenTransport]);
    assert_eq!(m.state(), &ConnectionState::Connecting);

    // Second start while connecting is a no-op
    assert!(m.handle(Event::Start).is_empty());

    m.handle(Event::TransportOpened);
    assert!(m.handle(Event::Start).is_empty(), "Start while open must not open a second socket");
}

#[test]
fn test_open_resets_attempts_and_starts_heartbeat() {
    let mut m = machine(5, 1000);
    m.handle(Event::Start);
    m.handle(Event::TransportError("refused".into()));
    m.handle(closed());
    m.handle(Event::ReconnectTimerFired);
    assert_eq!(m.attempts(), 1);

    let effects = m.handle(Event::TransportOpened);

    assert_eq!(effects, vec![Effect::StartHeartbeat]);
    assert_eq!(m.state(), &ConnectionState::Open);
    assert_eq!(m.attempts(), 0);
    assert_eq!(m.last_error(), None);
}

#[test]
fn test_transport_error_is_reported_without_state_change() {
    let mut m = machine(5, 1000);
    m.handle(Event::Start);

    let effects = m.handle(Event::TransportError("connection refused".into()));

    assert!(effects.is_empty(), "Errors must not schedule anything on their own");
    assert_eq!(m.state(), &ConnectionState::Connecting);
    let error = m.last_error().expect("error recorded");
    assert!(error.contains("attempt 1/5"));
    assert!(error.contains("connection refused"));
}

#[test]
fn test_linear_backoff_then_failure() {
    // maxAttempts=3, baseInterval=1000ms
    let mut m = machine(3, 1000);
    m.handle(Event::Start);

    let mut delays = Vec::new();
    for _ in 0..3 {
        let effects = m.handle(closed());
        assert!(effects.contains(&Effect::StopHeartbeat));
        assert!(effects.contains(&Effect::ReleaseTransport));
        delays.push(scheduled_delay(&effects).expect("reconnect scheduled"));
        assert_eq!(m.handle(Event::ReconnectTimerFired), vec![Effect::OpenTransport]);
    }

    assert_eq!(
        delays,
        vec![
            Duration::from_millis(1000),
            Duration::from_millis(2000),
            Duration::from_millis(3000)
        ]
    );

    let effects = m.handle(closed());
    assert_eq!(scheduled_delay(&effects), None, "No 4th attempt");
    assert_eq!(m.state(), &ConnectionState::Failed);
    assert!(m
        .last_error()
        .unwrap()
        .contains("Max reconnection attempts reached"));

    // A stray timer after failure does nothing
    assert!(m.handle(Event::ReconnectTimerFired).is_empty());
}

#[test]
fn test_reconnecting_state_carries_attempt_and_delay() {
    let mut m = machine(5, 250);
    m.handle(Event::Start);
    m.handle(Event::TransportOpened);
    m.handle(closed());

    assert_eq!(
        m.state(),
        &ConnectionState::Reconnecting {
            attempt: 1,
            delay: Duration::from_millis(250)
        }
    );
}

#[test]
fn test_disconnect_cancels_pending_reconnect() {
    let mut m = machine(5, 1000);
    m.handle(Event::Start);
    m.handle(Event::TransportOpened);
    m.handle(closed());

    let effects = m.handle(Event::Disconnect);

    assert_eq!(
        effects,
        vec![
            Effect::CancelReconnect,
            Effect::StopHeartbeat,
            Effect::ReleaseTransport
        ]
    );
    assert_eq!(m.state(), &ConnectionState::Closed);
    assert_eq!(m.attempts(), 5, "Disconnect blocks further retries");
    assert!(m.handle(Event::ReconnectTimerFired).is_empty());
}

#[test]
fn test_disconnect_is_idempotent() {
    let mut m = machine(5, 1000);
    m.handle(Event::Start);
    m.handle(Event::TransportOpened);

    assert!(!m.handle(Event::Disconnect).is_empty());
    assert!(m.handle(Event::Disconnect).is_empty());
    assert!(m.handle(closed()).is_empty(), "Close after disconnect is not unexpected");
    assert_eq!(m.state(), &ConnectionState::Closed);
}

#[test]
fn test_restart_after_failure_resets_attempts() {
    let mut m = machine(1, 1000);
    m.handle(Event::Start);
    m.handle(closed());
    m.handle(Event::ReconnectTimerFired);
    m.handle(closed());
    assert_eq!(m.state(), &ConnectionState::Failed);

    assert_eq!(m.handle(Event::Start), vec![Effect::OpenTransport]);
    assert_eq!(m.attempts(), 0);
    assert_eq!(m.last_error(), None);
}

#[test]
fn test_start_while_reconnecting_connects_immediately() {
    let mut m = machine(5, 1000);
    m.handle(Event::Start);
    m.handle(closed());

    assert_eq!(
        m.handle(Event::Start),
        vec![Effect::CancelReconnect, Effect::OpenTransport]
    );
    assert_eq!(m.state(), &ConnectionState::Connecting);
    assert_eq!(m.attempts(), 1);
}

#[test]
fn test_pong_is_never_delivered() {
    let mut m = machine(5, 1000);
    m.handle(Event::Start);
    m.handle(Event::TransportOpened);

    assert!(m.handle(Event::Frame(r#"{"type":"pong"}"#.into())).is_empty());

    let effects = m.handle(Event::Frame(
        r#"{"type":"text","payload":"hello","sentence_id":0}"#.into(),
    ));
    assert_eq!(
        effects,
        vec![Effect::Deliver(InboundMessage::Text("hello".into()))]
    );
}

#[test]
fn test_malformed_frame_is_dropped() {
    let mut m = machine(5, 1000);
    m.handle(Event::Start);
    m.handle(Event::TransportOpened);

    assert!(m.handle(Event::Frame("not json".into())).is_empty());
    assert!(m.handle(Event::Frame(r#"{"type":"audio","payload":"%%%"}"#.into())).is_empty());
    assert_eq!(m.state(), &ConnectionState::Open);
}

#[test]
fn test_heartbeat_only_pings_when_open() {
    let mut m = machine(5, 1000);
    assert!(m.handle(Event::HeartbeatTick).is_empty());

    m.handle(Event::Start);
    assert!(m.handle(Event::HeartbeatTick).is_empty());

    m.handle(Event::TransportOpened);
    assert_eq!(m.handle(Event::HeartbeatTick), vec![Effect::SendPing]);
}
