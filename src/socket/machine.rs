use std::fmt;
use std::time::Duration;
use tracing::{debug, info, trace, warn};

use super::messages::InboundMessage;
use super::policy::ReconnectPolicy;

pub(crate) const MAX_ATTEMPTS_MESSAGE: &str =
    "Max reconnection attempts reached. Please restart the session.";

/// Connection lifecycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Open,
    /// Waiting `delay` before reconnect attempt `attempt` (1-indexed)
    Reconnecting { attempt: u32, delay: Duration },
    /// Manually disconnected
    Closed,
    /// Reconnect attempts exhausted
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Reconnecting { attempt, delay } => {
                write!(f, "reconnecting (attempt {} in {}ms)", attempt, delay.as_millis())
            }
            Self::Closed => write!(f, "closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Inputs to the state machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    Disconnect,
    TransportOpened,
    TransportError(String),
    TransportClosed { code: Option<u16>, reason: String },
    Frame(String),
    ReconnectTimerFired,
    HeartbeatTick,
}

/// Side effects the driver must perform, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    OpenTransport,
    ReleaseTransport,
    StartHeartbeat,
    StopHeartbeat,
    ScheduleReconnect(Duration),
    CancelReconnect,
    SendPing,
    Deliver(InboundMessage),
}

/// Single authoritative connection state plus attempt bookkeeping.
///
/// Holds no I/O: every transition returns the effects needed to realize it,
/// which keeps timer and transport ownership in one place (the driver).
#[derive(Debug)]
pub struct ConnectionMachine {
    policy: ReconnectPolicy,
    state: ConnectionState,
    attempts: u32,
    last_error: Option<String>,
}

impl ConnectionMachine {
    pub fn new(policy: ReconnectPolicy) -> Self {
        Self {
            policy,
            state: ConnectionState::Idle,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start => self.on_start(),
            Event::Disconnect => self.on_disconnect(),
            Event::TransportOpened => self.on_opened(),
            Event::TransportError(message) => self.on_error(message),
            Event::TransportClosed { code, reason } => self.on_closed(code, reason),
            Event::Frame(text) => self.on_frame(&text),
            Event::ReconnectTimerFired => self.on_reconnect_timer(),
            Event::HeartbeatTick => {
                if self.is_open() {
                    vec![Effect::SendPing]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn on_start(&mut self) -> Vec<Effect> {
        match self.state {
            ConnectionState::Connecting | ConnectionState::Open => {
                debug!("Connection already in progress, ignoring start");
                Vec::new()
            }
            ConnectionState::Reconnecting { .. } => {
                self.state = ConnectionState::Connecting;
                vec![Effect::CancelReconnect, Effect::OpenTransport]
            }
            ConnectionState::Idle => {
                self.state = ConnectionState::Connecting;
                vec![Effect::OpenTransport]
            }
            ConnectionState::Closed | ConnectionState::Failed => {
                self.attempts = 0;
                self.last_error = None;
                self.state = ConnectionState::Connecting;
                vec![Effect::OpenTransport]
            }
        }
    }

    fn on_disconnect(&mut self) -> Vec<Effect> {
        if self.state == ConnectionState::Closed {
            return Vec::new();
        }
        // Blocks any reconnect that might still be in flight.
        self.attempts = self.policy.max_attempts;
        self.state = ConnectionState::Closed;
        vec![
            Effect::CancelReconnect,
            Effect::StopHeartbeat,
            Effect::ReleaseTransport,
        ]
    }

    fn on_opened(&mut self) -> Vec<Effect> {
        if self.state != ConnectionState::Connecting {
            trace!("Ignoring open event in state {}", self.state);
            return Vec::new();
        }
        info!("WebSocket connected");
        self.state = ConnectionState::Open;
        self.attempts = 0;
        self.last_error = None;
        vec![Effect::StartHeartbeat]
    }

    fn on_error(&mut self, message: String) -> Vec<Effect> {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            return Vec::new();
        }
        let status = format!(
            "connection error (attempt {}/{}): {}",
            self.attempts + 1,
            self.policy.max_attempts,
            message
        );
        warn!("{}", status);
        self.last_error = Some(status);
        Vec::new()
    }

    fn on_closed(&mut self, code: Option<u16>, reason: String) -> Vec<Effect> {
        if !matches!(self.state, ConnectionState::Connecting | ConnectionState::Open) {
            trace!("Ignoring close event in state {}", self.state);
            return Vec::new();
        }
        info!(
            "WebSocket closed (code: {}, reason: {})",
            code.map(|c| c.to_string()).unwrap_or_else(|| "none".into()),
            reason
        );

        let mut effects = vec![Effect::StopHeartbeat, Effect::ReleaseTransport];

        if self.attempts < self.policy.max_attempts {
            self.attempts += 1;
            let delay = self.policy.delay_for(self.attempts);
            info!(
                "Reconnecting in {}ms ({}/{})",
                delay.as_millis(),
                self.attempts,
                self.policy.max_attempts
            );
            self.state = ConnectionState::Reconnecting {
                attempt: self.attempts,
                delay,
            };
            effects.push(Effect::ScheduleReconnect(delay));
        } else {
            warn!("{}", MAX_ATTEMPTS_MESSAGE);
            self.state = ConnectionState::Failed;
            self.last_error = Some(MAX_ATTEMPTS_MESSAGE.to_string());
        }

        effects
    }

    fn on_frame(&mut self, text: &str) -> Vec<Effect> {
        if !self.is_open() {
            trace!("Dropping frame received in state {}", self.state);
            return Vec::new();
        }
        match InboundMessage::parse(text) {
            Ok(InboundMessage::Pong) => {
                trace!("keepalive reply");
                Vec::new()
            }
            Ok(message) => vec![Effect::Deliver(message)],
            Err(e) => {
                warn!("Failed to parse WebSocket frame: {}", e);
                Vec::new()
            }
        }
    }

    fn on_reconnect_timer(&mut self) -> Vec<Effect> {
        match self.state {
            ConnectionState::Reconnecting { attempt, .. } => {
                info!(
                    "Attempting to reconnect ({}/{})",
                    attempt, self.policy.max_attempts
                );
                self.state = ConnectionState::Connecting;
                vec![Effect::OpenTransport]
            }
            _ => Vec::new(),
        }
    }
}
