use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, trace, warn};

use super::machine::{ConnectionMachine, ConnectionState, Effect, Event};
use super::messages::{InboundMessage, OutboundMessage};
use super::policy::ReconnectPolicy;
use super::transport::{Connector, EventSink, Transport, TransportEvent};

/// Socket endpoint and timing
#[derive(Debug, Clone)]
pub struct SocketConfig {
    pub url: String,
    /// Zero disables keepalive pings
    pub heartbeat_interval: Duration,
    pub policy: ReconnectPolicy,
}

/// Snapshot of the connection published after every transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Open
    }
}

enum Command {
    Start,
    Send(OutboundMessage),
    Disconnect,
}

/// Handle to a reconnecting WebSocket session.
///
/// All state lives in a single driver task; this handle only posts commands
/// and reads the published status. Dropping it disconnects.
pub struct SocketSession {
    commands: mpsc::UnboundedSender<Command>,
    status: watch::Receiver<ConnectionStatus>,
    task: JoinHandle<()>,
}

impl SocketSession {
    /// Spawn the driver. Inbound messages are delivered to `inbound` in
    /// transport order. The session stays `Idle` until `start`.
    pub fn spawn(
        config: SocketConfig,
        connector: Arc<dyn Connector>,
        inbound: mpsc::UnboundedSender<InboundMessage>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let machine = ConnectionMachine::new(config.policy.clone());
        let (status_tx, status_rx) = watch::channel(ConnectionStatus {
            state: machine.state().clone(),
            attempts: 0,
            last_error: None,
        });

        let driver = Driver {
            url: config.url,
            heartbeat_period: config.heartbeat_interval,
            machine,
            connector,
            transport: None,
            generation: 0,
            events_tx,
            heartbeat: None,
            reconnect: None,
            inbound,
            status: status_tx,
        };
        let task = tokio::spawn(driver.run(commands_rx, events_rx));

        Self {
            commands: commands_tx,
            status: status_rx,
            task,
        }
    }

    pub fn start(&self) {
        self.post(Command::Start);
    }

    /// Fire-and-forget. Dropped with a warning unless the socket is open.
    pub fn send(&self, message: OutboundMessage) {
        self.post(Command::Send(message));
    }

    /// Idempotent.
    pub fn disconnect(&self) {
        self.post(Command::Disconnect);
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status.borrow().connected()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Disconnect and wait for the driver to release everything.
    pub async fn shutdown(self) {
        self.post(Command::Disconnect);
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            error!("Socket driver panicked: {}", e);
        }
    }

    fn post(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Socket driver has stopped");
        }
    }
}

struct Driver {
    url: String,
    heartbeat_period: Duration,
    machine: ConnectionMachine,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    generation: u64,
    events_tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
    heartbeat: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    inbound: mpsc::UnboundedSender<InboundMessage>,
    status: watch::Sender<ConnectionStatus>,
}

impl Driver {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<(u64, TransportEvent)>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    match command {
                        Some(Command::Start) => self.apply(Event::Start),
                        Some(Command::Send(message)) => self.send(message),
                        Some(Command::Disconnect) => self.apply(Event::Disconnect),
                        None => {
                            self.apply(Event::Disconnect);
                            break;
                        }
                    }
                }
                Some((generation, event)) = events.recv() => {
                    if generation == self.generation {
                        self.apply(event.into());
                    } else {
                        trace!("Dropping event from released transport {}", generation);
                    }
                }
                _ = heartbeat_tick(&mut self.heartbeat) => {
                    self.apply(Event::HeartbeatTick);
                }
                _ = reconnect_due(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.apply(Event::ReconnectTimerFired);
                }
            }
        }
        debug!("Socket driver stopped");
    }

    fn apply(&mut self, event: Event) {
        for effect in self.machine.handle(event) {
            self.execute(effect);
        }
        self.publish();
    }

    fn execute(&mut self, effect: Effect) {
        match effect {
            Effect::OpenTransport => {
                self.release_transport();
                self.generation += 1;
                info!(
                    "Connecting to {} (attempt {}/{})",
                    self.url,
                    self.machine.attempts() + 1,
                    self.machine.policy().max_attempts
                );
                let sink = EventSink::new(self.generation, self.events_tx.clone());
                self.transport = Some(self.connector.open(&self.url, sink));
            }
            Effect::ReleaseTransport => self.release_transport(),
            Effect::StartHeartbeat => {
                self.heartbeat = if self.heartbeat_period.is_zero() {
                    None
                } else {
                    let mut interval = tokio::time::interval_at(
                        Instant::now() + self.heartbeat_period,
                        self.heartbeat_period,
                    );
                    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    Some(interval)
                };
            }
            Effect::StopHeartbeat => self.heartbeat = None,
            Effect::ScheduleReconnect(delay) => {
                self.reconnect = Some(Box::pin(tokio::time::sleep(delay)));
            }
            Effect::CancelReconnect => self.reconnect = None,
            Effect::SendPing => {
                trace!("keepalive ping");
                self.write(&OutboundMessage::Ping);
            }
            Effect::Deliver(message) => {
                if self.inbound.send(message).is_err() {
                    debug!("No message handler registered, dropping inbound message");
                }
            }
        }
    }

    fn send(&mut self, message: OutboundMessage) {
        if !self.machine.is_open() {
            warn!(
                "WebSocket is not connected, dropping outbound {} message",
                message.kind()
            );
            return;
        }
        self.write(&message);
    }

    fn write(&mut self, message: &OutboundMessage) {
        let frame = match message.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                error!("Failed to encode {} message: {}", message.kind(), e);
                return;
            }
        };
        if let Some(transport) = self.transport.as_mut() {
            if let Err(e) = transport.send(frame) {
                warn!("Failed to send {} message: {}", message.kind(), e);
            }
        }
    }

    fn release_transport(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            transport.close();
        }
    }

    fn publish(&self) {
        let next = ConnectionStatus {
            state: self.machine.state().clone(),
            attempts: self.machine.attempts(),
            last_error: self.machine.last_error().map(str::to_string),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}

impl From<TransportEvent> for Event {
    fn from(event: TransportEvent) -> Self {
        match event {
            TransportEvent::Open => Event::TransportOpened,
            TransportEvent::Frame(text) => Event::Frame(text),
            TransportEvent::Error(message) => Event::TransportError(message),
            TransportEvent::Closed { code, reason } => Event::TransportClosed { code, reason },
        }
    }
}

async fn heartbeat_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => pending().await,
    }
}

async fn reconnect_due(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => pending().await,
    }
}
