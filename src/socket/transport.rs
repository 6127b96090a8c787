use anyhow::{anyhow, Result};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, trace};

/// What a transport reports back to its session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Frame(String),
    Error(String),
    Closed { code: Option<u16>, reason: String },
}

/// Event channel handed to one transport instance.
///
/// Events are tagged with the transport's generation so the session can
/// ignore anything a released transport still manages to emit.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<(u64, TransportEvent)>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<(u64, TransportEvent)>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the session has gone away.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx.send((self.generation, event)).is_ok()
    }
}

/// One live duplex connection
pub trait Transport: Send {
    /// Queue a text frame for the wire.
    fn send(&mut self, frame: String) -> Result<()>;

    /// Release the connection. No further events are expected after this.
    fn close(&mut self);
}

/// Opens transports. Opening never blocks: the outcome arrives as
/// `TransportEvent::Open` or `Error` + `Closed` on the sink.
pub trait Connector: Send + Sync {
    fn open(&self, url: &str, events: EventSink) -> Box<dyn Transport>;
}

/// `tokio-tungstenite` backed connector
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, url: &str, events: EventSink) -> Box<dyn Transport> {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(url.to_string(), events, outgoing_rx));
        Box::new(WsTransport {
            outgoing: Some(outgoing_tx),
        })
    }
}

struct WsTransport {
    outgoing: Option<mpsc::UnboundedSender<String>>,
}

impl Transport for WsTransport {
    fn send(&mut self, frame: String) -> Result<()> {
        match &self.outgoing {
            Some(tx) => tx
                .send(frame)
                .map_err(|_| anyhow!("WebSocket writer has stopped")),
            None => Err(anyhow!("WebSocket transport already released")),
        }
    }

    fn close(&mut self) {
        // Dropping the sender makes the socket task send a close frame and exit.
        self.outgoing = None;
    }
}

async fn run_socket(
    url: String,
    events: EventSink,
    mut outgoing: mpsc::UnboundedReceiver<String>,
) {
    debug!("Opening WebSocket {} (generation {})", url, events.generation());

    let connected = tokio::select! {
        result = connect_async(url.as_str()) => result,
        // Nothing is written before Open, so this only resolves on release.
        _ = outgoing.recv() => {
            debug!("WebSocket released before connecting (generation {})", events.generation());
            return;
        }
    };

    let stream = match connected {
        Ok((stream, _)) => stream,
        Err(e) => {
            events.emit(TransportEvent::Error(e.to_string()));
            events.emit(TransportEvent::Closed {
                code: None,
                reason: "connect failed".into(),
            });
            return;
        }
    };

    if !events.emit(TransportEvent::Open) {
        return;
    }

    let (mut ws_tx, mut ws_rx) = stream.split();

    loop {
        tokio::select! {
            frame = outgoing.recv() => {
                match frame {
                    Some(text) => {
                        if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                            events.emit(TransportEvent::Error(e.to_string()));
                            events.emit(TransportEvent::Closed {
                                code: None,
                                reason: "send failed".into(),
                            });
                            return;
                        }
                    }
                    None => {
                        debug!("WebSocket released (generation {})", events.generation());
                        let _ = ws_tx.close().await;
                        return;
                    }
                }
            }
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        events.emit(TransportEvent::Frame(text.to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = match frame {
                            Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                            None => (None, String::new()),
                        };
                        events.emit(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Some(Ok(other)) => {
                        trace!("Ignoring non-text frame: {:?}", other);
                    }
                    Some(Err(e)) => {
                        events.emit(TransportEvent::Error(e.to_string()));
                        events.emit(TransportEvent::Closed {
                            code: None,
                            reason: "stream error".into(),
                        });
                        return;
                    }
                    None => {
                        events.emit(TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".into(),
                        });
                        return;
                    }
                }
            }
        }
    }
}
