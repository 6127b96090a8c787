// Test doubles for the socket, audio output and microphone collaborators.

#![allow(dead_code)]

use anyhow::{bail, Result};
use memory_keeper::capture::Recorder;
use memory_keeper::playback::AudioSink;
use memory_keeper::socket::{Connector, EventSink, Transport, TransportEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// A transport opened by `FakeConnector`
pub struct OpenedTransport {
    pub url: String,
    pub events: EventSink,
    pub at: tokio::time::Instant,
}

impl OpenedTransport {
    pub fn open(&self) {
        self.events.emit(TransportEvent::Open);
    }

    pub fn frame(&self, text: &str) {
        self.events.emit(TransportEvent::Frame(text.to_string()));
    }

    pub fn close(&self) {
        self.events.emit(TransportEvent::Closed {
            code: Some(1006),
            reason: "abnormal closure".into(),
        });
    }
}

/// Connector whose transports are driven by the test
pub struct FakeConnector {
    opened: mpsc::UnboundedSender<OpenedTransport>,
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicUsize>,
}

pub struct FakeServer {
    pub opened: mpsc::UnboundedReceiver<OpenedTransport>,
    pub sent: mpsc::UnboundedReceiver<String>,
    pub closed: Arc<AtomicUsize>,
}

impl FakeConnector {
    pub fn new() -> (Arc<Self>, FakeServer) {
        let (opened_tx, opened_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicUsize::new(0));
        let connector = Arc::new(Self {
            opened: opened_tx,
            sent: sent_tx,
            closed: Arc::clone(&closed),
        });
        let server = FakeServer {
            opened: opened_rx,
            sent: sent_rx,
            closed,
        };
        (connector, server)
    }
}

impl Connector for FakeConnector {
    fn open(&self, url: &str, events: EventSink) -> Box<dyn Transport> {
        let _ = self.opened.send(OpenedTransport {
            url: url.to_string(),
            events,
            at: tokio::time::Instant::now(),
        });
        Box::new(FakeTransport {
            sent: self.sent.clone(),
            closed: Arc::clone(&self.closed),
            released: false,
        })
    }
}

struct FakeTransport {
    sent: mpsc::UnboundedSender<String>,
    closed: Arc<AtomicUsize>,
    released: bool,
}

impl Transport for FakeTransport {
    fn send(&mut self, frame: String) -> Result<()> {
        if self.released {
            bail!("transport released");
        }
        let _ = self.sent.send(frame);
        Ok(())
    }

    fn close(&mut self) {
        if !self.released {
            self.released = true;
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

impl FakeServer {
    pub async fn next_open(&mut self) -> OpenedTransport {
        tokio::time::timeout(Duration::from_secs(60), self.opened.recv())
            .await
            .expect("timed out waiting for a connection attempt")
            .expect("connector dropped")
    }

    pub async fn next_sent(&mut self) -> serde_json::Value {
        let frame = tokio::time::timeout(Duration::from_secs(60), self.sent.recv())
            .await
            .expect("timed out waiting for an outbound frame")
            .expect("connector dropped");
        serde_json::from_str(&frame).expect("outbound frame is JSON")
    }
}

/// Sink that records what it plays and how many plays overlap.
///
/// Payloads are a single byte holding the fragment's id; a payload of
/// `FAIL_MARKER` makes playback fail and `PANIC_MARKER` makes it panic.
pub struct RecordingSink {
    pub played: Mutex<Vec<u8>>,
    active: AtomicUsize,
    pub max_active: AtomicUsize,
    delay: Duration,
}

pub const FAIL_MARKER: u8 = 0xEE;
pub const PANIC_MARKER: u8 = 0xEF;

impl RecordingSink {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            played: Mutex::new(Vec::new()),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn played(&self) -> Vec<u8> {
        self.played.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl AudioSink for RecordingSink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        if audio.first() == Some(&PANIC_MARKER) {
            panic!("output device driver crashed");
        }
        if audio.first() == Some(&FAIL_MARKER) {
            bail!("device unavailable");
        }
        self.played.lock().unwrap().extend_from_slice(audio);
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Microphone that hands back fixed bytes
pub struct FakeRecorder {
    pub allow: bool,
    pub audio: Vec<u8>,
    recording: bool,
}

impl FakeRecorder {
    pub fn new(allow: bool, audio: Vec<u8>) -> Self {
        Self {
            allow,
            audio,
            recording: false,
        }
    }
}

#[async_trait::async_trait]
impl Recorder for FakeRecorder {
    async fn request_permission(&mut self) -> bool {
        self.allow
    }

    async fn start(&mut self) -> Result<()> {
        self.recording = true;
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<u8>> {
        if !self.recording {
            bail!("No active recording");
        }
        self.recording = false;
        Ok(self.audio.clone())
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn name(&self) -> &str {
        "fake"
    }
}

pub fn fragment(id: u8) -> memory_keeper::AudioFragment {
    memory_keeper::AudioFragment {
        sequence_id: id as i64,
        payload: vec![id],
    }
}
