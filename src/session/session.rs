use super::config::SessionConfig;
use super::dispatch::{Dispatcher, UiEvent};
use super::stats::{MessageCounters, SessionStats};
use crate::capture::Recorder;
use crate::playback::{AudioSink, PlaybackQueue};
use crate::reminders::ReminderList;
use crate::socket::{Connector, ConnectionStatus, OutboundMessage, SocketSession};
use anyhow::{bail, Context, Result};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// A memo session: server socket, reply routing, playback and recording
pub struct MemorySession {
    /// Session configuration
    config: SessionConfig,

    /// Reconnecting socket to the memo server
    socket: SocketSession,

    /// Speech fragments waiting for playback
    playback: PlaybackQueue,

    /// Persisted reminders
    reminders: ReminderList,

    /// Microphone
    recorder: Mutex<Box<dyn Recorder>>,

    /// Cached microphone permission answer
    mic_permission: AtomicBool,

    /// When the session started
    started_at: chrono::DateTime<chrono::Utc>,

    /// Routed message counters
    counters: Arc<MessageCounters>,

    /// Handle for the inbound routing task
    dispatch_task: JoinHandle<()>,

    /// Handle for the connection status forwarding task
    status_task: JoinHandle<()>,
}

impl MemorySession {
    /// Create the session and start connecting.
    ///
    /// Returns the session and the receiver for user-facing events.
    pub fn start(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        sink: Arc<dyn AudioSink>,
        recorder: Box<dyn Recorder>,
        reminders: ReminderList,
    ) -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        info!("Creating memo session: {}", config.session_id);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();

        let playback = PlaybackQueue::new(sink);
        let counters = Arc::new(MessageCounters::default());
        let dispatcher = Dispatcher::with_counters(
            playback.clone(),
            reminders.clone(),
            events_tx,
            Arc::clone(&counters),
        );

        let socket = SocketSession::spawn(config.socket.clone(), connector, inbound_tx);

        // Spawn inbound routing task
        let router = dispatcher.clone();
        let dispatch_task = tokio::spawn(async move {
            while let Some(message) = inbound_rx.recv().await {
                router.dispatch(message).await;
            }
        });

        // Spawn connection status forwarding task
        let mut status_rx = socket.subscribe();
        let status_task = tokio::spawn(async move {
            while status_rx.changed().await.is_ok() {
                let status = status_rx.borrow_and_update().clone();
                dispatcher.emit(UiEvent::Connection(status));
            }
        });

        socket.start();

        let session = Self {
            config,
            socket,
            playback,
            reminders,
            recorder: Mutex::new(recorder),
            mic_permission: AtomicBool::new(false),
            started_at: Utc::now(),
            counters,
            dispatch_task,
            status_task,
        };

        (session, events_rx)
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    pub fn reminders(&self) -> &ReminderList {
        &self.reminders
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    pub fn connection(&self) -> ConnectionStatus {
        self.socket.status()
    }

    /// Reconnect after a manual disconnect or exhausted retries.
    pub fn reconnect(&self) {
        self.socket.start();
    }

    /// Ask the microphone for access. Denial is reported as `false`.
    pub async fn request_microphone(&self) -> bool {
        let granted = self.recorder.lock().await.request_permission().await;
        self.mic_permission.store(granted, Ordering::SeqCst);
        if !granted {
            warn!("Microphone permission denied");
        }
        granted
    }

    pub fn has_microphone(&self) -> bool {
        self.mic_permission.load(Ordering::SeqCst)
    }

    /// Start recording. `Ok(false)` when microphone access is denied.
    pub async fn start_recording(&self) -> Result<bool> {
        if !self.has_microphone() && !self.request_microphone().await {
            return Ok(false);
        }

        let mut recorder = self.recorder.lock().await;
        if recorder.is_recording() {
            warn!("Recording already started");
            return Ok(true);
        }
        recorder
            .start()
            .await
            .with_context(|| format!("Failed to start recording with {}", recorder.name()))?;
        Ok(true)
    }

    /// Stop recording and send the audio to the server.
    pub async fn stop_recording(&self) -> Result<()> {
        let audio = {
            let mut recorder = self.recorder.lock().await;
            if !recorder.is_recording() {
                bail!("Recording not active");
            }
            recorder.stop().await.context("Failed to stop recording")?
        };

        info!("Sending {} bytes of recorded audio", audio.len());
        self.socket.send(OutboundMessage::Audio(audio));
        Ok(())
    }

    pub async fn is_recording(&self) -> bool {
        self.recorder.lock().await.is_recording()
    }

    pub fn send_text(&self, text: impl Into<String>) {
        self.socket.send(OutboundMessage::Text(text.into()));
    }

    /// Get current session statistics
    pub async fn stats(&self) -> SessionStats {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStats {
            session_id: self.config.session_id.clone(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            is_recording: self.is_recording().await,
            messages: self.counters.snapshot(),
            playback: self.playback.snapshot(),
            connection: self.socket.status(),
        }
    }

    /// Discard any recording, close the socket and drop pending playback.
    pub async fn shutdown(self) -> SessionStats {
        info!("Stopping memo session: {}", self.config.session_id);

        {
            let mut recorder = self.recorder.lock().await;
            if recorder.is_recording() {
                if let Err(e) = recorder.stop().await {
                    error!("Failed to stop recorder: {:#}", e);
                }
            }
        }

        let stats = self.stats().await;

        let Self {
            socket,
            playback,
            dispatch_task,
            status_task,
            ..
        } = self;

        socket.shutdown().await;

        // The socket driver owned the inbound sender, so routing ends on its own.
        if let Err(e) = dispatch_task.await {
            error!("Dispatch task panicked: {}", e);
        }
        status_task.abort();

        let dropped = playback.clear();
        if dropped > 0 {
            info!("Dropped {} queued audio fragments", dropped);
        }

        info!("Memo session stopped");
        stats
    }
}
