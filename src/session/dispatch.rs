use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::stats::MessageCounters;
use crate::playback::PlaybackQueue;
use crate::reminders::{ExtractionObject, Reminder, ReminderList};
use crate::socket::{ConnectionStatus, InboundMessage};

/// Events for the user-facing surface
#[derive(Debug, Clone, PartialEq)]
pub enum UiEvent {
    /// Text to display as the server's response
    Response {
        text: String,
        received_at: DateTime<Utc>,
    },
    ReminderSaved(Reminder),
    ServerError(String),
    Connection(ConnectionStatus),
}

/// Routes server messages to display, reminder storage and playback
#[derive(Clone)]
pub struct Dispatcher {
    playback: PlaybackQueue,
    reminders: ReminderList,
    events: mpsc::UnboundedSender<UiEvent>,
    counters: Arc<MessageCounters>,
}

impl Dispatcher {
    pub fn new(
        playback: PlaybackQueue,
        reminders: ReminderList,
        events: mpsc::UnboundedSender<UiEvent>,
    ) -> Self {
        Self::with_counters(playback, reminders, events, Arc::default())
    }

    pub(crate) fn with_counters(
        playback: PlaybackQueue,
        reminders: ReminderList,
        events: mpsc::UnboundedSender<UiEvent>,
        counters: Arc<MessageCounters>,
    ) -> Self {
        Self {
            playback,
            reminders,
            events,
            counters,
        }
    }

    /// Route one message. Awaited in delivery order by the session.
    pub async fn dispatch(&self, message: InboundMessage) {
        debug!("Server replied, msg type: {}", message.kind());

        match message {
            InboundMessage::Text(text) => {
                MessageCounters::bump(&self.counters.text);
                self.emit(UiEvent::Response {
                    text,
                    received_at: Utc::now(),
                });
            }
            InboundMessage::Object(payload) => {
                MessageCounters::bump(&self.counters.objects);
                self.handle_object(payload).await;
            }
            InboundMessage::Audio(fragment) => {
                MessageCounters::bump(&self.counters.audio);
                debug!("Server reply [sentence ID]: {}", fragment.sequence_id);
                self.playback.enqueue(fragment);
            }
            InboundMessage::Error(message) => {
                MessageCounters::bump(&self.counters.errors);
                warn!("Server error: {}", message);
                self.emit(UiEvent::ServerError(message));
            }
            InboundMessage::Pong => {}
            InboundMessage::Other { kind, .. } => {
                MessageCounters::bump(&self.counters.other);
                debug!("Ignoring '{}' message", kind);
            }
        }
    }

    async fn handle_object(&self, payload: Value) {
        let object: ExtractionObject = match serde_json::from_value(payload) {
            Ok(object) => object,
            Err(e) => {
                warn!("Failed to parse extraction object: {}", e);
                return;
            }
        };

        if let Some(reminder) = object.to_reminder() {
            let reminders = self.reminders.clone();
            let saved = reminder.clone();
            let stored = tokio::task::spawn_blocking(move || reminders.add(saved))
                .await
                .unwrap_or_else(|e| Err(anyhow::anyhow!("reminder store task failed: {}", e)));
            match stored {
                Ok(_) => {
                    MessageCounters::bump(&self.counters.reminders_saved);
                    info!("Saved new reminder: {} at {}", reminder.description, reminder.datetime);
                    self.emit(UiEvent::ReminderSaved(reminder));
                }
                Err(e) => error!("Failed to save reminder: {:#}", e),
            }
        }

        if let Some(text) = object.response_text() {
            self.emit(UiEvent::Response {
                text,
                received_at: Utc::now(),
            });
        }
    }

    pub(crate) fn emit(&self, event: UiEvent) {
        if self.events.send(event).is_err() {
            debug!("UI event receiver dropped");
        }
    }
}
