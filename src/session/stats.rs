use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::playback::QueueSnapshot;
use crate::socket::ConnectionStatus;

/// Statistics about a memo session
#[derive(Debug, Clone)]
pub struct SessionStats {
    pub session_id: String,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Whether a recording is in progress
    pub is_recording: bool,

    /// Inbound messages routed so far, by kind
    pub messages: MessageCounts,

    /// Playback queue state
    pub playback: QueueSnapshot,

    /// Socket state at the time of the snapshot
    pub connection: ConnectionStatus,
}

/// Per-kind counters for routed server messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MessageCounts {
    pub text: u64,
    pub objects: u64,
    pub audio: u64,
    pub errors: u64,
    pub other: u64,
    pub reminders_saved: u64,
}

#[derive(Default)]
pub(crate) struct MessageCounters {
    pub text: AtomicU64,
    pub objects: AtomicU64,
    pub audio: AtomicU64,
    pub errors: AtomicU64,
    pub other: AtomicU64,
    pub reminders_saved: AtomicU64,
}

impl MessageCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MessageCounts {
        MessageCounts {
            text: self.text.load(Ordering::SeqCst),
            objects: self.objects.load(Ordering::SeqCst),
            audio: self.audio.load(Ordering::SeqCst),
            errors: self.errors.load(Ordering::SeqCst),
            other: self.other.load(Ordering::SeqCst),
            reminders_saved: self.reminders_saved.load(Ordering::SeqCst),
        }
    }
}
