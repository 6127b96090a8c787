use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use super::sink::AudioSink;

/// One synthesized speech fragment as received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioFragment {
    /// Server-assigned sentence id, for diagnostics only
    pub sequence_id: i64,
    /// Encoded audio (WAV)
    pub payload: Vec<u8>,
}

/// Read-only view of the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Sequence ids waiting to play, head first
    pub pending: Vec<i64>,
    /// Sequence id currently playing
    pub playing: Option<i64>,
    pub played: u64,
    pub failed: u64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<AudioFragment>,
    playing: Option<i64>,
}

struct Inner {
    state: Mutex<QueueState>,
    sink: Arc<dyn AudioSink>,
    idle: Notify,
    played: AtomicU64,
    failed: AtomicU64,
}

/// FIFO playback queue with a single consumer.
///
/// Fragments play strictly one at a time, in enqueue order. Cloning yields
/// another handle to the same queue.
#[derive(Clone)]
pub struct PlaybackQueue {
    inner: Arc<Inner>,
}

impl PlaybackQueue {
    pub fn new(sink: Arc<dyn AudioSink>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                sink,
                idle: Notify::new(),
                played: AtomicU64::new(0),
                failed: AtomicU64::new(0),
            }),
        }
    }

    /// Append to the tail and start playback if nothing is playing.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, fragment: AudioFragment) {
        {
            let mut state = self.state();
            debug!(
                "Queued audio fragment {} ({} bytes, {} pending)",
                fragment.sequence_id,
                fragment.payload.len(),
                state.pending.len() + 1
            );
            state.pending.push_back(fragment);
        }
        self.drain();
    }

    /// Manual trigger for the drain step. Safe to call at any time.
    pub fn play_next(&self) {
        self.drain();
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.state();
        QueueSnapshot {
            pending: state.pending.iter().map(|f| f.sequence_id).collect(),
            playing: state.playing,
            played: self.inner.played.load(Ordering::SeqCst),
            failed: self.inner.failed.load(Ordering::SeqCst),
        }
    }

    pub fn is_playing(&self) -> bool {
        self.state().playing.is_some()
    }

    pub fn is_idle(&self) -> bool {
        let state = self.state();
        state.playing.is_none() && state.pending.is_empty()
    }

    /// Drop everything not yet playing. Returns how many were dropped.
    pub fn clear(&self) -> usize {
        let dropped = {
            let mut state = self.state();
            let dropped = state.pending.len();
            state.pending.clear();
            dropped
        };
        if self.is_idle() {
            self.inner.idle.notify_waiters();
        }
        dropped
    }

    /// Resolves once nothing is playing and nothing is pending.
    pub async fn idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    fn drain(&self) {
        let next = {
            let mut state = self.state();
            if state.playing.is_some() {
                return;
            }
            match state.pending.pop_front() {
                Some(fragment) => {
                    state.playing = Some(fragment.sequence_id);
                    fragment
                }
                None => return,
            }
        };

        let queue = self.clone();
        tokio::spawn(async move {
            queue.play(next).await;
        });
    }

    async fn play(self, fragment: AudioFragment) {
        debug!(
            "Playing audio fragment {} via {}",
            fragment.sequence_id,
            self.inner.sink.name()
        );

        // A panicking sink must not leave the cursor set.
        let sink = Arc::clone(&self.inner.sink);
        let AudioFragment {
            sequence_id,
            payload,
        } = fragment;
        let outcome = tokio::spawn(async move { sink.play(&payload).await }).await;

        match outcome {
            Ok(Ok(())) => {
                self.inner.played.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(e)) => {
                self.inner.failed.fetch_add(1, Ordering::SeqCst);
                warn!("Playback of fragment {} failed: {:#}", sequence_id, e);
            }
            Err(e) => {
                self.inner.failed.fetch_add(1, Ordering::SeqCst);
                error!("Playback of fragment {} aborted: {}", sequence_id, e);
            }
        }

        let now_idle = {
            let mut state = self.state();
            state.playing = None;
            state.pending.is_empty()
        };
        if now_idle {
            self.inner.idle.notify_waiters();
        }

        // Let other tasks run between fragments.
        tokio::task::yield_now().await;
        self.drain();
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
