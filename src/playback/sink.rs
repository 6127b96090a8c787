use anyhow::{anyhow, Context, Result};
use hound::WavReader;
use rodio::{Decoder, OutputStream, OutputStreamBuilder, Sink};
use std::io::Cursor;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use tokio::sync::oneshot;
use tracing::{debug, info};

/// Audio output device
#[async_trait::async_trait]
pub trait AudioSink: Send + Sync {
    /// Play one encoded fragment, resolving when playback has finished.
    async fn play(&self, audio: &[u8]) -> Result<()>;

    /// Sink name for logging
    fn name(&self) -> &str;
}

/// Basic facts about a WAV payload
#[derive(Debug, Clone, PartialEq)]
pub struct WavInfo {
    pub sample_rate: u32,
    pub channels: u16,
    pub duration_seconds: f64,
}

/// Parse the WAV header of `audio`, if it is one.
pub fn describe_wav(audio: &[u8]) -> Option<WavInfo> {
    let reader = WavReader::new(Cursor::new(audio)).ok()?;
    let spec = reader.spec();
    let frames = reader.duration() as f64;
    Some(WavInfo {
        sample_rate: spec.sample_rate,
        channels: spec.channels,
        duration_seconds: frames / spec.sample_rate.max(1) as f64,
    })
}

fn log_fragment(sink: &str, audio: &[u8]) {
    match describe_wav(audio) {
        Some(info) => debug!(
            "{}: {:.2}s of audio ({}Hz, {}ch)",
            sink, info.duration_seconds, info.sample_rate, info.channels
        ),
        None => debug!("{}: {} bytes of non-WAV audio", sink, audio.len()),
    }
}

/// Plays fragments on the default output device through rodio.
///
/// The output stream is not `Send`, so it lives on a dedicated thread that
/// plays one request at a time and reports back when the sink has drained.
pub struct RodioSink {
    requests: std_mpsc::Sender<PlayRequest>,
}

struct PlayRequest {
    audio: Vec<u8>,
    done: oneshot::Sender<Result<()>>,
}

impl RodioSink {
    pub fn open() -> Result<Self> {
        let (requests_tx, requests_rx) = std_mpsc::channel::<PlayRequest>();
        let (ready_tx, ready_rx) = std_mpsc::sync_channel::<Result<()>>(1);

        std::thread::Builder::new()
            .name("speaker".into())
            .spawn(move || {
                let stream = match OutputStreamBuilder::open_default_stream() {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(anyhow!("Failed to open audio output: {}", e)));
                        return;
                    }
                };
                // Ends when the last RodioSink handle is dropped.
                for request in requests_rx {
                    let result = play_blocking(&stream, request.audio);
                    let _ = request.done.send(result);
                }
            })
            .context("Failed to spawn playback thread")?;

        ready_rx.recv().context("Playback thread exited")??;
        info!("Audio output opened");
        Ok(Self {
            requests: requests_tx,
        })
    }
}

fn play_blocking(stream: &OutputStream, audio: Vec<u8>) -> Result<()> {
    let source = Decoder::new(Cursor::new(audio)).context("Failed to decode audio fragment")?;
    let sink = Sink::connect_new(stream.mixer());
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}

#[async_trait::async_trait]
impl AudioSink for RodioSink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        log_fragment("rodio", audio);

        let (done_tx, done_rx) = oneshot::channel();
        self.requests
            .send(PlayRequest {
                audio: audio.to_vec(),
                done: done_tx,
            })
            .map_err(|_| anyhow!("Playback thread has stopped"))?;

        done_rx
            .await
            .context("Playback thread dropped the fragment")?
    }

    fn name(&self) -> &str {
        "rodio"
    }
}

/// Writes each fragment to a directory instead of playing it
pub struct DirectorySink {
    dir: PathBuf,
    written: AtomicU64,
}

impl DirectorySink {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        Ok(Self {
            dir,
            written: AtomicU64::new(0),
        })
    }
}

#[async_trait::async_trait]
impl AudioSink for DirectorySink {
    async fn play(&self, audio: &[u8]) -> Result<()> {
        log_fragment("directory", audio);
        let index = self.written.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("fragment-{:04}.wav", index));
        tokio::fs::write(&path, audio)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
        debug!("Saved fragment to {}", path.display());
        Ok(())
    }

    fn name(&self) -> &str {
        "directory"
    }
}
