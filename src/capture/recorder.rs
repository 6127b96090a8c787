use anyhow::{bail, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, Stream, StreamConfig};
use std::path::PathBuf;
use std::sync::{mpsc as std_mpsc, Arc, Mutex};
use std::thread::JoinHandle;
use tokio::sync::oneshot;
use tracing::{info, warn};

use super::wav::{encode_wav, AudioFile};

/// Microphone capture device
///
/// Implementations:
/// - `CpalRecorder`: system input device via cpal
/// - `FileRecorder`: replays a WAV file (demos, tests)
#[async_trait::async_trait]
pub trait Recorder: Send {
    /// Check that capture is possible. Never fails: denial is `false`.
    async fn request_permission(&mut self) -> bool;

    /// Start capturing audio
    async fn start(&mut self) -> Result<()>;

    /// Stop capturing and return the recording as WAV bytes
    async fn stop(&mut self) -> Result<Vec<u8>>;

    /// Check if currently capturing
    fn is_recording(&self) -> bool;

    /// Recorder name for logging
    fn name(&self) -> &str;
}

/// Records mono 16-bit audio from a cpal input device.
///
/// cpal streams are not `Send`, so each recording owns a capture thread that
/// builds the stream, keeps it alive and drops it when told to stop.
pub struct CpalRecorder {
    device_name: Option<String>,
    sample_rate: u32,
    capture: Option<Capture>,
}

struct Capture {
    stop: std_mpsc::Sender<()>,
    thread: JoinHandle<()>,
    samples: Arc<Mutex<Vec<i16>>>,
    sample_rate: u32,
}

impl CpalRecorder {
    /// `device_name` of `None` uses the host's default input. `sample_rate` is
    /// preferred; the device default is used when it is not supported.
    pub fn new(device_name: Option<String>, sample_rate: u32) -> Self {
        Self {
            device_name,
            sample_rate,
            capture: None,
        }
    }
}

#[async_trait::async_trait]
impl Recorder for CpalRecorder {
    async fn request_permission(&mut self) -> bool {
        let name = self.device_name.clone();
        let probe = tokio::task::spawn_blocking(move || -> Result<String> {
            let device = find_input_device(name.as_deref())?;
            device
                .default_input_config()
                .context("Input device has no usable configuration")?;
            Ok(device.name().unwrap_or_else(|_| "unknown".into()))
        })
        .await;

        match probe {
            Ok(Ok(device)) => {
                info!("Microphone available: {}", device);
                true
            }
            Ok(Err(e)) => {
                warn!("Microphone permission denied: {:#}", e);
                false
            }
            Err(e) => {
                warn!("Microphone probe panicked: {}", e);
                false
            }
        }
    }

    async fn start(&mut self) -> Result<()> {
        if self.capture.is_some() {
            bail!("Recording already in progress");
        }

        let samples = Arc::new(Mutex::new(Vec::new()));
        let (ready_tx, ready_rx) = oneshot::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let device_name = self.device_name.clone();
        let preferred_rate = self.sample_rate;
        let buffer = Arc::clone(&samples);

        let thread = std::thread::Builder::new()
            .name("mic-capture".into())
            .spawn(move || {
                let stream = match open_input(device_name.as_deref(), preferred_rate, buffer) {
                    Ok((stream, rate)) => {
                        let _ = ready_tx.send(Ok(rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Returns on stop() or when the recorder is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .context("Failed to spawn capture thread")?;

        let sample_rate = ready_rx.await.context("Capture thread exited")??;

        self.capture = Some(Capture {
            stop: stop_tx,
            thread,
            samples,
            sample_rate,
        });

        info!("Recording started ({}Hz mono)", sample_rate);
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<u8>> {
        let capture = self.capture.take().context("No active recording")?;

        let _ = capture.stop.send(());
        let thread = capture.thread;
        match tokio::task::spawn_blocking(move || thread.join()).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Capture thread panicked"),
            Err(e) => warn!("Failed to join capture thread: {}", e),
        }

        let samples = std::mem::take(
            &mut *capture
                .samples
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        );
        info!(
            "Recording stopped: {:.1}s captured",
            samples.len() as f64 / capture.sample_rate.max(1) as f64
        );

        encode_wav(&samples, capture.sample_rate, 1)
    }

    fn is_recording(&self) -> bool {
        self.capture.is_some()
    }

    fn name(&self) -> &str {
        self.device_name.as_deref().unwrap_or("default input")
    }
}

fn find_input_device(name: Option<&str>) -> Result<cpal::Device> {
    let host = cpal::default_host();
    match name {
        Some(name) => host
            .input_devices()
            .context("Failed to list input devices")?
            .find(|d| d.name().map(|n| n == name).unwrap_or(false))
            .with_context(|| format!("Input device '{}' not found", name)),
        None => host
            .default_input_device()
            .context("No default input device"),
    }
}

/// Prefer `rate` with the fewest channels; fall back to the device default.
fn choose_config(device: &cpal::Device, rate: u32) -> Result<(StreamConfig, SampleFormat)> {
    if let Ok(ranges) = device.supported_input_configs() {
        let best = ranges
            .filter(|r| r.min_sample_rate().0 <= rate && r.max_sample_rate().0 >= rate)
            .filter(|r| matches!(r.sample_format(), SampleFormat::F32 | SampleFormat::I16))
            .min_by_key(|r| r.channels());
        if let Some(range) = best {
            let supported = range.with_sample_rate(SampleRate(rate));
            return Ok((supported.config(), supported.sample_format()));
        }
    }

    let default = device
        .default_input_config()
        .context("Input device has no usable configuration")?;
    warn!(
        "{}Hz unavailable, recording at {}Hz",
        rate,
        default.sample_rate().0
    );
    Ok((default.config(), default.sample_format()))
}

fn open_input(
    device_name: Option<&str>,
    preferred_rate: u32,
    samples: Arc<Mutex<Vec<i16>>>,
) -> Result<(Stream, u32)> {
    let device = find_input_device(device_name)?;
    info!(
        "Using input device: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let (config, format) = choose_config(&device, preferred_rate)?;
    let channels = config.channels as usize;
    let on_error = |err: cpal::StreamError| warn!("Audio input stream error: {}", err);

    let stream = match format {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                push_frames(&samples, data, channels, f32_to_i16)
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                push_frames(&samples, data, channels, |s| s)
            },
            on_error,
            None,
        ),
        other => bail!("Unsupported input sample format {:?}", other),
    }
    .context("Failed to build input stream")?;

    stream.play().context("Failed to start input stream")?;
    Ok((stream, config.sample_rate.0))
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

/// Downmix interleaved frames to mono and append them.
fn push_frames<T: Copy>(
    samples: &Mutex<Vec<i16>>,
    data: &[T],
    channels: usize,
    convert: impl Fn(T) -> i16,
) {
    let channels = channels.max(1);
    let mut samples = samples
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    samples.extend(data.chunks(channels).map(|frame| {
        let sum: i32 = frame.iter().map(|&s| convert(s) as i32).sum();
        (sum / frame.len() as i32) as i16
    }));
}

/// Serves an existing WAV file as the recording
pub struct FileRecorder {
    path: PathBuf,
    recording: bool,
}

impl FileRecorder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            recording: false,
        }
    }
}

#[async_trait::async_trait]
impl Recorder for FileRecorder {
    async fn request_permission(&mut self) -> bool {
        match hound::WavReader::open(&self.path) {
            Ok(_) => true,
            Err(e) => {
                warn!("Cannot use {} as input: {}", self.path.display(), e);
                false
            }
        }
    }

    async fn start(&mut self) -> Result<()> {
        if self.recording {
            bail!("Recording already in progress");
        }
        self.recording = true;
        info!("Recording started (file {})", self.path.display());
        Ok(())
    }

    async fn stop(&mut self) -> Result<Vec<u8>> {
        if !self.recording {
            bail!("No active recording");
        }
        self.recording = false;
        AudioFile::open(&self.path)?.to_wav_bytes()
    }

    fn is_recording(&self) -> bool {
        self.recording
    }

    fn name(&self) -> &str {
        "file"
    }
}
