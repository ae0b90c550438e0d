use anyhow::{Context, Result};
use hound::{SampleFormat, WavReader};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use super::capture::CaptureError;
use super::convert::{downmix_to_mono, f32_to_i16};

/// A WAV file decoded into 16-bit PCM
pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path).context("Failed to open WAV file")?;

        let spec = reader.spec();
        let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
            (SampleFormat::Int, 16) => reader
                .into_samples::<i16>()
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
            (SampleFormat::Int, bits) => {
                let shift = bits.saturating_sub(16) as u32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| (v >> shift) as i16))
                    .collect::<Result<Vec<_>, _>>()
                    .context("Failed to read audio samples")?
            }
            (SampleFormat::Float, _) => reader
                .into_samples::<f32>()
                .map(|s| s.map(f32_to_i16))
                .collect::<Result<Vec<_>, _>>()
                .context("Failed to read audio samples")?,
        };

        let duration_seconds =
            samples.len() as f64 / (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }

    /// Split into frames of `frame_ms`, downmixed to mono when `mono` is set
    pub fn frames(&self, frame_ms: u64, mono: bool) -> Vec<AudioFrame> {
        let (samples, channels) = if mono && self.channels > 1 {
            (downmix_to_mono(&self.samples, self.channels), 1)
        } else {
            (self.samples.clone(), self.channels)
        };

        let per_frame =
            ((self.sample_rate as u64 * frame_ms / 1000).max(1) * channels as u64) as usize;

        samples
            .chunks(per_frame)
            .enumerate()
            .map(|(i, chunk)| AudioFrame {
                samples: chunk.to_vec(),
                sample_rate: self.sample_rate,
                channels,
                timestamp_ms: i as u64 * frame_ms,
            })
            .collect()
    }
}

/// Capture backend that replays a WAV file as if it were a live input
///
/// With `realtime` set, frames are paced at their natural rate so the
/// auto-stop window behaves as it would with a microphone. The frame channel
/// closes when the file is exhausted.
pub struct FileBackend {
    path: PathBuf,
    config: CaptureConfig,
    realtime: bool,
    task: Option<JoinHandle<()>>,
}

impl FileBackend {
    pub fn new(path: impl Into<PathBuf>, config: CaptureConfig) -> Self {
        Self {
            path: path.into(),
            config,
            realtime: false,
            task: None,
        }
    }

    pub fn realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }
}

#[async_trait::async_trait]
impl CaptureBackend for FileBackend {
    async fn start(
        &mut self,
        _errors: mpsc::UnboundedSender<CaptureError>,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.task.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let audio = AudioFile::open(&self.path)
            .map_err(|e| CaptureError::NoDevice(format!("{:#}", e)))?;
        let frames = audio.frames(
            self.config.buffer_duration_ms,
            self.config.target_channels == 1,
        );
        let realtime = self.realtime;

        let (tx, rx) = mpsc::channel(64);

        info!(
            "Replaying {} ({} frames, realtime={})",
            self.path.display(),
            frames.len(),
            realtime
        );

        self.task = Some(tokio::spawn(async move {
            for frame in frames {
                let pause = frame.duration();
                if tx.send(frame).await.is_err() {
                    break;
                }
                if realtime {
                    tokio::time::sleep(pause).await;
                }
            }
            debug!("File replay finished");
        }));

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(task) = self.task.take() {
            task.abort();
            // Wait so the frame sender is dropped before we return
            let _ = task.await;
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "WAV file replay"
    }
}

/// Expand `~` in a user-supplied path
pub fn expand_path(path: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(path).into_owned())
}
