use std::path::PathBuf;
use std::time::Duration;

use tokio::sync::mpsc;

use super::capture::CaptureError;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

/// Configuration for a capture backend
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Preferred sample rate (the microphone may deliver its native rate instead)
    pub target_sample_rate: u32,
    /// Target channel count (1 = mono, 2 = stereo)
    pub target_channels: u16,
    /// Frame size in milliseconds (affects visualizer latency)
    pub buffer_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            target_channels: 1,
            buffer_duration_ms: 100,
        }
    }
}

impl From<&crate::config::CaptureSettings> for CaptureConfig {
    fn from(settings: &crate::config::CaptureSettings) -> Self {
        Self {
            target_sample_rate: settings.sample_rate,
            target_channels: settings.channels,
            buffer_duration_ms: settings.buffer_duration_ms,
        }
    }
}

/// Audio capture backend trait
///
/// Implementations:
/// - Microphone: cpal default input device (`microphone` feature)
/// - File: replay a WAV file (for testing and headless use)
///
/// The frame channel closing is the backend's signal that it has stopped
/// producing audio, whether because `stop` was called or the input ran out.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Start capturing audio
    ///
    /// Returns a channel receiver that will receive audio frames. Failures
    /// that happen after startup (device unplugged, stream errors) are
    /// reported on `errors`.
    async fn start(
        &mut self,
        errors: mpsc::UnboundedSender<CaptureError>,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError>;

    /// Stop capturing audio
    async fn stop(&mut self) -> Result<(), CaptureError>;

    /// Check if backend is currently capturing
    fn is_capturing(&self) -> bool;

    /// Get backend name for logging
    fn name(&self) -> &str;
}

/// Where captured audio comes from
#[derive(Debug, Clone)]
pub enum CaptureSource {
    /// Default input device
    Microphone,
    /// WAV file replayed as if it were live
    File { path: PathBuf, realtime: bool },
}

/// Capture backend factory
pub struct CaptureBackendFactory;

impl CaptureBackendFactory {
    pub fn create(
        source: CaptureSource,
        config: CaptureConfig,
    ) -> Result<Box<dyn CaptureBackend>, CaptureError> {
        match source {
            CaptureSource::Microphone => {
                #[cfg(feature = "microphone")]
                {
                    let backend = super::microphone::MicrophoneBackend::new(config);
                    Ok(Box::new(backend))
                }

                #[cfg(not(feature = "microphone"))]
                {
                    let _ = config;
                    Err(CaptureError::NoDevice(
                        "built without the `microphone` feature; use --input <WAV>".to_string(),
                    ))
                }
            }

            CaptureSource::File { path, realtime } => {
                let backend = super::file::FileBackend::new(path, config).realtime(realtime);
                Ok(Box::new(backend))
            }
        }
    }
}
