// Microphone backend using cpal's default input device

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use std::sync::mpsc as std_mpsc;
use std::thread::JoinHandle;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use super::backend::{AudioFrame, CaptureBackend, CaptureConfig};
use super::capture::CaptureError;
use super::convert::{downmix_to_mono, f32_to_i16};

/// Microphone capture backend
///
/// `cpal::Stream` is not `Send`, so the stream lives on a dedicated thread
/// for the duration of the capture. The thread parks until `stop` signals it,
/// then drops the stream, which closes the frame channel.
pub struct MicrophoneBackend {
    config: CaptureConfig,
    stop_tx: Option<std_mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl MicrophoneBackend {
    pub fn new(config: CaptureConfig) -> Self {
        Self {
            config,
            stop_tx: None,
            thread: None,
        }
    }
}

/// Accumulates callback data into fixed-size mono frames
struct FrameAssembler {
    tx: mpsc::Sender<AudioFrame>,
    pending: Vec<i16>,
    frame_len: usize,
    sample_rate: u32,
    channels: u16,
    emitted_samples: u64,
}

impl FrameAssembler {
    fn push(&mut self, interleaved: &[i16]) {
        let mono = if self.channels == 1 {
            interleaved.to_vec()
        } else {
            downmix_to_mono(interleaved, self.channels)
        };
        self.pending.extend_from_slice(&mono);

        while self.pending.len() >= self.frame_len {
            let samples: Vec<i16> = self.pending.drain(..self.frame_len).collect();
            let timestamp_ms = self.emitted_samples * 1000 / self.sample_rate as u64;
            self.emitted_samples += samples.len() as u64;

            let frame = AudioFrame {
                samples,
                sample_rate: self.sample_rate,
                channels: 1,
                timestamp_ms,
            };

            // Never block the audio callback
            if self.tx.try_send(frame).is_err() {
                warn!("Capture consumer is behind, dropping a frame");
            }
        }
    }
}

fn open_stream(
    config: &CaptureConfig,
    frames_tx: mpsc::Sender<AudioFrame>,
    errors: mpsc::UnboundedSender<CaptureError>,
) -> Result<cpal::Stream, CaptureError> {
    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or_else(|| CaptureError::NoDevice("no default input device".to_string()))?;

    let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());

    let supported = device.default_input_config().map_err(|e| match e {
        cpal::DefaultStreamConfigError::DeviceNotAvailable => {
            CaptureError::NoDevice(format!("{} is not available", device_name))
        }
        other => CaptureError::PermissionDenied(other.to_string()),
    })?;

    let sample_rate = supported.sample_rate().0;
    let channels = supported.channels();
    let sample_format = supported.sample_format();

    info!(
        "Using input device '{}': {}Hz, {} channels, {:?} (requested {}Hz)",
        device_name, sample_rate, channels, sample_format, config.target_sample_rate
    );

    let frame_len = ((sample_rate as u64 * config.buffer_duration_ms / 1000).max(1)) as usize;
    let mut assembler = FrameAssembler {
        tx: frames_tx,
        pending: Vec::with_capacity(frame_len * 2),
        frame_len,
        sample_rate,
        channels,
        emitted_samples: 0,
    };

    let stream_config: cpal::StreamConfig = supported.config();
    let on_error = move |err: cpal::StreamError| {
        error!("Audio stream error: {}", err);
        let _ = errors.send(CaptureError::Stream(err.to_string()));
    };

    let stream = match sample_format {
        cpal::SampleFormat::F32 => device.build_input_stream(
            &stream_config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> = data.iter().map(|&s| f32_to_i16(s)).collect();
                assembler.push(&converted);
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::I16 => device.build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                assembler.push(data);
            },
            on_error,
            None,
        ),
        cpal::SampleFormat::U16 => device.build_input_stream(
            &stream_config,
            move |data: &[u16], _: &cpal::InputCallbackInfo| {
                let converted: Vec<i16> =
                    data.iter().map(|&s| (s as i32 - 32768) as i16).collect();
                assembler.push(&converted);
            },
            on_error,
            None,
        ),
        other => {
            return Err(CaptureError::NoDevice(format!(
                "unsupported sample format {:?}",
                other
            )))
        }
    }
    .map_err(|e| match e {
        cpal::BuildStreamError::DeviceNotAvailable => {
            CaptureError::NoDevice(format!("{} is not available", device_name))
        }
        cpal::BuildStreamError::BackendSpecific { err } => {
            CaptureError::PermissionDenied(err.to_string())
        }
        other => CaptureError::Stream(other.to_string()),
    })?;

    stream
        .play()
        .map_err(|e| CaptureError::PermissionDenied(e.to_string()))?;

    Ok(stream)
}

#[async_trait::async_trait]
impl CaptureBackend for MicrophoneBackend {
    async fn start(
        &mut self,
        errors: mpsc::UnboundedSender<CaptureError>,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        if self.thread.is_some() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let (frames_tx, frames_rx) = mpsc::channel(64);
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = std_mpsc::channel::<()>();
        let config = self.config.clone();

        let thread = std::thread::Builder::new()
            .name("tunegem-mic".to_string())
            .spawn(move || {
                let stream = match open_stream(&config, frames_tx, errors) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Blocks until stop() or the backend is dropped
                let _ = stop_rx.recv();
                drop(stream);
                info!("Microphone stream closed");
            })
            .map_err(|e| CaptureError::Stream(format!("failed to spawn capture thread: {}", e)))?;

        match ready_rx.await {
            Ok(Ok(())) => {
                self.stop_tx = Some(stop_tx);
                self.thread = Some(thread);
                Ok(frames_rx)
            }
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => Err(CaptureError::Stream(
                "capture thread exited during startup".to_string(),
            )),
        }
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        if let Some(stop_tx) = self.stop_tx.take() {
            let _ = stop_tx.send(());
        }

        if let Some(thread) = self.thread.take() {
            tokio::task::spawn_blocking(move || thread.join())
                .await
                .map_err(|e| CaptureError::Stream(e.to_string()))?
                .map_err(|_| CaptureError::Stream("capture thread panicked".to_string()))?;
        }

        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.thread.is_some()
    }

    fn name(&self) -> &str {
        "cpal microphone"
    }
}
