//! Capture service: owns the backend and the live stream for one recording at a time.
//!
//! `start` hands out a [`LiveStream`] together with a [`StopToken`], so a
//! stream is never given out without a way to stop it. `stop` finalizes the
//! recording into an [`AudioClip`] exactly once; later calls with the same
//! token return the cached clip.

use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{AudioFrame, CaptureBackend};
use super::clip::AudioClip;

/// Frames buffered per live subscriber before it starts lagging
const LIVE_CHANNEL_CAPACITY: usize = 64;

/// Capture failures surfaced to the session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No audio input available: {0}")]
    NoDevice(String),

    #[error("Audio stream failed: {0}")]
    Stream(String),

    #[error("Capture already in progress")]
    AlreadyCapturing,

    #[error("No capture in progress")]
    NotCapturing,

    #[error("Stop token does not belong to the current capture")]
    StaleToken,

    #[error("Failed to encode captured audio: {0}")]
    Encode(String),
}

/// Identifies one capture run; required to stop it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StopToken {
    run: u64,
}

/// Non-owning subscription to the frames of the active capture
///
/// Holding a `LiveStream` never keeps the microphone open; only
/// [`CaptureService::stop`] releases the device.
pub struct LiveStream {
    rx: broadcast::Receiver<AudioFrame>,
}

impl LiveStream {
    /// Next captured frame. Frames missed by a slow consumer are skipped.
    pub async fn next(&mut self) -> Option<AudioFrame> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Live stream consumer lagged, skipped {} frames", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Non-blocking variant for render loops
    pub fn try_next(&mut self) -> Option<AudioFrame> {
        loop {
            match self.rx.try_recv() {
                Ok(frame) => return Some(frame),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

/// Cloneable source of [`LiveStream`] subscriptions
#[derive(Clone)]
pub struct LiveFeed {
    tx: broadcast::Sender<AudioFrame>,
}

impl LiveFeed {
    pub fn subscribe(&self) -> LiveStream {
        LiveStream {
            rx: self.tx.subscribe(),
        }
    }
}

struct CaptureRun {
    token: StopToken,
    collector: Option<JoinHandle<Vec<AudioFrame>>>,
    input_ended: watch::Receiver<bool>,
    clip: Option<AudioClip>,
}

pub struct CaptureService {
    backend: Box<dyn CaptureBackend>,
    live_tx: broadcast::Sender<AudioFrame>,
    errors_tx: mpsc::UnboundedSender<CaptureError>,
    errors_rx: Option<mpsc::UnboundedReceiver<CaptureError>>,
    run: Option<CaptureRun>,
    runs_started: u64,
}

impl CaptureService {
    pub fn new(backend: Box<dyn CaptureBackend>) -> Self {
        let (live_tx, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        Self {
            backend,
            live_tx,
            errors_tx,
            errors_rx: Some(errors_rx),
            run: None,
            runs_started: 0,
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn live_feed(&self) -> LiveFeed {
        LiveFeed {
            tx: self.live_tx.clone(),
        }
    }

    /// Take the receiving end of the capture error channel (once)
    pub fn take_errors(&mut self) -> Option<mpsc::UnboundedReceiver<CaptureError>> {
        self.errors_rx.take()
    }

    /// True while a run is active and not yet finalized
    pub fn is_capturing(&self) -> bool {
        self.run.as_ref().is_some_and(|r| r.clip.is_none())
    }

    /// Resolves to `true` once the backend stops producing frames on its own
    /// (or because of `stop`). `None` if nothing was ever started.
    pub fn input_ended(&self) -> Option<watch::Receiver<bool>> {
        self.run.as_ref().map(|r| r.input_ended.clone())
    }

    /// Open the input and start buffering frames
    pub async fn start(&mut self) -> Result<(LiveStream, StopToken), CaptureError> {
        if self.is_capturing() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let mut frames_rx = self.backend.start(self.errors_tx.clone()).await?;

        self.runs_started += 1;
        let token = StopToken {
            run: self.runs_started,
        };

        info!(
            "Capture run {} started ({})",
            token.run,
            self.backend.name()
        );

        // Subscribe before the collector runs so the first frames are not missed
        let live = LiveStream {
            rx: self.live_tx.subscribe(),
        };

        let live_tx = self.live_tx.clone();
        let (ended_tx, ended_rx) = watch::channel(false);

        let collector = tokio::spawn(async move {
            let mut frames = Vec::new();
            while let Some(frame) = frames_rx.recv().await {
                // No subscribers is fine
                let _ = live_tx.send(frame.clone());
                frames.push(frame);
            }
            let _ = ended_tx.send(true);
            frames
        });

        self.run = Some(CaptureRun {
            token,
            collector: Some(collector),
            input_ended: ended_rx,
            clip: None,
        });

        Ok((live, token))
    }

    /// Stop the run identified by `token` and return its finalized clip
    ///
    /// Idempotent: once finalized, the same clip is returned without touching
    /// the backend again. A run that fails to finalize is discarded, so the
    /// next `start` can open the input again.
    pub async fn stop(&mut self, token: &StopToken) -> Result<AudioClip, CaptureError> {
        let run = self.run.as_mut().ok_or(CaptureError::NotCapturing)?;
        if run.token != *token {
            return Err(CaptureError::StaleToken);
        }
        if let Some(clip) = &run.clip {
            debug!("Capture run {} already finalized", token.run);
            return Ok(clip.clone());
        }

        match self.finalize().await {
            Ok(clip) => {
                if let Some(run) = self.run.as_mut() {
                    run.clip = Some(clip.clone());
                }
                Ok(clip)
            }
            Err(e) => {
                warn!("Capture run {} discarded: {}", token.run, e);
                if let Some(collector) = self.run.take().and_then(|mut r| r.collector.take()) {
                    collector.abort();
                }
                Err(e)
            }
        }
    }

    async fn finalize(&mut self) -> Result<AudioClip, CaptureError> {
        self.backend.stop().await?;

        let collector = self.run.as_mut().and_then(|r| r.collector.take());
        let frames = match collector {
            Some(collector) => collector
                .await
                .map_err(|e| CaptureError::Stream(format!("frame collector failed: {}", e)))?,
            None => Vec::new(),
        };

        let clip =
            AudioClip::from_frames(&frames).map_err(|e| CaptureError::Encode(e.to_string()))?;

        info!(
            "Capture finalized: {} frames, {:.1}s, {} bytes",
            frames.len(),
            clip.duration().as_secs_f64(),
            clip.len()
        );

        Ok(clip)
    }
}
