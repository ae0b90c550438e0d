// Shared test doubles for capture and recognition

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tunegem::audio::{AudioFrame, CaptureBackend, CaptureError};
use tunegem::{AudioClip, RecognitionError, Recognizer, SongRecord};

/// How a [`ScriptedBackend`] behaves once started
#[derive(Clone)]
pub enum Script {
    /// Emit the frames, then keep the input open until stopped
    Open { frames: usize },
    /// Emit the frames, then close the input like the end of a file
    EndOfInput { frames: usize },
    /// Refuse to start
    Fail(CaptureError),
}

/// Counters and hooks shared between a test and its backend
#[derive(Default)]
pub struct BackendHooks {
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    /// Number of upcoming `stop` calls that release the device but report an error
    pub failing_stops: AtomicUsize,
    pub errors: Mutex<Option<mpsc::UnboundedSender<CaptureError>>>,
}

impl BackendHooks {
    pub fn stops(&self) -> usize {
        self.stops.load(Ordering::SeqCst)
    }

    /// Make the next `count` stops fail
    pub fn fail_stops(&self, count: usize) {
        self.failing_stops.store(count, Ordering::SeqCst);
    }

    pub fn starts(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// Report a runtime failure as the device would
    pub fn inject_error(&self, err: CaptureError) {
        if let Some(tx) = self.errors.lock().unwrap().as_ref() {
            let _ = tx.send(err);
        }
    }
}

pub struct ScriptedBackend {
    script: Script,
    hooks: Arc<BackendHooks>,
    sender: Option<mpsc::Sender<AudioFrame>>,
}

impl ScriptedBackend {
    pub fn new(script: Script) -> (Self, Arc<BackendHooks>) {
        let hooks = Arc::new(BackendHooks::default());
        (
            Self {
                script,
                hooks: Arc::clone(&hooks),
                sender: None,
            },
            hooks,
        )
    }
}

pub fn test_frame(index: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![(index as i16) * 10; 160],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: index as u64 * 10,
    }
}

#[async_trait::async_trait]
impl CaptureBackend for ScriptedBackend {
    async fn start(
        &mut self,
        errors: mpsc::UnboundedSender<CaptureError>,
    ) -> Result<mpsc::Receiver<AudioFrame>, CaptureError> {
        self.hooks.starts.fetch_add(1, Ordering::SeqCst);
        *self.hooks.errors.lock().unwrap() = Some(errors);

        let (frames, keep_open) = match &self.script {
            Script::Open { frames } => (*frames, true),
            Script::EndOfInput { frames } => (*frames, false),
            Script::Fail(err) => return Err(err.clone()),
        };

        let (tx, rx) = mpsc::channel(frames.max(1));
        for i in 0..frames {
            tx.try_send(test_frame(i)).unwrap();
        }
        if keep_open {
            self.sender = Some(tx);
        }

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<(), CaptureError> {
        self.hooks.stops.fetch_add(1, Ordering::SeqCst);
        self.sender = None;

        let failing = &self.hooks.failing_stops;
        if failing.load(Ordering::SeqCst) > 0 {
            failing.fetch_sub(1, Ordering::SeqCst);
            return Err(CaptureError::Stream("glitch on release".to_string()));
        }
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.sender.is_some()
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Recognizer that answers with a fixed outcome after a delay
pub struct ScriptedRecognizer {
    outcome: Result<Option<SongRecord>, RecognitionError>,
    delay: Duration,
    pub calls: AtomicUsize,
    pub last_clip: Mutex<Option<AudioClip>>,
}

impl ScriptedRecognizer {
    pub fn new(outcome: Result<Option<SongRecord>, RecognitionError>) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            last_clip: Mutex::new(None),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Recognizer for ScriptedRecognizer {
    async fn identify(&self, clip: &AudioClip) -> Result<Option<SongRecord>, RecognitionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_clip.lock().unwrap() = Some(clip.clone());
        tokio::time::sleep(self.delay).await;
        self.outcome.clone()
    }
}

pub fn song() -> SongRecord {
    SongRecord {
        artist: "Daft Punk".to_string(),
        title: "Get Lucky".to_string(),
        genre: "Disco".to_string(),
        fun_fact: "Features Nile Rodgers".to_string(),
        confidence: 92.0,
        source_links: vec!["https://en.wikipedia.org/wiki/Get_Lucky".to_string()],
    }
}

/// Write a 16-bit sine-tone WAV of `seconds` length
pub fn write_wav(path: &std::path::Path, seconds: f32, sample_rate: u32, channels: u16) {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec).unwrap();
    let total = (seconds * sample_rate as f32) as usize;
    for i in 0..total {
        let t = i as f32 / sample_rate as f32;
        let value = ((t * 440.0 * std::f32::consts::TAU).sin() * 8000.0) as i16;
        for _ in 0..channels {
            writer.write_sample(value).unwrap();
        }
    }
    writer.finalize().unwrap();
}
