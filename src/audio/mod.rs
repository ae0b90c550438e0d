pub mod backend;
pub mod capture;
pub mod clip;
pub mod convert;
pub mod file;
pub mod probe;
pub mod spectrum;

#[cfg(feature = "microphone")]
pub mod microphone;

pub use backend::{AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig, CaptureSource};
pub use capture::{CaptureError, CaptureService, LiveFeed, LiveStream, StopToken};
pub use clip::AudioClip;
pub use file::{AudioFile, FileBackend};
pub use probe::probe_file;
pub use spectrum::SpectrumAnalyzer;
