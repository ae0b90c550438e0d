pub mod audio;
pub mod config;
pub mod display;
pub mod http;
pub mod recognition;
pub mod session;

pub use audio::{
    AudioClip, AudioFile, AudioFrame, CaptureBackend, CaptureBackendFactory, CaptureConfig,
    CaptureError, CaptureService, CaptureSource, FileBackend, LiveStream, StopToken,
};
pub use config::Config;
pub use http::{create_router, AppState};
pub use recognition::{GeminiClient, RecognitionError, Recognizer, SongRecord};
pub use session::{
    Session, SessionController, SessionError, SessionHandle, SessionSnapshot, SessionStatus,
};
