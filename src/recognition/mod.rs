//! Song identification through a hosted generative model
//!
//! - `client` - the Gemini `generateContent` call
//! - `parse` - extracting the JSON answer from free text
//! - `song` - the `SongRecord` result and its display helpers

pub mod client;
pub mod parse;
pub mod prompt;
pub mod song;
pub mod wire;

pub use client::GeminiClient;
pub use parse::{ParsedReply, SongCandidate};
pub use song::{MatchStrength, SongRecord, SourceLink};

use crate::audio::AudioClip;

/// Failures reaching the recognition service or reading its envelope
///
/// A reply that arrives but contains no usable song is not an error; it is
/// `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("No API key configured (set GEMINI_API_KEY)")]
    MissingApiKey,

    #[error("Connection failed: {0}")]
    Transport(String),

    #[error("Request timeout after {0} seconds")]
    Timeout(u64),

    #[error("Service error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Malformed service response: {0}")]
    InvalidResponse(String),
}

/// Anything that can turn a clip into a song
#[async_trait::async_trait]
pub trait Recognizer: Send + Sync {
    /// `Ok(None)` when no song could be identified
    async fn identify(&self, clip: &AudioClip) -> Result<Option<SongRecord>, RecognitionError>;
}
