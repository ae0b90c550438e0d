use base64::Engine;
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use super::backend::AudioFrame;

/// Finalized, encoded audio ready to be sent for recognition
///
/// The bytes are shared, so cloning a clip never copies the audio.
#[derive(Debug, Clone)]
pub struct AudioClip {
    bytes: Arc<[u8]>,
    mime_type: String,
    duration: Duration,
}

impl AudioClip {
    /// Encode captured frames as an in-memory 16-bit PCM WAV file
    ///
    /// The format is taken from the first frame; an empty capture yields a
    /// valid header-only WAV at 16kHz mono.
    pub fn from_frames(frames: &[AudioFrame]) -> Result<Self, hound::Error> {
        let (sample_rate, channels) = frames
            .first()
            .map(|f| (f.sample_rate, f.channels))
            .unwrap_or((16000, 1));

        let spec = hound::WavSpec {
            channels,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut buf = Vec::new();
        let mut sample_count = 0usize;
        {
            let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)?;
            for frame in frames
                .iter()
                .filter(|f| f.sample_rate == sample_rate && f.channels == channels)
            {
                for &sample in &frame.samples {
                    writer.write_sample(sample)?;
                }
                sample_count += frame.samples.len();
            }
            writer.finalize()?;
        }

        let duration = Duration::from_secs_f64(
            sample_count as f64 / (sample_rate as f64 * channels as f64),
        );

        Ok(Self {
            bytes: buf.into(),
            mime_type: "audio/wav".to_string(),
            duration,
        })
    }

    /// Wrap audio that is already encoded (e.g. an uploaded MP3)
    pub fn from_encoded(bytes: Vec<u8>, mime_type: impl Into<String>, duration: Duration) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            duration,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Transport-safe encoding for inline request payloads
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.bytes)
    }

    /// True when both clips are views of the same finalized buffer
    pub fn same_buffer(&self, other: &AudioClip) -> bool {
        Arc::ptr_eq(&self.bytes, &other.bytes)
    }
}
