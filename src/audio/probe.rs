//! Identify the container/codec of an audio file so it can be sent as-is.
//!
//! Uses symphonia for format detection (MP3, M4A, OGG, FLAC, WAV, AIFF).

use anyhow::{anyhow, Context, Result};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;
use symphonia::core::codecs::{
    CodecType, CODEC_TYPE_AAC, CODEC_TYPE_ALAC, CODEC_TYPE_FLAC, CODEC_TYPE_MP3, CODEC_TYPE_NULL,
    CODEC_TYPE_OPUS, CODEC_TYPE_PCM_F32LE, CODEC_TYPE_PCM_S16BE, CODEC_TYPE_PCM_S16LE,
    CODEC_TYPE_PCM_S24BE, CODEC_TYPE_PCM_S24LE, CODEC_TYPE_PCM_S32LE, CODEC_TYPE_PCM_U8,
    CODEC_TYPE_VORBIS,
};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::info;

use super::clip::AudioClip;

/// Maximum file size accepted for inline upload (20 MB request limit)
const MAX_FILE_SIZE: u64 = 20 * 1024 * 1024;

const MIME_TYPES: &[(CodecType, &str)] = &[
    (CODEC_TYPE_MP3, "audio/mpeg"),
    (CODEC_TYPE_FLAC, "audio/flac"),
    (CODEC_TYPE_VORBIS, "audio/ogg"),
    (CODEC_TYPE_OPUS, "audio/ogg"),
    (CODEC_TYPE_AAC, "audio/aac"),
    (CODEC_TYPE_ALAC, "audio/mp4"),
    (CODEC_TYPE_PCM_U8, "audio/wav"),
    (CODEC_TYPE_PCM_S16LE, "audio/wav"),
    (CODEC_TYPE_PCM_S24LE, "audio/wav"),
    (CODEC_TYPE_PCM_S32LE, "audio/wav"),
    (CODEC_TYPE_PCM_F32LE, "audio/wav"),
    (CODEC_TYPE_PCM_S16BE, "audio/aiff"),
    (CODEC_TYPE_PCM_S24BE, "audio/aiff"),
];

/// Load an audio file and wrap it as a clip with the detected MIME type
pub fn probe_file(path: &Path) -> Result<AudioClip> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Cannot read {}", path.display()))?;
    if metadata.len() > MAX_FILE_SIZE {
        return Err(anyhow!(
            "{} is too large ({:.1} MB, limit {} MB)",
            path.display(),
            metadata.len() as f64 / (1024.0 * 1024.0),
            MAX_FILE_SIZE / (1024 * 1024)
        ));
    }

    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let clip = probe_bytes(bytes, extension)?;

    info!(
        "Probed {}: {}, {:.1}s, {} bytes",
        path.display(),
        clip.mime_type(),
        clip.duration().as_secs_f64(),
        clip.len()
    );

    Ok(clip)
}

/// Detect the format of in-memory audio
pub fn probe_bytes(bytes: Vec<u8>, extension: Option<&str>) -> Result<AudioClip> {
    let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.clone())), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = extension {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| anyhow!("Unsupported audio format: {}", e))?;

    let track = probed
        .format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| anyhow!("No supported audio track found"))?;

    let params = &track.codec_params;
    let mut mime_type = MIME_TYPES
        .iter()
        .find(|(codec, _)| *codec == params.codec)
        .map(|(_, mime)| *mime)
        .ok_or_else(|| anyhow!("Unsupported audio codec"))?;

    // AAC inside an MP4 container rather than a raw ADTS stream
    if mime_type == "audio/aac" && matches!(extension, Some("m4a") | Some("mp4")) {
        mime_type = "audio/mp4";
    }

    let duration = match (params.n_frames, params.sample_rate) {
        (Some(frames), Some(rate)) if rate > 0 => {
            Duration::from_secs_f64(frames as f64 / rate as f64)
        }
        _ => Duration::ZERO,
    };

    Ok(AudioClip::from_encoded(bytes, mime_type, duration))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_wav() {
        let frames = vec![crate::audio::AudioFrame {
            samples: vec![0; 16000],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        }];
        let wav = AudioClip::from_frames(&frames).unwrap();

        let clip = probe_bytes(wav.bytes().to_vec(), Some("wav")).unwrap();
        assert_eq!(clip.mime_type(), "audio/wav");
        assert!((clip.duration().as_secs_f64() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn rejects_garbage() {
        assert!(probe_bytes(b"definitely not audio".to_vec(), None).is_err());
    }
}
