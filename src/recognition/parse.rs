//! Turning the model's free-text reply into a song candidate.
//!
//! Two attempts are made: the raw text, then the text with markdown code
//! fences stripped. Anything that still fails is `Unparseable`, which the
//! client reports as "no result" rather than as an error.

use serde::{Deserialize, Deserializer};
use tracing::{debug, warn};

/// Decoded reply before grounding links are attached
#[derive(Debug, Clone, PartialEq)]
pub struct SongCandidate {
    pub artist: String,
    pub title: String,
    pub genre: String,
    pub fun_fact: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Song(SongCandidate),
    Unparseable,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSong {
    #[serde(default)]
    artist: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    fun_fact: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    confidence: Option<f64>,
}

/// Accept `92`, `92.5` or `"92"` for confidence
fn number_or_string<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

/// Parse a reply: raw text first, then with code fences removed
pub fn parse_reply(text: &str) -> ParsedReply {
    if let Some(song) = extract_json_object(text).and_then(decode_song) {
        return ParsedReply::Song(song);
    }

    let cleaned = strip_code_fences(text);
    if let Some(song) = extract_json_object(&cleaned).and_then(decode_song) {
        debug!("Reply parsed after stripping code fences");
        return ParsedReply::Song(song);
    }

    if cleaned.trim() == "null" {
        debug!("Model reported no music in the clip");
    } else {
        warn!("Could not parse a song from the model reply ({} chars)", text.len());
    }
    ParsedReply::Unparseable
}

/// First balanced `{...}` span, ignoring braces inside string literals
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

/// Remove markdown code fence markers (```json and ```)
pub fn strip_code_fences(text: &str) -> String {
    text.replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Strict decode of one JSON object into a validated candidate
pub fn decode_song(json: &str) -> Option<SongCandidate> {
    let raw: RawSong = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(e) => {
            debug!("Reply JSON did not decode: {}", e);
            return None;
        }
    };

    let artist = raw.artist.map(|s| s.trim().to_string()).unwrap_or_default();
    let title = raw.title.map(|s| s.trim().to_string()).unwrap_or_default();
    if artist.is_empty() || title.is_empty() {
        debug!("Reply JSON is missing artist or title");
        return None;
    }

    let confidence = raw.confidence.unwrap_or(0.0);
    if !confidence.is_finite() {
        debug!("Reply confidence is not a finite number");
        return None;
    }

    Some(SongCandidate {
        artist,
        title,
        genre: raw.genre.unwrap_or_default(),
        fun_fact: raw.fun_fact.unwrap_or_default(),
        confidence: confidence.clamp(0.0, 100.0),
    })
}
