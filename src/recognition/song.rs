use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Confidence above which a match is shown as strong
const HIGH_CONFIDENCE: f64 = 80.0;

/// Hosts worth showing as verified sources
const TRUSTED_SOURCES: &[&str] = &["spotify", "youtube", "genius", "wikipedia"];

const MAX_VERIFIED_SOURCES: usize = 3;

const SPOTIFY_SEARCH: &str = "https://open.spotify.com/search";

/// A successful identification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SongRecord {
    pub artist: String,
    pub title: String,
    pub genre: String,
    pub fun_fact: String,
    /// Always finite and within 0..=100
    pub confidence: f64,
    /// Unique, in the order the search grounding returned them
    pub source_links: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStrength {
    High,
    Moderate,
}

/// A source link prepared for display
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceLink {
    pub url: String,
    pub host: String,
}

impl SongRecord {
    pub fn match_strength(&self) -> MatchStrength {
        if self.confidence > HIGH_CONFIDENCE {
            MatchStrength::High
        } else {
            MatchStrength::Moderate
        }
    }

    /// Confidence rounded for display, e.g. "92% MATCH"
    pub fn confidence_label(&self) -> String {
        format!("{}% MATCH", self.confidence.round() as i64)
    }

    /// Spotify search page for this track
    pub fn spotify_search_url(&self) -> String {
        let query = format!("{} {}", self.title, self.artist);
        match url::Url::parse(SPOTIFY_SEARCH) {
            Ok(mut url) => {
                if let Ok(mut segments) = url.path_segments_mut() {
                    segments.push(&query);
                }
                url.to_string()
            }
            Err(_) => SPOTIFY_SEARCH.to_string(),
        }
    }

    /// Up to three links from well-known music sites, with display hostnames
    pub fn verified_sources(&self) -> Vec<SourceLink> {
        self.source_links
            .iter()
            .filter(|link| TRUSTED_SOURCES.iter().any(|s| link.contains(s)))
            .take(MAX_VERIFIED_SOURCES)
            .map(|link| {
                let host = url::Url::parse(link)
                    .ok()
                    .and_then(|u| u.host_str().map(|h| h.replacen("www.", "", 1)))
                    .unwrap_or_else(|| "Link".to_string());
                SourceLink {
                    url: link.clone(),
                    host,
                }
            })
            .collect()
    }
}

/// Keep the first occurrence of each link, preserving order
pub fn dedupe_links<I>(links: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut seen = HashSet::new();
    links
        .into_iter()
        .filter(|link| seen.insert(link.clone()))
        .collect()
}
