//! Terminal rendering for the `listen` and `identify` commands.

use crate::recognition::{MatchStrength, SongRecord};

const BAR_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Collapse frequency bins into `width` columns of block characters
///
/// Only the lower part of the spectrum is drawn, like the browser analyser
/// bars which run off the right edge of the canvas.
pub fn render_bars(bins: &[u8], width: usize) -> String {
    if bins.is_empty() || width == 0 {
        return String::new();
    }

    let visible = (bins.len() * 2 / 5).max(1);
    let per_column = (visible as f32 / width as f32).max(1.0);

    (0..width)
        .map(|col| {
            let start = (col as f32 * per_column) as usize;
            if start >= bins.len() {
                return ' ';
            }
            let end = (((col + 1) as f32 * per_column) as usize).clamp(start + 1, bins.len());
            let peak = bins[start..end].iter().copied().max().unwrap_or(0);
            let level = peak as usize * BAR_LEVELS.len() / 256;
            if peak == 0 {
                ' '
            } else {
                BAR_LEVELS[level.min(BAR_LEVELS.len() - 1)]
            }
        })
        .collect()
}

/// Multi-line result card
pub fn render_song(song: &SongRecord) -> String {
    let mut out = String::new();

    let badge = match song.match_strength() {
        MatchStrength::High => "strong",
        MatchStrength::Moderate => "possible",
    };
    out.push_str(&format!("  {} ({} match)\n\n", song.confidence_label(), badge));
    out.push_str(&format!("  {}\n", song.title));
    out.push_str(&format!("  {}\n", song.artist));
    if !song.genre.is_empty() {
        out.push_str(&format!("  {}\n", song.genre.to_uppercase()));
    }

    if !song.fun_fact.is_empty() {
        out.push_str(&format!("\n  \"{}\"\n", song.fun_fact));
    }

    out.push_str(&format!("\n  Play on Spotify: {}\n", song.spotify_search_url()));

    let sources = song.verified_sources();
    if !sources.is_empty() {
        out.push_str("\n  Verified sources:\n");
        for source in sources {
            out.push_str(&format!("    {} - {}\n", source.host, source.url));
        }
    }

    out
}

pub fn render_error(message: Option<&str>) -> String {
    format!("  Oops! {}\n", message.unwrap_or("Something went wrong."))
}
