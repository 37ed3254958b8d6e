//! File names for generated assets, extracted frames and merged outputs.

use chrono::{DateTime, Utc};

/// Prompt characters kept in an output file name.
pub const PROMPT_SLUG_CHARS: usize = 30;

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Reduce `text` to alphanumerics, `-` and `_`, with spaces turned into
/// underscores. Trailing whitespace is dropped before the replacement.
pub fn sanitize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect::<String>()
        .trim_end()
        .replace(' ', "_")
}

/// `{YYYYmmdd_HHMMSS}_{slug}.mp4` where `slug` comes from the first 30
/// characters of the prompt.
pub fn video_filename(prompt: &str, now: DateTime<Utc>) -> String {
    let head: String = prompt.trim_start().chars().take(PROMPT_SLUG_CHARS).collect();
    let slug = sanitize(&head);
    let slug = if slug.is_empty() { "video".to_string() } else { slug };
    format!("{}_{slug}.mp4", now.format(TIMESTAMP_FORMAT))
}

/// `merged_{YYYYmmdd_HHMMSS}.mp4`.
pub fn merged_filename(now: DateTime<Utc>) -> String {
    format!("merged_{}.mp4", now.format(TIMESTAMP_FORMAT))
}

pub fn last_frame_filename(label: &str) -> String {
    format!("scene_{}_last_frame.jpg", sanitize(label))
}

pub fn frame_at_filename(label: &str, timestamp_secs: f64) -> String {
    format!("frame_{}_{timestamp_secs}s.jpg", sanitize(label))
}

pub fn thumbnail_filename(label: &str) -> String {
    format!("thumb_{}.jpg", sanitize(label))
}
