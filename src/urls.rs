use std::sync::OnceLock;

use regex::Regex;
use url::Url;

fn youtube_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(https?://)?(www\.|m\.|music\.)?(youtube\.com|youtu\.be)/.+").unwrap()
    })
}

fn video_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:v=|/vi?/|youtu\.be/|/embed/|/shorts/)([A-Za-z0-9_-]{11})").unwrap())
}

/// Cheap shape check before a URL is handed to yt-dlp.
pub fn is_youtube_url(url: &str) -> bool {
    youtube_re().is_match(url.trim())
}

/// Extract the 11-character video id from the common YouTube URL forms.
pub fn extract_video_id(url: &str) -> Option<String> {
    let trimmed = url.trim();
    if let Ok(parsed) = Url::parse(trimmed) {
        if parsed.host_str().is_some_and(|h| h.contains("youtu.be")) {
            let id = parsed.path().trim_start_matches('/');
            if !id.is_empty() {
                return Some(id.split('/').next().unwrap_or(id).to_string());
            }
        }
        if let Some((_, v)) = parsed.query_pairs().find(|(k, _)| k == "v") {
            if !v.is_empty() {
                return Some(v.into_owned());
            }
        }
    }
    video_id_re()
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Split pasted batch input into accepted URLs and rejected lines.
/// One URL per line; blank lines are skipped.
pub fn parse_batch_input(raw: &str) -> (Vec<String>, Vec<String>) {
    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if is_youtube_url(line) {
            accepted.push(line.to_string());
        } else {
            rejected.push(line.to_string());
        }
    }
    (accepted, rejected)
}
