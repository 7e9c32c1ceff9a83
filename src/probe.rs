use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::error::{AppError, AppResult};
use crate::tools::{hidden_command, Toolchain};

const METADATA_TIMEOUT: Duration = Duration::from_secs(30);

const RESTRICTED_MARKERS: [&str; 4] = [
    "Sign in to confirm your age",
    "members-only",
    "This video is only available for members",
    "This video is private",
];

/// Whether yt-dlp output indicates content that needs authentication
/// (age-restricted, members-only, private).
pub fn is_restricted_output(text: &str) -> bool {
    RESTRICTED_MARKERS.iter().any(|m| text.contains(m))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    pub id: String,
    pub title: String,
    pub uploader: String,
    pub duration: f64,
    pub duration_string: String,
    pub thumbnail: Option<String>,
    /// Distinct video heights offered, highest first.
    pub heights: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub title: String,
    pub url: String,
    pub index: usize,
}

/// Fetch video metadata via `yt-dlp --dump-json`, bounded by a timeout.
pub async fn fetch_video_info(tools: &Toolchain, url: &str) -> AppResult<VideoInfo> {
    let ytdlp = tools.require_ytdlp()?;
    let future = hidden_command(ytdlp)
        .args(["--no-warnings", "--skip-download", "--dump-json", url])
        .output();

    let output = tokio::time::timeout(METADATA_TIMEOUT, future)
        .await
        .map_err(|_| AppError::YtDlp("yt-dlp timed out while fetching metadata".to_string()))?
        .map_err(|e| AppError::YtDlp(format!("failed to execute yt-dlp: {e}")))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let stdout = String::from_utf8_lossy(&output.stdout);
        let detail = if stderr.trim().is_empty() { &stdout } else { &stderr };
        if is_restricted_output(detail) {
            return Err(AppError::Restricted(
                "this video is age-restricted or members-only and requires sign-in".to_string(),
            ));
        }
        return Err(AppError::YtDlp(format!(
            "yt-dlp exited with {}: {}",
            output.status,
            detail.trim()
        )));
    }

    // yt-dlp may print warnings before the JSON document; take the first
    // line that looks like one.
    let stdout = String::from_utf8_lossy(&output.stdout);
    let json_line = stdout
        .lines()
        .find(|l| l.trim_start().starts_with('{'))
        .unwrap_or(stdout.trim());
    let json: serde_json::Value = serde_json::from_str(json_line)
        .map_err(|e| AppError::YtDlp(format!("failed to parse yt-dlp JSON: {e}")))?;

    let mut heights: Vec<u32> = json["formats"]
        .as_array()
        .unwrap_or(&Vec::new())
        .iter()
        .filter_map(|f| f["height"].as_u64().map(|h| h as u32))
        .collect();
    heights.sort_unstable_by(|a, b| b.cmp(a));
    heights.dedup();

    Ok(VideoInfo {
        id: json["id"].as_str().unwrap_or_default().to_string(),
        title: json["title"].as_str().unwrap_or("Unknown").to_string(),
        uploader: json["uploader"].as_str().unwrap_or_default().to_string(),
        duration: json["duration"].as_f64().unwrap_or(0.0),
        duration_string: json["duration_string"].as_str().unwrap_or_default().to_string(),
        thumbnail: json["thumbnail"].as_str().map(String::from),
        heights,
    })
}

/// Fetch playlist entries via `yt-dlp --flat-playlist --dump-json`,
/// streaming one JSON document per line so entries can be delivered to the
/// caller as they arrive.
pub async fn fetch_playlist(
    tools: &Toolchain,
    url: &str,
    mut on_entry: impl FnMut(PlaylistEntry),
) -> AppResult<usize> {
    let ytdlp = tools.require_ytdlp()?;
    let mut child = hidden_command(ytdlp)
        .args(["--no-warnings", "--flat-playlist", "--dump-json", url])
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::null())
        .spawn()
        .map_err(|e| AppError::YtDlp(format!("failed to spawn yt-dlp: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::YtDlp("yt-dlp stdout unavailable".to_string()))?;
    let mut lines = BufReader::new(stdout).lines();
    let mut count = 0usize;
    while let Ok(Some(line)) = lines.next_line().await {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let Ok(data) = serde_json::from_str::<serde_json::Value>(line) else {
            continue;
        };
        let Some(id) = data["id"].as_str().filter(|s| !s.is_empty()) else {
            continue;
        };
        count += 1;
        on_entry(PlaylistEntry {
            id: id.to_string(),
            title: data["title"].as_str().unwrap_or("<no title>").to_string(),
            url: format!("https://youtube.com/watch?v={id}"),
            index: count,
        });
    }

    let status = child
        .wait()
        .await
        .map_err(|e| AppError::YtDlp(format!("yt-dlp process error: {e}")))?;
    if !status.success() && count == 0 {
        return Err(AppError::YtDlp(format!("yt-dlp exited with {status}")));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restricted_markers_are_detected() {
        assert!(is_restricted_output(
            "ERROR: Sign in to confirm your age. This video may be inappropriate."
        ));
        assert!(is_restricted_output("ERROR: Join this channel to get access to members-only content"));
        assert!(is_restricted_output("This video is private"));
        assert!(!is_restricted_output("[download] 100% of 3.5MiB"));
    }
}
