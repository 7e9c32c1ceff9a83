use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Target container formats the downloader offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Mp4,
    Mkv,
    Webm,
    M4a,
}

impl MediaFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaFormat::Mp4 => "mp4",
            MediaFormat::Mkv => "mkv",
            MediaFormat::Webm => "webm",
            MediaFormat::M4a => "m4a",
        }
    }

    pub fn is_audio_only(&self) -> bool {
        matches!(self, MediaFormat::M4a)
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mp4" => Ok(MediaFormat::Mp4),
            "mkv" => Ok(MediaFormat::Mkv),
            "webm" => Ok(MediaFormat::Webm),
            "m4a" => Ok(MediaFormat::M4a),
            other => Err(format!("unknown format: {other}")),
        }
    }
}

/// Upper bound on video height for batch and playlist downloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ResolutionCap {
    #[default]
    #[serde(rename = "best")]
    Best,
    #[serde(rename = "2160p")]
    P2160,
    #[serde(rename = "1440p")]
    P1440,
    #[serde(rename = "1080p")]
    P1080,
    #[serde(rename = "720p")]
    P720,
}

impl ResolutionCap {
    pub fn height(&self) -> Option<u32> {
        match self {
            ResolutionCap::Best => None,
            ResolutionCap::P2160 => Some(2160),
            ResolutionCap::P1440 => Some(1440),
            ResolutionCap::P1080 => Some(1080),
            ResolutionCap::P720 => Some(720),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ResolutionCap::Best => "Best Available",
            ResolutionCap::P2160 => "2160p",
            ResolutionCap::P1440 => "1440p",
            ResolutionCap::P1080 => "1080p",
            ResolutionCap::P720 => "720p",
        }
    }
}

impl fmt::Display for ResolutionCap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for ResolutionCap {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "best" | "best available" => Ok(ResolutionCap::Best),
            "2160p" | "2160" | "4k" => Ok(ResolutionCap::P2160),
            "1440p" | "1440" => Ok(ResolutionCap::P1440),
            "1080p" | "1080" => Ok(ResolutionCap::P1080),
            "720p" | "720" => Ok(ResolutionCap::P720),
            other => Err(format!("unknown resolution: {other}")),
        }
    }
}

/// yt-dlp format selector for a single-video download.
pub fn single_selector(format: MediaFormat) -> String {
    match format {
        MediaFormat::Mp4 => "bestvideo[ext=mp4][height<=?1080]+bestaudio[ext=m4a]/best".to_string(),
        MediaFormat::M4a => "bestaudio[ext=m4a]/bestaudio".to_string(),
        MediaFormat::Webm => "bestvideo[ext=webm]+bestaudio[ext=webm]/best".to_string(),
        MediaFormat::Mkv => "bestvideo[ext=mkv]+bestaudio/best".to_string(),
    }
}

/// yt-dlp format selector for batch and playlist downloads, capped at the
/// requested resolution when one is set.
pub fn batch_selector(format: MediaFormat, cap: ResolutionCap) -> String {
    match cap.height() {
        Some(height) => {
            if format == MediaFormat::Mp4 {
                format!(
                    "bestvideo[height<={height}][ext=mp4]+bestaudio[ext=m4a]/best[height<={height}]"
                )
            } else {
                format!("bestvideo[height<={height}]+bestaudio/best[height<={height}]")
            }
        }
        None => {
            if format == MediaFormat::Mp4 {
                "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best".to_string()
            } else {
                "bestvideo+bestaudio/best".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_selectors_per_format() {
        assert_eq!(
            single_selector(MediaFormat::Mp4),
            "bestvideo[ext=mp4][height<=?1080]+bestaudio[ext=m4a]/best"
        );
        assert_eq!(single_selector(MediaFormat::M4a), "bestaudio[ext=m4a]/bestaudio");
        assert_eq!(
            single_selector(MediaFormat::Webm),
            "bestvideo[ext=webm]+bestaudio[ext=webm]/best"
        );
        assert_eq!(single_selector(MediaFormat::Mkv), "bestvideo[ext=mkv]+bestaudio/best");
    }

    #[test]
    fn batch_selector_applies_height_cap() {
        assert_eq!(
            batch_selector(MediaFormat::Mp4, ResolutionCap::P1080),
            "bestvideo[height<=1080][ext=mp4]+bestaudio[ext=m4a]/best[height<=1080]"
        );
        assert_eq!(
            batch_selector(MediaFormat::Mkv, ResolutionCap::P720),
            "bestvideo[height<=720]+bestaudio/best[height<=720]"
        );
    }

    #[test]
    fn batch_selector_without_cap() {
        assert_eq!(
            batch_selector(MediaFormat::Mp4, ResolutionCap::Best),
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best"
        );
        assert_eq!(
            batch_selector(MediaFormat::Webm, ResolutionCap::Best),
            "bestvideo+bestaudio/best"
        );
    }

    #[test]
    fn parses_from_user_input() {
        assert_eq!("mp4".parse::<MediaFormat>().unwrap(), MediaFormat::Mp4);
        assert_eq!("Best Available".parse::<ResolutionCap>().unwrap(), ResolutionCap::Best);
        assert_eq!("1080p".parse::<ResolutionCap>().unwrap(), ResolutionCap::P1080);
        assert!("avi".parse::<MediaFormat>().is_err());
    }
}
