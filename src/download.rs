use std::path::PathBuf;
use std::process::Stdio;
use std::sync::OnceLock;

use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

use crate::error::{AppError, AppResult};
use crate::probe::is_restricted_output;
use crate::tools::{hidden_command, Toolchain};

/// Everything needed to invoke one yt-dlp download.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub output_dir: PathBuf,
    pub filename_template: String,
    pub format_selector: String,
    pub cookies: Option<PathBuf>,
}

impl DownloadRequest {
    pub fn output_template(&self) -> String {
        self.output_dir.join(&self.filename_template).to_string_lossy().into_owned()
    }
}

/// One parsed `[download]` progress line.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub percent: f64,
    pub speed: String,
    pub eta: String,
}

/// Parse a yt-dlp progress line like
/// `[download]  50.0% of ~100MiB at 5.00MiB/s ETA 00:10`.
pub fn parse_progress(line: &str) -> Option<ProgressUpdate> {
    static RE_PERCENT: OnceLock<Regex> = OnceLock::new();
    static RE_SPEED: OnceLock<Regex> = OnceLock::new();
    static RE_ETA: OnceLock<Regex> = OnceLock::new();

    if !line.contains("[download]") || !line.contains('%') {
        return None;
    }

    let re_percent = RE_PERCENT.get_or_init(|| Regex::new(r"(\d+\.?\d*)%").unwrap());
    let re_speed = RE_SPEED.get_or_init(|| Regex::new(r"at\s+(\S+)").unwrap());
    let re_eta = RE_ETA.get_or_init(|| Regex::new(r"ETA\s+(\S+)").unwrap());

    let percent = re_percent
        .captures(line)?
        .get(1)?
        .as_str()
        .parse::<f64>()
        .ok()?;
    let speed = re_speed
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();
    let eta = re_eta
        .captures(line)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .unwrap_or_default();

    Some(ProgressUpdate { percent, speed, eta })
}

/// Capture the output path from a `Destination: <path>` line.
pub fn parse_destination(line: &str) -> Option<PathBuf> {
    let trimmed = line.trim();
    let rest = trimmed
        .strip_prefix("[download] Destination:")
        .or_else(|| trimmed.strip_prefix("Destination:"))?;
    let rest = rest.trim();
    if rest.is_empty() {
        None
    } else {
        Some(PathBuf::from(rest))
    }
}

fn build_args(tools: &Toolchain, req: &DownloadRequest) -> Vec<String> {
    let mut args = vec![
        "--no-warnings".to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--ffmpeg-location".to_string(),
        tools.ffmpeg.to_string_lossy().into_owned(),
    ];
    if let Some(cookies) = &req.cookies {
        args.push("--cookies".to_string());
        args.push(cookies.to_string_lossy().into_owned());
    }
    args.push("-o".to_string());
    args.push(req.output_template());
    args.push("-f".to_string());
    args.push(req.format_selector.clone());
    args.push(req.url.clone());
    args
}

async fn wait_for_cancel(mut rx: watch::Receiver<bool>) {
    if *rx.borrow() {
        return;
    }
    while rx.changed().await.is_ok() {
        if *rx.borrow() {
            return;
        }
    }
    // Sender gone without cancelling; never resolve.
    std::future::pending::<()>().await;
}

/// Drive one yt-dlp subprocess to completion.
///
/// Progress updates go out on `progress_tx` as lines arrive. Cancellation
/// via `cancel_rx` kills the child and resolves `Err(Cancelled)`. Returns
/// the captured destination path, if yt-dlp reported one.
pub async fn run_download(
    tools: &Toolchain,
    req: &DownloadRequest,
    progress_tx: mpsc::Sender<ProgressUpdate>,
    cancel_rx: watch::Receiver<bool>,
) -> AppResult<Option<PathBuf>> {
    let ytdlp = tools.require_ytdlp()?;
    let args = build_args(tools, req);
    log::debug!("spawning yt-dlp for {}", req.url);

    let mut child = hidden_command(ytdlp)
        .args(&args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| AppError::Download(format!("failed to spawn yt-dlp: {e}")))?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Download("yt-dlp stdout unavailable".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Download("yt-dlp stderr unavailable".to_string()))?;

    // Reader task: progress, destination capture, restricted-content
    // detection. Resolves to Err early when restricted content is seen so
    // the child can be put down without waiting for its exit.
    let mut reader = tokio::spawn(async move {
        let mut destination: Option<PathBuf> = None;
        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if is_restricted_output(&line) {
                return Err(AppError::Restricted(
                    "this video requires sign-in (age-restricted or members-only)".to_string(),
                ));
            }
            if let Some(dest) = parse_destination(&line) {
                destination = Some(dest);
            }
            if let Some(update) = parse_progress(&line) {
                let _ = progress_tx.send(update).await;
            }
        }
        Ok(destination)
    });

    // Collect stderr separately for the failure message.
    let stderr_task = tokio::spawn(async move {
        let mut collected = String::new();
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if !collected.is_empty() {
                collected.push('\n');
            }
            collected.push_str(&line);
        }
        collected
    });

    let mut reader_result: Option<Option<PathBuf>> = None;
    let status = loop {
        tokio::select! {
            status = child.wait() => break status,
            res = &mut reader, if reader_result.is_none() => {
                match res {
                    Ok(Ok(dest)) => reader_result = Some(dest),
                    Ok(Err(restricted)) => {
                        // Restricted marker seen mid-stream; put the child
                        // down instead of letting it run to completion.
                        let _ = child.kill().await;
                        let _ = child.wait().await;
                        return Err(restricted);
                    }
                    Err(_) => reader_result = Some(None),
                }
            }
            _ = wait_for_cancel(cancel_rx.clone()) => {
                let _ = child.kill().await;
                let _ = child.wait().await;
                reader.abort();
                stderr_task.abort();
                return Err(AppError::Cancelled);
            }
        }
    };

    let destination = match reader_result {
        Some(dest) => dest,
        None => match reader.await {
            Ok(Ok(dest)) => dest,
            Ok(Err(restricted)) => return Err(restricted),
            Err(_) => None,
        },
    };
    let stderr_text = stderr_task.await.unwrap_or_default();

    match status {
        Ok(status) if status.success() => Ok(destination),
        Ok(status) => {
            if is_restricted_output(&stderr_text) {
                return Err(AppError::Restricted(
                    "this video requires sign-in (age-restricted or members-only)".to_string(),
                ));
            }
            let detail = stderr_text.lines().last().unwrap_or_default();
            Err(AppError::Download(format!("yt-dlp exited with {status}: {detail}")))
        }
        Err(e) => Err(AppError::Download(format!("yt-dlp process error: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_progress_line() {
        let update =
            parse_progress("[download]  50.0% of ~100.00MiB at 5.00MiB/s ETA 00:10").unwrap();
        assert_eq!(update.percent, 50.0);
        assert_eq!(update.speed, "5.00MiB/s");
        assert_eq!(update.eta, "00:10");
    }

    #[test]
    fn parses_progress_without_speed_or_eta() {
        let update = parse_progress("[download] 100% of 3.50MiB").unwrap();
        assert_eq!(update.percent, 100.0);
        assert!(update.speed.is_empty());
        assert!(update.eta.is_empty());
    }

    #[test]
    fn ignores_non_progress_lines() {
        assert!(parse_progress("[youtube] dQw4w9WgXcQ: Downloading webpage").is_none());
        assert!(parse_progress("Destination: /tmp/video.mp4").is_none());
        assert!(parse_progress("").is_none());
    }

    #[test]
    fn captures_destination_path() {
        assert_eq!(
            parse_destination("[download] Destination: /tmp/My Video.mp4"),
            Some(PathBuf::from("/tmp/My Video.mp4"))
        );
        assert_eq!(
            parse_destination("Destination: C:\\media\\clip.webm"),
            Some(PathBuf::from("C:\\media\\clip.webm"))
        );
        assert_eq!(parse_destination("[download] 42.0%"), None);
    }

    #[test]
    fn builds_expected_argument_order() {
        let tools = Toolchain {
            ytdlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            ffplay: PathBuf::from("ffplay"),
        };
        let req = DownloadRequest {
            url: "https://youtu.be/abc12345678".to_string(),
            output_dir: PathBuf::from("/out"),
            filename_template: "%(title)s.%(ext)s".to_string(),
            format_selector: "best".to_string(),
            cookies: None,
        };
        let args = build_args(&tools, &req);
        assert_eq!(args[0], "--no-warnings");
        assert!(args.contains(&"--newline".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
        assert_eq!(args.last().unwrap(), "https://youtu.be/abc12345678");
        let f_pos = args.iter().position(|a| a == "-f").unwrap();
        assert_eq!(args[f_pos + 1], "best");
    }

    #[test]
    fn cookies_are_passed_when_configured() {
        let tools = Toolchain {
            ytdlp: PathBuf::from("yt-dlp"),
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            ffplay: PathBuf::from("ffplay"),
        };
        let req = DownloadRequest {
            url: "https://youtu.be/abc12345678".to_string(),
            output_dir: PathBuf::from("/out"),
            filename_template: "%(title)s.%(ext)s".to_string(),
            format_selector: "best".to_string(),
            cookies: Some(PathBuf::from("/tmp/cookies.txt")),
        };
        let args = build_args(&tools, &req);
        let pos = args.iter().position(|a| a == "--cookies").unwrap();
        assert_eq!(args[pos + 1], "/tmp/cookies.txt");
    }
}
