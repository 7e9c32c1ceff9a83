use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::tools::{hidden_command, Toolchain};

const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(20);

pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(THUMBNAIL_TIMEOUT)
        .build()
        .unwrap_or_default()
}

/// Fetch a thumbnail image to a local file.
pub async fn download_thumbnail(
    client: &reqwest::Client,
    url: &str,
    target: &Path,
) -> AppResult<()> {
    let response = client.get(url).send().await?.error_for_status()?;
    let bytes = response.bytes().await?;
    if let Some(parent) = target.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(target, &bytes)?;
    Ok(())
}

/// Thumbnail for a video id, cached under the temp directory so history
/// views and repeated downloads reuse one fetch.
pub async fn cached_thumbnail(
    client: &reqwest::Client,
    temp_dir: &Path,
    video_id: &str,
) -> AppResult<PathBuf> {
    let target = temp_dir.join(format!("thumb_{video_id}.jpg"));
    if target.exists() {
        return Ok(target);
    }
    let url = format!("https://i.ytimg.com/vi/{video_id}/hqdefault.jpg");
    download_thumbnail(client, &url, &target).await?;
    Ok(target)
}

/// Embed a thumbnail as the video's attached picture with ffmpeg, swapping
/// the result over the original through a backup so the original survives
/// any failure.
pub async fn embed_thumbnail(tools: &Toolchain, video: &Path, thumb: &Path) -> AppResult<()> {
    let mut tmp_name = video
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    tmp_name.push_str(".thumbtmp");
    if let Some(ext) = video.extension() {
        tmp_name.push('.');
        tmp_name.push_str(&ext.to_string_lossy());
    }
    let tmp_out = video.with_file_name(tmp_name);

    let output = hidden_command(&tools.ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(video)
        .arg("-i")
        .arg(thumb)
        .args(["-map", "0", "-map", "1", "-c", "copy", "-disposition:v:1", "attached_pic"])
        .arg(&tmp_out)
        .output()
        .await
        .map_err(|e| AppError::FFmpeg(format!("failed to execute ffmpeg: {e}")))?;

    if !output.status.success() {
        let _ = std::fs::remove_file(&tmp_out);
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AppError::FFmpeg(format!(
            "ffmpeg embed exited with {}: {}",
            output.status,
            stderr.lines().last().unwrap_or_default()
        )));
    }

    let backup = video.with_extension(match video.extension() {
        Some(ext) => format!("{}.bak", ext.to_string_lossy()),
        None => "bak".to_string(),
    });
    std::fs::rename(video, &backup)?;
    if let Err(err) = std::fs::rename(&tmp_out, video) {
        // Put the original back before reporting.
        let _ = std::fs::rename(&backup, video);
        let _ = std::fs::remove_file(&tmp_out);
        return Err(err.into());
    }
    let _ = std::fs::remove_file(&backup);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_thumbnail_reuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("thumb_abc.jpg");
        std::fs::write(&existing, b"jpeg").unwrap();

        let rt = tokio::runtime::Runtime::new().unwrap();
        let client = http_client();
        let path = rt
            .block_on(cached_thumbnail(&client, dir.path(), "abc"))
            .unwrap();
        assert_eq!(path, existing);
        assert_eq!(std::fs::read(path).unwrap(), b"jpeg");
    }
}
