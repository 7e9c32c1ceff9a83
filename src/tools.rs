use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::error::{AppError, AppResult};

/// Create a Command that hides the console window on Windows
#[cfg(windows)]
pub fn hidden_command(program: impl AsRef<std::ffi::OsStr>) -> Command {
    #[allow(unused_imports)]
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x08000000;

    let mut cmd = Command::new(program);
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

#[cfg(not(windows))]
pub fn hidden_command(program: impl AsRef<std::ffi::OsStr>) -> Command {
    Command::new(program)
}

fn exe_name(base: &str) -> String {
    if cfg!(windows) {
        format!("{base}.exe")
    } else {
        base.to_string()
    }
}

fn resolve(assets_dir: Option<&Path>, base: &str) -> PathBuf {
    let name = exe_name(base);
    if let Some(dir) = assets_dir {
        let bundled = dir.join(&name);
        if bundled.exists() {
            return bundled;
        }
    }
    // Fall back to the bare name so the OS resolves it through PATH.
    PathBuf::from(name)
}

fn found_on_path(name: &str) -> bool {
    let Some(paths) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&paths).any(|dir| dir.join(name).is_file())
}

/// Resolved locations of the external executables the engine drives.
/// Bundled copies under the assets directory win over PATH lookups.
#[derive(Debug, Clone)]
pub struct Toolchain {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub ffplay: PathBuf,
}

impl Toolchain {
    pub fn discover(assets_dir: Option<&Path>) -> Self {
        Self {
            ytdlp: resolve(assets_dir, "yt-dlp"),
            ffmpeg: resolve(assets_dir, "ffmpeg"),
            ffprobe: resolve(assets_dir, "ffprobe"),
            ffplay: resolve(assets_dir, "ffplay"),
        }
    }

    /// Names of tools that resolve neither to a bundled copy nor to PATH.
    pub fn missing(&self) -> Vec<String> {
        [
            ("yt-dlp", &self.ytdlp),
            ("ffmpeg", &self.ffmpeg),
            ("ffprobe", &self.ffprobe),
            ("ffplay", &self.ffplay),
        ]
        .iter()
        .filter(|(_, path)| !tool_available(path))
        .map(|(name, _)| name.to_string())
        .collect()
    }

    pub fn require_ytdlp(&self) -> AppResult<&Path> {
        if tool_available(&self.ytdlp) {
            Ok(&self.ytdlp)
        } else {
            Err(AppError::MissingTool("yt-dlp".to_string()))
        }
    }

    /// Launch a detached ffplay preview of a stream URL.
    pub fn play_preview(&self, url: &str) -> AppResult<()> {
        if !tool_available(&self.ffplay) {
            return Err(AppError::MissingTool("ffplay".to_string()));
        }
        hidden_command(&self.ffplay)
            .args(["-autoexit", "-hide_banner", "-loglevel", "error", url])
            .spawn()
            .map_err(|e| AppError::FFmpeg(format!("failed to launch ffplay: {e}")))?;
        Ok(())
    }
}

fn tool_available(path: &Path) -> bool {
    if path.components().count() > 1 {
        path.is_file()
    } else {
        found_on_path(&path.to_string_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bundled_tool_wins_over_path() {
        let dir = tempfile::tempdir().unwrap();
        let bundled = dir.path().join(exe_name("yt-dlp"));
        std::fs::write(&bundled, b"").unwrap();
        let tools = Toolchain::discover(Some(dir.path()));
        assert_eq!(tools.ytdlp, bundled);
    }

    #[test]
    fn missing_bundle_falls_back_to_bare_name() {
        let dir = tempfile::tempdir().unwrap();
        let tools = Toolchain::discover(Some(dir.path()));
        assert_eq!(tools.ffmpeg, PathBuf::from(exe_name("ffmpeg")));
    }

    #[test]
    fn missing_reports_unresolvable_tools() {
        let dir = tempfile::tempdir().unwrap();
        // Empty assets dir and (almost certainly) no yt-dlp on the test
        // machine's PATH under this name.
        let tools = Toolchain {
            ytdlp: dir.path().join("definitely-not-here"),
            ffmpeg: dir.path().join("also-not-here"),
            ffprobe: dir.path().join("nope"),
            ffplay: dir.path().join("still-no"),
        };
        assert_eq!(tools.missing().len(), 4);
        assert!(tools.require_ytdlp().is_err());
    }
}
