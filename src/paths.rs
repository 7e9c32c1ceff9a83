use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppResult;

/// Portable on-disk layout rooted next to the executable (or an explicit
/// data directory): bundled tools under `Assets/`, scratch files under
/// `temp/`, and the two JSON stores at the root.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base: PathBuf,
    pub assets: PathBuf,
    pub temp: PathBuf,
    pub settings_file: PathBuf,
    pub history_file: PathBuf,
}

impl AppPaths {
    pub fn resolve(base_override: Option<PathBuf>) -> Self {
        let base = base_override
            .or_else(|| {
                std::env::current_exe()
                    .ok()
                    .and_then(|exe| exe.parent().map(Path::to_path_buf))
            })
            .unwrap_or_else(|| PathBuf::from("."));
        Self::rooted_at(base)
    }

    pub fn rooted_at(base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        Self {
            assets: base.join("Assets"),
            temp: base.join("temp"),
            settings_file: base.join("settings.json"),
            history_file: base.join("history.json"),
            base,
        }
    }

    /// Create the writable directories. The assets directory is only read,
    /// so a missing one is reported later as missing tools rather than
    /// created here.
    pub fn ensure(&self) -> AppResult<()> {
        fs::create_dir_all(&self.base)?;
        fs::create_dir_all(&self.temp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn layout_is_rooted_at_base() {
        let paths = AppPaths::rooted_at("/data/clipster");
        assert_eq!(paths.assets, PathBuf::from("/data/clipster/Assets"));
        assert_eq!(paths.settings_file, PathBuf::from("/data/clipster/settings.json"));
        assert_eq!(paths.history_file, PathBuf::from("/data/clipster/history.json"));
        assert_eq!(paths.temp, PathBuf::from("/data/clipster/temp"));
    }

    #[test]
    fn ensure_creates_writable_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = AppPaths::rooted_at(dir.path().join("app"));
        paths.ensure().unwrap();
        assert!(paths.base.is_dir());
        assert!(paths.temp.is_dir());
        assert!(!paths.assets.exists());
    }
}
