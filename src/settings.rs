use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::format::{MediaFormat, ResolutionCap};
use crate::store::JsonStore;

fn default_format() -> MediaFormat {
    MediaFormat::Mp4
}

fn default_embed_thumbnail() -> bool {
    true
}

fn default_max_concurrent() -> usize {
    2
}

fn default_download_dir() -> PathBuf {
    dirs::download_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
        .unwrap_or_else(|| PathBuf::from("downloads"))
        .join("Clipster")
}

/// User-facing knobs, persisted as `settings.json`. Unknown keys in the
/// file are ignored and missing keys fall back to defaults, so older
/// settings files keep loading across upgrades.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_format")]
    pub default_format: MediaFormat,
    #[serde(default)]
    pub max_resolution: ResolutionCap,
    #[serde(default = "default_embed_thumbnail")]
    pub embed_thumbnail: bool,
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default)]
    pub cookies_path: Option<PathBuf>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            default_format: default_format(),
            max_resolution: ResolutionCap::Best,
            embed_thumbnail: default_embed_thumbnail(),
            download_dir: default_download_dir(),
            cookies_path: None,
            max_concurrent_downloads: default_max_concurrent(),
        }
    }
}

impl AppSettings {
    /// Load settings; a missing or corrupt file yields defaults.
    pub fn load(store: &JsonStore) -> Self {
        match store.load::<AppSettings>() {
            Ok(Some(settings)) => settings,
            Ok(None) => AppSettings::default(),
            Err(err) => {
                log::warn!("failed to load settings, using defaults: {err}");
                AppSettings::default()
            }
        }
    }

    pub fn save(&self, store: &JsonStore) -> AppResult<()> {
        store.save(self)
    }

    /// Worker pool width; zero in a stored file is lifted to one.
    pub fn pool_size(&self) -> usize {
        self.max_concurrent_downloads.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let s = AppSettings::default();
        assert_eq!(s.default_format, MediaFormat::Mp4);
        assert_eq!(s.max_resolution, ResolutionCap::Best);
        assert!(s.embed_thumbnail);
        assert_eq!(s.max_concurrent_downloads, 2);
        assert!(s.cookies_path.is_none());
    }

    #[test]
    fn partial_settings_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, br#"{ "default_format": "m4a", "unknown_key": 7 }"#).unwrap();
        let store = JsonStore::new(&path);
        let s = AppSettings::load(&store);
        assert_eq!(s.default_format, MediaFormat::M4a);
        assert!(s.embed_thumbnail);
        assert_eq!(s.max_concurrent_downloads, 2);
    }

    #[test]
    fn corrupt_settings_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, b"{{{{").unwrap();
        let store = JsonStore::new(&path);
        let s = AppSettings::load(&store);
        assert_eq!(s.default_format, MediaFormat::Mp4);
    }

    #[test]
    fn pool_size_never_zero() {
        let mut s = AppSettings::default();
        s.max_concurrent_downloads = 0;
        assert_eq!(s.pool_size(), 1);
    }

    #[test]
    fn roundtrips_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("settings.json"));
        let mut s = AppSettings::default();
        s.default_format = MediaFormat::Webm;
        s.max_concurrent_downloads = 4;
        s.save(&store).unwrap();
        let loaded = AppSettings::load(&store);
        assert_eq!(loaded.default_format, MediaFormat::Webm);
        assert_eq!(loaded.max_concurrent_downloads, 4);
    }
}
