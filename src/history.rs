use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::format::{MediaFormat, ResolutionCap};
use crate::store::JsonStore;

/// How a download was initiated; recorded for display alongside the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DownloadMode {
    Single,
    Batch,
    Playlist,
}

impl std::fmt::Display for DownloadMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadMode::Single => f.write_str("Single"),
            DownloadMode::Batch => f.write_str("Batch"),
            DownloadMode::Playlist => f.write_str("Playlist"),
        }
    }
}

/// One completed download, newest first in `history.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub uploader: String,
    #[serde(default)]
    pub duration: String,
    pub resolution: ResolutionCap,
    pub format: MediaFormat,
    pub download_mode: DownloadMode,
    pub download_path: String,
    #[serde(default)]
    pub thumbnail_embedded: bool,
    #[serde(default)]
    pub redownloaded: bool,
    pub date: String,
}

impl HistoryEntry {
    pub fn timestamp_now() -> String {
        Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

/// Download history backed by the locked JSON store. Every mutation is a
/// read-modify-write under one lock acquisition, so concurrent workers
/// finishing at the same time cannot lose each other's entries.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    store: JsonStore,
}

impl HistoryStore {
    pub fn new(store: JsonStore) -> Self {
        Self { store }
    }

    pub fn load(&self) -> AppResult<Vec<HistoryEntry>> {
        Ok(self.store.load::<Vec<HistoryEntry>>()?.unwrap_or_default())
    }

    /// Prepend an entry so the newest download is listed first.
    pub fn append(&self, entry: HistoryEntry) -> AppResult<()> {
        self.store.update(Vec::new, |entries: &mut Vec<HistoryEntry>| {
            entries.insert(0, entry);
        })?;
        Ok(())
    }

    pub fn remove(&self, index: usize) -> AppResult<HistoryEntry> {
        let mut removed = None;
        self.store.update(Vec::new, |entries: &mut Vec<HistoryEntry>| {
            if index < entries.len() {
                removed = Some(entries.remove(index));
            }
        })?;
        removed.ok_or_else(|| AppError::NotFound(format!("history entry {index}")))
    }

    pub fn get(&self, index: usize) -> AppResult<HistoryEntry> {
        self.load()?
            .into_iter()
            .nth(index)
            .ok_or_else(|| AppError::NotFound(format!("history entry {index}")))
    }

    pub fn clear(&self) -> AppResult<()> {
        self.store.save(&Vec::<HistoryEntry>::new())
    }
}
