use std::thread;

use clipster::format::{MediaFormat, ResolutionCap};
use clipster::history::{DownloadMode, HistoryEntry, HistoryStore};
use clipster::settings::AppSettings;
use clipster::store::JsonStore;

fn entry(title: &str) -> HistoryEntry {
    HistoryEntry {
        title: title.to_string(),
        url: format!("https://youtu.be/{title}"),
        uploader: "someone".to_string(),
        duration: "3:21".to_string(),
        resolution: ResolutionCap::P1080,
        format: MediaFormat::Mp4,
        download_mode: DownloadMode::Batch,
        download_path: "/tmp/downloads".to_string(),
        thumbnail_embedded: true,
        redownloaded: false,
        date: HistoryEntry::timestamp_now(),
    }
}

#[test]
fn concurrent_history_appends_never_corrupt_the_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    const WRITERS: usize = 8;
    const APPENDS_PER_WRITER: usize = 5;

    let handles: Vec<_> = (0..WRITERS)
        .map(|w| {
            let path = path.clone();
            thread::spawn(move || {
                let history = HistoryStore::new(JsonStore::new(path));
                for i in 0..APPENDS_PER_WRITER {
                    history.append(entry(&format!("w{w}i{i}"))).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // The file parses and every single append survived.
    let history = HistoryStore::new(JsonStore::new(&path));
    let entries = history.load().unwrap();
    assert_eq!(entries.len(), WRITERS * APPENDS_PER_WRITER);

    let raw = std::fs::read(&path).unwrap();
    let parsed: serde_json::Value = serde_json::from_slice(&raw).unwrap();
    assert!(parsed.is_array());
}

#[test]
fn concurrent_settings_saves_leave_a_valid_document() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("settings.json");

    let handles: Vec<_> = (1..=6)
        .map(|n| {
            let path = path.clone();
            thread::spawn(move || {
                let store = JsonStore::new(path);
                let mut settings = AppSettings::default();
                settings.max_concurrent_downloads = n;
                for _ in 0..10 {
                    settings.save(&store).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    // Whichever writer landed last, the document must be complete.
    let store = JsonStore::new(&path);
    let settings = AppSettings::load(&store);
    assert!((1..=6).contains(&settings.max_concurrent_downloads));
}

#[test]
fn reader_during_heavy_writes_sees_complete_documents() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");

    let writer = {
        let path = path.clone();
        thread::spawn(move || {
            let history = HistoryStore::new(JsonStore::new(path));
            for i in 0..30 {
                history.append(entry(&format!("item{i}"))).unwrap();
            }
        })
    };

    let reader = {
        let path = path.clone();
        thread::spawn(move || {
            let history = HistoryStore::new(JsonStore::new(path));
            for _ in 0..30 {
                // Every observed state must deserialize; a torn write
                // would fail here.
                let _ = history.load().unwrap();
            }
        })
    };

    writer.join().unwrap();
    reader.join().unwrap();
}

#[test]
fn history_survives_process_style_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("history.json");
    {
        let history = HistoryStore::new(JsonStore::new(&path));
        history.append(entry("kept")).unwrap();
    }
    let reopened = HistoryStore::new(JsonStore::new(&path));
    let entries = reopened.load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "kept");
    assert_eq!(entries[0].format, MediaFormat::Mp4);
}
