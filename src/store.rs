use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{AppError, AppResult};

const LOCK_RETRIES: u32 = 10;
const LOCK_BACKOFF_START: Duration = Duration::from_millis(10);
const LOCK_BACKOFF_MAX: Duration = Duration::from_millis(200);

/// JSON document on disk with advisory-lock-guarded atomic rewrites.
///
/// Writers take an exclusive lock on a sidecar `.lock` file, serialize into
/// a temporary sibling, and `rename` it over the target so readers never
/// observe a half-written document.
#[derive(Debug, Clone)]
pub struct JsonStore {
    path: PathBuf,
    lock_path: PathBuf,
}

impl JsonStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut lock_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "store".to_string());
        lock_name.push_str(".lock");
        let lock_path = path.with_file_name(lock_name);
        Self { path, lock_path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Acquire the exclusive advisory lock, retrying with backoff on
    /// contention and falling back to a blocking acquire on the last try.
    fn acquire_lock(&self) -> AppResult<File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;

        let contended_code = fs2::lock_contended_error().raw_os_error();
        let mut backoff = LOCK_BACKOFF_START;
        for attempt in 0..LOCK_RETRIES {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(err) if err.raw_os_error() == contended_code => {
                    log::debug!(
                        "store lock contended (attempt {}/{}), backing off {:?}",
                        attempt + 1,
                        LOCK_RETRIES,
                        backoff
                    );
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(LOCK_BACKOFF_MAX);
                }
                Err(err) => return Err(err.into()),
            }
        }
        // Still contended after backoff: block until the holder releases.
        lock_file
            .lock_exclusive()
            .map_err(|e| AppError::Store(format!("failed to lock {}: {e}", self.lock_path.display())))?;
        Ok(lock_file)
    }

    /// Read and deserialize the document. A missing file is `None`.
    pub fn load<T: DeserializeOwned>(&self) -> AppResult<Option<T>> {
        let lock = self.acquire_lock()?;
        let result = match fs::read(&self.path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(AppError::from),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        };
        let _ = fs2::FileExt::unlock(&lock);
        result
    }

    /// Serialize and atomically replace the document.
    pub fn save<T: Serialize>(&self, value: &T) -> AppResult<()> {
        let lock = self.acquire_lock()?;
        let result = self.write_locked(value);
        let _ = fs2::FileExt::unlock(&lock);
        result
    }

    /// Read-modify-write under a single lock acquisition.
    pub fn update<T, F>(&self, default: impl FnOnce() -> T, mutate: F) -> AppResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&mut T),
    {
        let lock = self.acquire_lock()?;
        let result = (|| {
            let mut value: T = match fs::read(&self.path) {
                Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_else(|_| default()),
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => default(),
                Err(err) => return Err(err.into()),
            };
            mutate(&mut value);
            self.write_locked(&value)?;
            Ok(value)
        })();
        let _ = fs2::FileExt::unlock(&lock);
        result
    }

    fn write_locked<T: Serialize>(&self, value: &T) -> AppResult<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(value)?;
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&bytes)?;
            tmp.sync_all()?;
        }
        if let Err(err) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(err.into());
        }
        Ok(())
    }
}
