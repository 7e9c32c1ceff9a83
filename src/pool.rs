use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::download::{self, DownloadRequest, ProgressUpdate};
use crate::error::{AppError, AppResult};
use crate::events::{BatchId, EventBus, JobId, UiEvent};
use crate::format::{batch_selector, single_selector, MediaFormat, ResolutionCap};
use crate::history::{DownloadMode, HistoryEntry, HistoryStore};
use crate::postprocess;
use crate::probe;
use crate::settings::AppSettings;
use crate::tools::Toolchain;
use crate::urls;

const FILENAME_TEMPLATE: &str = "%(title)s.%(ext)s";
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Per-job knobs, normally derived from settings and overridden by the
/// front-end per invocation.
#[derive(Debug, Clone)]
pub struct JobOptions {
    pub format: MediaFormat,
    pub resolution: ResolutionCap,
    pub embed_thumbnail: bool,
    pub mode: DownloadMode,
    pub mark_redownloaded: bool,
}

impl JobOptions {
    pub fn from_settings(settings: &AppSettings, mode: DownloadMode) -> Self {
        Self {
            format: settings.default_format,
            resolution: settings.max_resolution,
            embed_thumbnail: settings.embed_thumbnail,
            mode,
            mark_redownloaded: false,
        }
    }

    fn selector(&self) -> String {
        match self.mode {
            DownloadMode::Single => single_selector(self.format),
            DownloadMode::Batch | DownloadMode::Playlist => {
                batch_selector(self.format, self.resolution)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct JobRequest {
    pub url: String,
    pub options: JobOptions,
    /// Defaults to the configured download directory.
    pub output_dir: Option<PathBuf>,
}

struct BatchState {
    id: BatchId,
    total: usize,
    completed: AtomicUsize,
}

struct PoolShared {
    tools: Toolchain,
    settings: AppSettings,
    history: HistoryStore,
    bus: EventBus,
    semaphore: Semaphore,
    active: Mutex<HashMap<JobId, watch::Sender<bool>>>,
    accepting: AtomicBool,
    http: reqwest::Client,
    temp_dir: PathBuf,
}

/// Bounded worker pool driving yt-dlp subprocesses.
///
/// One job per user-initiated download; concurrency is capped by a
/// semaphore sized from settings. Workers report through the event bus and
/// append to history only when a job finishes successfully, so cancelled
/// and failed jobs leave no record.
pub struct DownloadPool {
    shared: Arc<PoolShared>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl DownloadPool {
    pub fn new(
        tools: Toolchain,
        settings: AppSettings,
        history: HistoryStore,
        bus: EventBus,
        temp_dir: PathBuf,
    ) -> Self {
        let pool_size = settings.pool_size();
        Self {
            shared: Arc::new(PoolShared {
                tools,
                settings,
                history,
                bus,
                semaphore: Semaphore::new(pool_size),
                active: Mutex::new(HashMap::new()),
                accepting: AtomicBool::new(true),
                http: postprocess::http_client(),
                temp_dir,
            }),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Queue one download. Emits `JobQueued` immediately; the job starts
    /// once a worker slot frees up.
    pub async fn submit(&self, request: JobRequest) -> AppResult<JobId> {
        self.submit_inner(request, None).await
    }

    /// Queue a batch of downloads sharing one aggregate progress counter.
    /// Invalid URLs are skipped with a notice rather than failing the
    /// whole batch.
    pub async fn submit_batch(
        &self,
        urls: Vec<String>,
        options: JobOptions,
    ) -> AppResult<(BatchId, Vec<JobId>)> {
        let (valid, rejected): (Vec<_>, Vec<_>) =
            urls.into_iter().partition(|u| urls::is_youtube_url(u));
        for url in &rejected {
            self.shared
                .bus
                .emit(UiEvent::Notice { text: format!("skipping unrecognized URL: {url}") })
                .await;
        }
        if valid.is_empty() {
            return Err(AppError::InvalidUrl("no downloadable URLs in batch".to_string()));
        }

        let batch = Arc::new(BatchState {
            id: uuid::Uuid::new_v4().to_string(),
            total: valid.len(),
            completed: AtomicUsize::new(0),
        });
        let mut job_ids = Vec::with_capacity(valid.len());
        for url in valid {
            let request = JobRequest { url, options: options.clone(), output_dir: None };
            job_ids.push(self.submit_with_batch(request, batch.clone()).await?);
        }
        Ok((batch.id.clone(), job_ids))
    }

    /// Queue a download reproducing a history entry; the new entry is
    /// marked as a re-download.
    pub async fn submit_redownload(&self, entry: &HistoryEntry) -> AppResult<JobId> {
        let options = JobOptions {
            format: entry.format,
            resolution: entry.resolution,
            embed_thumbnail: self.shared.settings.embed_thumbnail,
            mode: entry.download_mode,
            mark_redownloaded: true,
        };
        let request = JobRequest {
            url: entry.url.clone(),
            options,
            output_dir: Some(PathBuf::from(&entry.download_path)),
        };
        self.submit(request).await
    }

    async fn submit_with_batch(
        &self,
        request: JobRequest,
        batch: Arc<BatchState>,
    ) -> AppResult<JobId> {
        self.submit_inner(request, Some(batch)).await
    }

    async fn submit_inner(
        &self,
        request: JobRequest,
        batch: Option<Arc<BatchState>>,
    ) -> AppResult<JobId> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(AppError::Download("engine is shutting down".to_string()));
        }
        if !urls::is_youtube_url(&request.url) {
            return Err(AppError::InvalidUrl(request.url.clone()));
        }

        let id = uuid::Uuid::new_v4().to_string();
        let (cancel_tx, cancel_rx) = watch::channel(false);
        self.shared.active.lock().await.insert(id.clone(), cancel_tx);
        self.shared
            .bus
            .emit(UiEvent::JobQueued { id: id.clone(), url: request.url.clone() })
            .await;

        let shared = self.shared.clone();
        let job_id = id.clone();
        let handle = tokio::spawn(async move {
            run_job(shared, job_id, request, cancel_rx, batch).await;
        });
        self.tasks.lock().await.push(handle);
        Ok(id)
    }

    /// Signal one job to stop. Queued jobs resolve cancelled before ever
    /// spawning a subprocess; running jobs have their child killed.
    pub async fn cancel(&self, id: &str) -> bool {
        let active = self.shared.active.lock().await;
        match active.get(id) {
            Some(tx) => tx.send(true).is_ok(),
            None => false,
        }
    }

    pub async fn cancel_all(&self) {
        let active = self.shared.active.lock().await;
        for (id, tx) in active.iter() {
            log::info!("cancelling job {id}");
            let _ = tx.send(true);
        }
    }

    /// Jobs that have not yet reached a terminal state.
    pub async fn active_count(&self) -> usize {
        self.shared.active.lock().await.len()
    }

    /// Stop accepting work, cancel everything in flight, and wait for the
    /// workers to wind down. After this returns no child process spawned
    /// by the pool is still running.
    pub async fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.cancel_all().await;
        let mut tasks = self.tasks.lock().await;
        for mut task in tasks.drain(..) {
            if tokio::time::timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                log::warn!("worker did not stop within grace period, aborting");
                task.abort();
            }
        }
    }
}

async fn run_job(
    shared: Arc<PoolShared>,
    id: JobId,
    request: JobRequest,
    cancel_rx: watch::Receiver<bool>,
    batch: Option<Arc<BatchState>>,
) {
    let url = request.url.clone();
    let outcome = execute_job(&shared, &id, request, cancel_rx).await;
    shared.active.lock().await.remove(&id);

    match outcome {
        Ok(output) => {
            log::info!("job {id} finished: {url}");
            shared.bus.emit(UiEvent::JobFinished { id: id.clone(), output }).await;
        }
        Err(AppError::Cancelled) => {
            log::info!("job {id} cancelled: {url}");
            shared.bus.emit(UiEvent::JobCancelled { id: id.clone() }).await;
        }
        Err(err) => {
            log::warn!("job {id} failed: {err}");
            shared
                .bus
                .emit(UiEvent::JobFailed {
                    id: id.clone(),
                    error: err.to_string(),
                    restricted: err.is_restricted(),
                })
                .await;
        }
    }

    if let Some(batch) = batch {
        let completed = batch.completed.fetch_add(1, Ordering::SeqCst) + 1;
        shared
            .bus
            .emit(UiEvent::BatchProgress {
                batch: batch.id.clone(),
                completed,
                total: batch.total,
            })
            .await;
        if completed == batch.total {
            shared
                .bus
                .emit(UiEvent::BatchFinished {
                    batch: batch.id.clone(),
                    completed,
                    total: batch.total,
                })
                .await;
        }
    }
}

async fn execute_job(
    shared: &Arc<PoolShared>,
    id: &JobId,
    request: JobRequest,
    cancel_rx: watch::Receiver<bool>,
) -> AppResult<Option<PathBuf>> {
    let _permit = shared
        .semaphore
        .acquire()
        .await
        .map_err(|_| AppError::Cancelled)?;
    if *cancel_rx.borrow() {
        return Err(AppError::Cancelled);
    }

    let output_dir = request
        .output_dir
        .clone()
        .unwrap_or_else(|| shared.settings.download_dir.clone());
    std::fs::create_dir_all(&output_dir)?;

    shared
        .bus
        .emit(UiEvent::JobStarted { id: id.clone(), url: request.url.clone() })
        .await;

    let dl_request = DownloadRequest {
        url: request.url.clone(),
        output_dir: output_dir.clone(),
        filename_template: FILENAME_TEMPLATE.to_string(),
        format_selector: request.options.selector(),
        cookies: shared.settings.cookies_path.clone(),
    };

    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressUpdate>(32);
    let bus = shared.bus.clone();
    let progress_id = id.clone();
    let forwarder = tokio::spawn(async move {
        while let Some(update) = progress_rx.recv().await {
            bus.emit(UiEvent::JobProgress {
                id: progress_id.clone(),
                percent: update.percent,
                speed: update.speed,
                eta: update.eta,
            })
            .await;
        }
    });

    let result = download::run_download(&shared.tools, &dl_request, progress_tx, cancel_rx).await;
    let _ = forwarder.await;
    let output = result?;

    // Metadata for the history record; the download already happened, so
    // failures here only degrade the entry.
    let meta = probe::fetch_video_info(&shared.tools, &request.url).await.ok();

    let mut embedded = false;
    if request.options.embed_thumbnail && !request.options.format.is_audio_only() {
        if let (Some(video), Some(video_id)) = (&output, urls::extract_video_id(&request.url)) {
            embedded = embed_thumbnail_step(shared, video, &video_id).await;
            if !embedded {
                shared
                    .bus
                    .emit(UiEvent::Notice {
                        text: format!("thumbnail embed skipped for {}", video.display()),
                    })
                    .await;
            }
        }
    }

    let title = output
        .as_ref()
        .and_then(|p| p.file_stem())
        .map(|s| s.to_string_lossy().into_owned())
        .or_else(|| meta.as_ref().map(|m| m.title.clone()))
        .unwrap_or_else(|| request.url.clone());
    let entry = HistoryEntry {
        title,
        url: request.url.clone(),
        uploader: meta.as_ref().map(|m| m.uploader.clone()).unwrap_or_default(),
        duration: meta.as_ref().map(|m| m.duration_string.clone()).unwrap_or_default(),
        resolution: request.options.resolution,
        format: request.options.format,
        download_mode: request.options.mode,
        download_path: output
            .as_ref()
            .and_then(|p| p.parent())
            .unwrap_or(&output_dir)
            .to_string_lossy()
            .into_owned(),
        thumbnail_embedded: embedded,
        redownloaded: request.options.mark_redownloaded,
        date: HistoryEntry::timestamp_now(),
    };
    if let Err(err) = shared.history.append(entry) {
        log::error!("failed to record history entry: {err}");
        shared
            .bus
            .emit(UiEvent::Notice { text: format!("history not updated: {err}") })
            .await;
    }

    Ok(output)
}

async fn embed_thumbnail_step(
    shared: &Arc<PoolShared>,
    video: &std::path::Path,
    video_id: &str,
) -> bool {
    let thumb = match postprocess::cached_thumbnail(&shared.http, &shared.temp_dir, video_id).await
    {
        Ok(thumb) => thumb,
        Err(err) => {
            log::warn!("thumbnail fetch failed for {video_id}: {err}");
            return false;
        }
    };
    match postprocess::embed_thumbnail(&shared.tools, video, &thumb).await {
        Ok(()) => true,
        Err(err) => {
            log::warn!("thumbnail embed failed for {}: {err}", video.display());
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn options_derive_from_settings() {
        let mut settings = AppSettings::default();
        settings.default_format = MediaFormat::Webm;
        settings.max_resolution = ResolutionCap::P720;
        settings.embed_thumbnail = false;
        let options = JobOptions::from_settings(&settings, DownloadMode::Batch);
        assert_eq!(options.format, MediaFormat::Webm);
        assert_eq!(options.resolution, ResolutionCap::P720);
        assert!(!options.embed_thumbnail);
        assert!(!options.mark_redownloaded);
    }

    #[test]
    fn selector_depends_on_mode() {
        let mut options = JobOptions::from_settings(&AppSettings::default(), DownloadMode::Single);
        assert_eq!(options.selector(), single_selector(MediaFormat::Mp4));
        options.mode = DownloadMode::Playlist;
        options.resolution = ResolutionCap::P1080;
        assert_eq!(options.selector(), batch_selector(MediaFormat::Mp4, ResolutionCap::P1080));
    }
}
