use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};

use clipster::error::{AppError, AppResult};
use clipster::events::{EventDrain, UiEvent};
use clipster::format::{MediaFormat, ResolutionCap};
use clipster::history::{DownloadMode, HistoryStore};
use clipster::paths::AppPaths;
use clipster::pool::{DownloadPool, JobOptions, JobRequest};
use clipster::probe;
use clipster::settings::AppSettings;
use clipster::store::JsonStore;
use clipster::tools::Toolchain;
use clipster::urls;

/// UI pump cadence; queued events are drained and rendered on this tick.
const TICK: Duration = Duration::from_millis(100);

#[derive(Parser, Debug)]
#[command(author, version, about = "Fetch. Download. Enjoy.")]
struct Cli {
    /// Data directory holding Assets/, settings.json and history.json
    /// (defaults to the executable's directory)
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Verify the bundled yt-dlp/FFmpeg executables are present
    Check,
    /// Download one or more video URLs
    Download {
        urls: Vec<String>,
        #[arg(long)]
        format: Option<MediaFormat>,
        #[arg(long)]
        resolution: Option<ResolutionCap>,
        /// Override the configured download directory
        #[arg(long)]
        output: Option<PathBuf>,
        /// Skip thumbnail embedding for this run
        #[arg(long)]
        no_thumbnail: bool,
    },
    /// Download every URL listed in a text file (one per line)
    Batch {
        file: PathBuf,
        #[arg(long)]
        format: Option<MediaFormat>,
        #[arg(long)]
        resolution: Option<ResolutionCap>,
        #[arg(long)]
        no_thumbnail: bool,
    },
    /// Fetch a playlist and download selected items
    Playlist {
        url: String,
        /// Items to download, e.g. "1,3,5-8" (default: all)
        #[arg(long)]
        items: Option<String>,
        #[arg(long)]
        format: Option<MediaFormat>,
        #[arg(long)]
        resolution: Option<ResolutionCap>,
        #[arg(long)]
        no_thumbnail: bool,
        /// List the playlist without downloading anything
        #[arg(long)]
        list_only: bool,
    },
    /// Inspect or edit the download history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },
    /// Show or change persisted settings
    Settings {
        #[command(subcommand)]
        action: SettingsAction,
    },
    /// Play a stream preview with ffplay
    Preview { url: String },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    /// Print all recorded downloads, newest first
    List,
    /// Remove one entry by its list index
    Remove { index: usize },
    /// Delete all history entries
    Clear,
    /// Download an entry again with its original options
    Redownload { index: usize },
    /// Open an entry's download folder
    Open { index: usize },
}

#[derive(Subcommand, Debug)]
enum SettingsAction {
    Show,
    /// Keys: format, resolution, embed-thumbnail, download-dir, cookies,
    /// concurrency
    Set { key: String, value: String },
}

struct App {
    paths: AppPaths,
    settings: AppSettings,
    settings_store: JsonStore,
    history: HistoryStore,
    tools: Toolchain,
}

impl App {
    fn bootstrap(data_dir: Option<PathBuf>) -> AppResult<Self> {
        let paths = AppPaths::resolve(data_dir);
        paths.ensure()?;
        let settings_store = JsonStore::new(&paths.settings_file);
        let settings = AppSettings::load(&settings_store);
        let history = HistoryStore::new(JsonStore::new(&paths.history_file));
        let tools = Toolchain::discover(Some(&paths.assets));
        Ok(Self { paths, settings, settings_store, history, tools })
    }

    fn job_options(
        &self,
        mode: DownloadMode,
        format: Option<MediaFormat>,
        resolution: Option<ResolutionCap>,
        no_thumbnail: bool,
    ) -> JobOptions {
        let mut options = JobOptions::from_settings(&self.settings, mode);
        if let Some(format) = format {
            options.format = format;
        }
        if let Some(resolution) = resolution {
            options.resolution = resolution;
        }
        if no_thumbnail {
            options.embed_thumbnail = false;
        }
        options
    }

    fn pool(&self) -> (DownloadPool, EventDrain) {
        let (bus, drain) = clipster::events::channel();
        let pool = DownloadPool::new(
            self.tools.clone(),
            self.settings.clone(),
            self.history.clone(),
            bus,
            self.paths.temp.clone(),
        );
        (pool, drain)
    }
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let cli = Cli::parse();
    if let Err(err) = run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> AppResult<()> {
    let app = App::bootstrap(cli.data_dir)?;
    match cli.command {
        Command::Check => check(&app),
        Command::Download { urls, format, resolution, output, no_thumbnail } => {
            download(&app, urls, format, resolution, output, no_thumbnail).await
        }
        Command::Batch { file, format, resolution, no_thumbnail } => {
            batch(&app, file, format, resolution, no_thumbnail).await
        }
        Command::Playlist { url, items, format, resolution, no_thumbnail, list_only } => {
            playlist(&app, url, items, format, resolution, no_thumbnail, list_only).await
        }
        Command::History { action } => history(&app, action).await,
        Command::Settings { action } => settings(&app, action),
        Command::Preview { url } => app.tools.play_preview(&url),
    }
}

fn check(app: &App) -> AppResult<()> {
    let missing = app.tools.missing();
    if missing.is_empty() {
        println!("all tools found (yt-dlp, ffmpeg, ffprobe, ffplay)");
    } else {
        println!("missing from {} and PATH: {}", app.paths.assets.display(), missing.join(", "));
    }
    Ok(())
}

async fn download(
    app: &App,
    raw_urls: Vec<String>,
    format: Option<MediaFormat>,
    resolution: Option<ResolutionCap>,
    output: Option<PathBuf>,
    no_thumbnail: bool,
) -> AppResult<()> {
    if raw_urls.is_empty() {
        return Err(AppError::InvalidUrl("no URLs given".to_string()));
    }
    let mode = if raw_urls.len() == 1 { DownloadMode::Single } else { DownloadMode::Batch };
    let options = app.job_options(mode, format, resolution, no_thumbnail);
    let (pool, drain) = app.pool();

    let mut submitted = HashSet::new();
    if raw_urls.len() == 1 {
        let id = pool
            .submit(JobRequest {
                url: raw_urls.into_iter().next().unwrap(),
                options,
                output_dir: output,
            })
            .await?;
        submitted.insert(id);
    } else {
        let (_, ids) = pool.submit_batch(raw_urls, options).await?;
        submitted.extend(ids);
    }
    pump_events(&pool, drain, submitted).await;
    Ok(())
}

async fn batch(
    app: &App,
    file: PathBuf,
    format: Option<MediaFormat>,
    resolution: Option<ResolutionCap>,
    no_thumbnail: bool,
) -> AppResult<()> {
    let raw = std::fs::read_to_string(&file)?;
    let (accepted, rejected) = urls::parse_batch_input(&raw);
    for line in &rejected {
        println!("skipping unrecognized line: {line}");
    }
    if accepted.is_empty() {
        return Err(AppError::InvalidUrl(format!("no YouTube URLs in {}", file.display())));
    }
    println!("queueing {} downloads", accepted.len());
    let options = app.job_options(DownloadMode::Batch, format, resolution, no_thumbnail);
    let (pool, drain) = app.pool();
    let (_, ids) = pool.submit_batch(accepted, options).await?;
    pump_events(&pool, drain, ids.into_iter().collect()).await;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn playlist(
    app: &App,
    url: String,
    items: Option<String>,
    format: Option<MediaFormat>,
    resolution: Option<ResolutionCap>,
    no_thumbnail: bool,
    list_only: bool,
) -> AppResult<()> {
    println!("fetching playlist...");
    let mut entries = Vec::new();
    let total = probe::fetch_playlist(&app.tools, &url, |entry| {
        println!("{:>4}. {}", entry.index, entry.title);
        entries.push(entry);
    })
    .await?;
    println!("fetched {total} items");
    if list_only || entries.is_empty() {
        return Ok(());
    }

    let selected: Vec<String> = match items {
        Some(spec) => {
            let indices = parse_item_selection(&spec, entries.len())
                .map_err(AppError::InvalidArgument)?;
            indices
                .into_iter()
                .map(|i| entries[i - 1].url.clone())
                .collect()
        }
        None => entries.iter().map(|e| e.url.clone()).collect(),
    };

    println!("queueing {} of {} items", selected.len(), entries.len());
    let options = app.job_options(DownloadMode::Playlist, format, resolution, no_thumbnail);
    let (pool, drain) = app.pool();
    let (_, ids) = pool.submit_batch(selected, options).await?;
    pump_events(&pool, drain, ids.into_iter().collect()).await;
    Ok(())
}

async fn history(app: &App, action: HistoryAction) -> AppResult<()> {
    match action {
        HistoryAction::List => {
            let entries = app.history.load()?;
            if entries.is_empty() {
                println!("no history yet");
                return Ok(());
            }
            for (i, e) in entries.iter().enumerate() {
                let redl = if e.redownloaded { " (re-download)" } else { "" };
                println!("{i:>4}. {}  [{} | {} | {}]{redl}", e.title, e.download_mode, e.format, e.date);
                println!("      {} -> {}", e.url, e.download_path);
            }
            Ok(())
        }
        HistoryAction::Remove { index } => {
            let removed = app.history.remove(index)?;
            println!("removed: {}", removed.title);
            Ok(())
        }
        HistoryAction::Clear => {
            app.history.clear()?;
            println!("history cleared");
            Ok(())
        }
        HistoryAction::Redownload { index } => {
            let entry = app.history.get(index)?;
            println!("re-downloading: {}", entry.title);
            let (pool, drain) = app.pool();
            let id = pool.submit_redownload(&entry).await?;
            pump_events(&pool, drain, HashSet::from([id])).await;
            Ok(())
        }
        HistoryAction::Open { index } => {
            let entry = app.history.get(index)?;
            open::that(&entry.download_path)?;
            Ok(())
        }
    }
}

fn settings(app: &App, action: SettingsAction) -> AppResult<()> {
    match action {
        SettingsAction::Show => {
            let s = &app.settings;
            println!("format:          {}", s.default_format);
            println!("resolution:      {}", s.max_resolution);
            println!("embed-thumbnail: {}", s.embed_thumbnail);
            println!("download-dir:    {}", s.download_dir.display());
            println!(
                "cookies:         {}",
                s.cookies_path.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "none".to_string())
            );
            println!("concurrency:     {}", s.max_concurrent_downloads);
            Ok(())
        }
        SettingsAction::Set { key, value } => {
            let mut s = app.settings.clone();
            match key.as_str() {
                "format" => s.default_format = value.parse().map_err(AppError::InvalidArgument)?,
                "resolution" => {
                    s.max_resolution = value.parse().map_err(AppError::InvalidArgument)?
                }
                "embed-thumbnail" => {
                    s.embed_thumbnail = value
                        .parse()
                        .map_err(|_| AppError::InvalidArgument(format!("not a bool: {value}")))?
                }
                "download-dir" => s.download_dir = PathBuf::from(&value),
                "cookies" => {
                    s.cookies_path = if value.is_empty() || value == "none" {
                        None
                    } else {
                        Some(PathBuf::from(&value))
                    }
                }
                "concurrency" => {
                    s.max_concurrent_downloads = value
                        .parse()
                        .map_err(|_| AppError::InvalidArgument(format!("not a number: {value}")))?
                }
                other => return Err(AppError::NotFound(format!("unknown setting: {other}"))),
            }
            s.save(&app.settings_store)?;
            println!("saved");
            Ok(())
        }
    }
}

/// Drain and render engine events on a fixed tick until every submitted
/// job reaches a terminal state. Ctrl-C cancels everything in flight and
/// the loop then drains the resulting terminal events.
async fn pump_events(pool: &DownloadPool, mut drain: EventDrain, mut pending: HashSet<String>) {
    let mut tick = tokio::time::interval(TICK);
    let mut interrupted = false;
    let mut finished = 0usize;
    let mut failed = 0usize;
    let mut cancelled = 0usize;

    while !pending.is_empty() {
        tokio::select! {
            _ = tick.tick() => {
                for event in drain.drain() {
                    render_event(&event, &mut pending, &mut finished, &mut failed, &mut cancelled);
                }
            }
            _ = tokio::signal::ctrl_c(), if !interrupted => {
                println!("\ninterrupt received, cancelling downloads...");
                interrupted = true;
                // Keep draining while the workers wind down; the terminal
                // events below empty `pending` and end the loop.
                pool.cancel_all().await;
            }
        }
    }
    if interrupted {
        pool.shutdown().await;
    }
    println!("done: {finished} finished, {failed} failed, {cancelled} cancelled");
}

fn render_event(
    event: &UiEvent,
    pending: &mut HashSet<String>,
    finished: &mut usize,
    failed: &mut usize,
    cancelled: &mut usize,
) {
    match event {
        UiEvent::JobQueued { .. } => {}
        UiEvent::JobStarted { url, .. } => println!("downloading {url}"),
        UiEvent::JobProgress { percent, speed, eta, .. } => {
            let mut line = format!("  {percent:>5.1}%");
            if !speed.is_empty() {
                line.push_str(&format!(" at {speed}"));
            }
            if !eta.is_empty() {
                line.push_str(&format!(" ETA {eta}"));
            }
            print!("\r{line}    ");
            use std::io::Write;
            let _ = std::io::stdout().flush();
        }
        UiEvent::JobFinished { id, output } => {
            pending.remove(id);
            *finished += 1;
            match output {
                Some(path) => println!("\nfinished: {}", path.display()),
                None => println!("\nfinished"),
            }
        }
        UiEvent::JobFailed { id, error, restricted } => {
            pending.remove(id);
            *failed += 1;
            if *restricted {
                println!("\nfailed: {error}");
                println!("tip: point the cookies setting at an exported cookies file to download restricted videos");
            } else {
                println!("\nfailed: {error}");
            }
        }
        UiEvent::JobCancelled { id } => {
            pending.remove(id);
            *cancelled += 1;
            println!("\ncancelled");
        }
        UiEvent::BatchProgress { completed, total, .. } => {
            println!("batch progress: {completed}/{total}");
        }
        UiEvent::BatchFinished { completed, total, .. } => {
            println!("batch finished: {completed}/{total}");
        }
        UiEvent::Notice { text } => println!("{text}"),
    }
}

/// Parse a 1-based selection like "1,3,5-8" against a list length.
fn parse_item_selection(spec: &str, total: usize) -> Result<Vec<usize>, String> {
    let mut indices = Vec::new();
    for part in spec.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let (start, end) = match part.split_once('-') {
            Some((a, b)) => {
                let a = a.trim().parse::<usize>().map_err(|_| format!("bad range: {part}"))?;
                let b = b.trim().parse::<usize>().map_err(|_| format!("bad range: {part}"))?;
                (a, b)
            }
            None => {
                let n = part.parse::<usize>().map_err(|_| format!("bad index: {part}"))?;
                (n, n)
            }
        };
        if start == 0 || end < start || end > total {
            return Err(format!("selection {part} out of range (1-{total})"));
        }
        for i in start..=end {
            if !indices.contains(&i) {
                indices.push(i);
            }
        }
    }
    if indices.is_empty() {
        return Err("empty selection".to_string());
    }
    Ok(indices)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_indices_and_ranges() {
        assert_eq!(parse_item_selection("1,3,5-7", 10).unwrap(), vec![1, 3, 5, 6, 7]);
        assert_eq!(parse_item_selection("2", 2).unwrap(), vec![2]);
    }

    #[test]
    fn deduplicates_overlapping_selection() {
        assert_eq!(parse_item_selection("1-3,2", 5).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn rejects_out_of_range_selection() {
        assert!(parse_item_selection("0", 5).is_err());
        assert!(parse_item_selection("6", 5).is_err());
        assert!(parse_item_selection("3-2", 5).is_err());
        assert!(parse_item_selection("", 5).is_err());
    }
}
