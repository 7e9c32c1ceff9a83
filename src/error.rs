use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("yt-dlp error: {0}")]
    YtDlp(String),

    #[error("FFmpeg error: {0}")]
    FFmpeg(String),

    #[error("Download error: {0}")]
    Download(String),

    #[error("restricted content: {0}")]
    Restricted(String),

    #[error("download cancelled")]
    Cancelled,

    #[error("store error: {0}")]
    Store(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("missing tool: {0}")]
    MissingTool(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl AppError {
    /// True for failures the user must resolve by signing in (age-restricted
    /// or members-only videos). These are surfaced differently from plain
    /// download failures.
    pub fn is_restricted(&self) -> bool {
        matches!(self, AppError::Restricted(_))
    }
}

pub type AppResult<T> = Result<T, AppError>;
