pub mod download;
pub mod error;
pub mod events;
pub mod format;
pub mod history;
pub mod paths;
pub mod pool;
pub mod postprocess;
pub mod probe;
pub mod settings;
pub mod store;
pub mod tools;
pub mod urls;

pub use error::{AppError, AppResult};
pub use events::{EventBus, EventDrain, JobId, UiEvent};
pub use format::{MediaFormat, ResolutionCap};
pub use history::{DownloadMode, HistoryEntry, HistoryStore};
pub use paths::AppPaths;
pub use pool::{DownloadPool, JobOptions, JobRequest};
pub use settings::AppSettings;
pub use store::JsonStore;
pub use tools::Toolchain;
