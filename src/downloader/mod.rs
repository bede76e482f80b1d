pub mod config;
pub mod error;
pub mod ledger;
pub mod manager;
pub mod models;
pub mod pause_gate;
pub mod task;

pub use config::DownloadConfig;
pub use error::{DownloadError, Result};
pub use ledger::ProgressLedger;
pub use manager::DownloadManager;
pub use models::{DownloadId, DownloadState, DownloadStatus};
pub use pause_gate::{Checkpoint, PauseGate};
pub use task::DownloadTask;
