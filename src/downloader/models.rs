use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 下载任务的唯一标识，单调递增且永不复用
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DownloadId(pub u64);

impl fmt::Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// --------------------------------------------------------------------
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DownloadState {
    #[default]
    Queued,
    Downloading,
    Paused,
    Completed,
    Cancelled,
    Failed,
}

impl DownloadState {
    /// 终止状态：一旦进入就不再有任何转换
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Cancelled | DownloadState::Failed
        )
    }
}

impl fmt::Display for DownloadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DownloadState::Queued => "queued",
            DownloadState::Downloading => "downloading",
            DownloadState::Paused => "paused",
            DownloadState::Completed => "completed",
            DownloadState::Cancelled => "cancelled",
            DownloadState::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// 某一时刻的下载进度快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadStatus {
    pub source: String,
    pub destination: PathBuf,
    pub state: DownloadState,
    pub downloaded_bytes: u64,
    /// `None` 表示来源未声明大小
    pub total_bytes: Option<u64>,
    pub error_message: Option<String>,
    pub queued_at: DateTime<Utc>,
    /// 只有拿到工作槽位之后才会设置
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl DownloadStatus {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            destination: destination.into(),
            state: DownloadState::Queued,
            downloaded_bytes: 0,
            total_bytes: None,
            error_message: None,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    /// 下载百分比，总大小未知或为 0 时返回 `None`，结果不超过 100
    pub fn progress_percent(&self) -> Option<u8> {
        match self.total_bytes {
            Some(total) if total > 0 => {
                let percent = (self.downloaded_bytes as u128 * 100) / total as u128;
                Some(percent.min(100) as u8)
            }
            _ => None,
        }
    }
}
