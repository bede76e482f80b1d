use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use super::models::DownloadId;

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("任务未找到: {0}")]
    NotFound(DownloadId),

    #[error("任务仍在进行中: {0}")]
    StillActive(DownloadId),

    #[error("下载管理器正在关闭，不再接受新任务")]
    ShuttingDown,

    #[error("无效的URL: {0}")]
    InvalidUrl(String),

    #[error("HTTP 请求失败，状态码: {status}，URL: {url}")]
    HttpStatus {
        status: reqwest::StatusCode,
        url: String,
    },

    #[error("HTTP错误: {0}")]
    Http(#[from] reqwest::Error),

    #[error("写入文件失败: {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("读取数据流失败: {0}")]
    Stream(#[from] std::io::Error),

    #[error("读取超时 ({0:?})")]
    ReadTimeout(Duration),

    #[error("配置错误: {0}")]
    Config(String),
}

impl DownloadError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DownloadError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, DownloadError>;
