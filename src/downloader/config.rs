use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::error::{DownloadError, Result};

/// 下载管理器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// 同时运行的下载数上限（工作池大小）
    pub max_concurrent: usize,
    /// 每次读取的固定缓冲区大小
    pub chunk_size: usize,
    pub connect_timeout_secs: u64,
    /// 单次读取的空闲超时
    pub read_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 3,
            chunk_size: 4096,
            connect_timeout_secs: 5,
            read_timeout_secs: 10,
            user_agent: concat!("dlcore/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl DownloadConfig {
    pub fn with_max_concurrent(max_concurrent: usize) -> Self {
        Self {
            max_concurrent,
            ..Self::default()
        }
    }

    /// 从 JSON 文件加载，缺失字段使用默认值
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| DownloadError::io(path, e))?;
        serde_json::from_str(&raw)
            .map_err(|e| DownloadError::Config(format!("{}: {}", path.display(), e)))
    }

    /// 把不合法的取值收敛到可用范围
    pub fn normalized(mut self) -> Self {
        self.max_concurrent = self.max_concurrent.max(1);
        self.chunk_size = self.chunk_size.max(1);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }
}
