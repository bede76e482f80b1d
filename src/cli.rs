use clap::Parser;
use std::path::PathBuf;

use dlcore::DownloadConfig;

/// 并发文件下载器
#[derive(Parser, Debug)]
#[command(name = "dlm")]
#[command(version)]
#[command(author = "rpeng252@gmail.com")]
#[command(about = "并发下载多个文件，支持暂停、恢复与取消", long_about = None)]
pub struct Cli {
    /// 要下载的文件链接
    #[arg(value_name = "URL", required = true)]
    #[arg(value_hint = clap::ValueHint::Url)]
    pub urls: Vec<String>,

    /// 文件保存目录
    #[arg(long, value_name = "DIR")]
    #[arg(default_value = ".")]
    #[arg(value_hint = clap::ValueHint::DirPath)]
    pub output_dir: PathBuf,

    /// JSON 配置文件，命令行参数优先
    #[arg(long, value_name = "FILE")]
    #[arg(value_hint = clap::ValueHint::FilePath)]
    pub config: Option<PathBuf>,

    #[arg(long, value_name = "并发数")]
    pub concurrency: Option<usize>,

    #[arg(long, value_name = "缓冲区字节数")]
    pub chunk_size: Option<usize>,

    #[arg(long, value_name = "连接超时秒数")]
    pub connect_timeout: Option<u64>,

    #[arg(long, value_name = "读取超时秒数")]
    pub read_timeout: Option<u64>,

    /// 输出调试日志
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    /// 默认值 < 配置文件 < 命令行参数
    pub fn download_config(&self) -> anyhow::Result<DownloadConfig> {
        let mut config = match &self.config {
            Some(path) => DownloadConfig::from_json_file(path)?,
            None => DownloadConfig::default(),
        };

        if let Some(concurrency) = self.concurrency {
            config.max_concurrent = concurrency;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(secs) = self.connect_timeout {
            config.connect_timeout_secs = secs;
        }
        if let Some(secs) = self.read_timeout {
            config.read_timeout_secs = secs;
        }

        Ok(config.normalized())
    }
}

/// 从链接推断保存的文件名
pub fn file_name_for(url: &str, index: usize) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| format!("download-{}", index + 1))
}
