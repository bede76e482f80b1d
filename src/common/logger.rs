use colored::*;

use crate::downloader::models::{DownloadId, DownloadState, DownloadStatus};

/// 漂亮的控制台输出工具
pub struct PrettyLogger;

impl PrettyLogger {
    /// 显示成功消息
    pub fn success(message: impl AsRef<str>) {
        println!("{} {}", "✓".green().bold(), message.as_ref());
    }

    /// 显示信息消息
    pub fn info(message: impl AsRef<str>) {
        println!("{} {}", "ℹ".blue().bold(), message.as_ref());
    }

    /// 显示警告消息
    pub fn warning(message: impl AsRef<str>) {
        println!("{} {}", "⚠".yellow().bold(), message.as_ref());
    }

    /// 显示错误消息
    pub fn error(message: impl AsRef<str>) {
        println!("{} {}", "✗".red().bold(), message.as_ref());
    }

    /// 显示分割线
    pub fn separator() {
        println!("{}", "─".repeat(50).bright_black());
    }

    /// 单个下载的最终结果
    pub fn download_result(id: DownloadId, status: &DownloadStatus) {
        let target = status.destination.display();
        match status.state {
            DownloadState::Completed => Self::success(format!(
                "{} {} ({} 字节)",
                id, target, status.downloaded_bytes
            )),
            DownloadState::Cancelled => Self::warning(format!(
                "{} {} 已取消，保留 {} 字节",
                id, target, status.downloaded_bytes
            )),
            DownloadState::Failed => {
                let reason = status
                    .error_message
                    .as_deref()
                    .and_then(|msg| msg.lines().next())
                    .unwrap_or("未知错误");
                Self::error(format!("{} {} 失败: {}", id, target, reason))
            }
            state => Self::info(format!("{} {} {}", id, target, state)),
        }
    }

    /// 显示完成总结
    pub fn completion_summary(results: &[(DownloadId, DownloadStatus)]) {
        Self::separator();
        for (id, status) in results {
            Self::download_result(*id, status);
        }

        let completed = results
            .iter()
            .filter(|(_, s)| s.state == DownloadState::Completed)
            .count();
        let line = format!("完成 {}/{}", completed, results.len());
        if completed == results.len() {
            println!("\n{}", line.green().bold());
        } else {
            println!("\n{}", line.yellow().bold());
        }
    }
}

/// 便捷宏用于漂亮的日志输出
#[macro_export]
macro_rules! log_success {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::success(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::info(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::warning(format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::common::logger::PrettyLogger::error(format!($($arg)*))
    };
}
