use std::collections::HashMap;

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::debug;

use crate::downloader::models::{DownloadId, DownloadStatus};

const BAR_TEMPLATE: &str =
    "{spinner:.green} {prefix} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg}";
const SPINNER_TEMPLATE: &str = "{spinner:.green} {prefix} [{elapsed_precise}] {bytes} {msg}";

/// 多任务进度显示，只负责渲染管理器给出的快照
pub struct ProgressBoard {
    multi_pb: MultiProgress,
    bars: HashMap<DownloadId, ProgressBar>,
}

impl Default for ProgressBoard {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressBoard {
    pub fn new() -> Self {
        Self {
            multi_pb: MultiProgress::new(),
            bars: HashMap::new(),
        }
    }

    pub fn hidden() -> Self {
        Self {
            multi_pb: MultiProgress::with_draw_target(indicatif::ProgressDrawTarget::hidden()),
            bars: HashMap::new(),
        }
    }

    pub fn track(&mut self, id: DownloadId, label: impl Into<String>) {
        let pb = self.multi_pb.add(ProgressBar::new_spinner());
        pb.set_style(style(SPINNER_TEMPLATE));
        pb.set_prefix(format!("{} {}", id, label.into()));
        self.bars.insert(id, pb);
    }

    pub fn update(&self, id: DownloadId, status: &DownloadStatus) {
        let Some(pb) = self.bars.get(&id) else {
            return;
        };
        if pb.is_finished() {
            return;
        }

        // 总大小未知时保持不确定状态，不做估算
        match status.total_bytes {
            Some(total) if total > 0 && pb.length() != Some(total) => {
                pb.set_style(style(BAR_TEMPLATE).progress_chars("#>-"));
                pb.set_length(total);
            }
            _ => {}
        }
        pb.set_position(status.downloaded_bytes);

        if status.is_terminal() {
            pb.finish_with_message(status.state.to_string());
        } else {
            pb.set_message(status.state.to_string());
            pb.tick();
        }
    }

    pub fn clear(&self) {
        if let Err(e) = self.multi_pb.clear() {
            debug!("清除进度条失败: {}", e);
        }
    }
}

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template).unwrap_or_else(|_| ProgressStyle::default_bar())
}
