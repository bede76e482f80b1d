use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::watch;

use super::models::{DownloadState, DownloadStatus};
use super::pause_gate::PauseGate;

/// 单个下载的进度账本
///
/// 每次修改都在一次 `send_if_modified` 中完成，读者拿到的总是完整快照。
/// 进入终止状态后所有写入都会被拒绝。
#[derive(Debug)]
pub struct ProgressLedger {
    status: watch::Sender<DownloadStatus>,
}

impl ProgressLedger {
    pub fn new(source: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            status: watch::Sender::new(DownloadStatus::new(source, destination)),
        }
    }

    pub fn snapshot(&self) -> DownloadStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DownloadStatus> {
        self.status.subscribe()
    }

    pub fn state(&self) -> DownloadState {
        self.status.borrow().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// 拿到工作槽位后调用；若在排队时已被暂停则保持 `Paused`
    pub fn begin(&self) -> bool {
        self.update(|status| {
            status.started_at = Some(Utc::now());
            if status.state == DownloadState::Queued {
                status.state = DownloadState::Downloading;
            }
            true
        })
    }

    pub fn set_total_bytes(&self, total: Option<u64>) -> bool {
        self.update(|status| {
            let changed = status.total_bytes != total;
            status.total_bytes = total;
            changed
        })
    }

    /// 只在数据真正写入后调用
    pub fn add_downloaded(&self, written: u64) -> bool {
        self.update(|status| {
            status.downloaded_bytes = status.downloaded_bytes.saturating_add(written);
            written > 0
        })
    }

    /// 在同一次写入中关闭闸门并切换到 `Paused`，并发的暂停/恢复不会让两者错位
    pub fn mark_paused(&self, gate: &PauseGate) -> bool {
        self.update(|status| {
            gate.pause();
            match status.state {
                DownloadState::Queued | DownloadState::Downloading => {
                    status.state = DownloadState::Paused;
                    true
                }
                _ => false,
            }
        })
    }

    /// 恢复时回到暂停前的状态：未开始的任务回到 `Queued`
    pub fn mark_resumed(&self, gate: &PauseGate) -> bool {
        self.update(|status| {
            gate.resume();
            if status.state != DownloadState::Paused {
                return false;
            }
            status.state = if status.started_at.is_some() {
                DownloadState::Downloading
            } else {
                DownloadState::Queued
            };
            true
        })
    }

    /// 尚未拿到工作槽位的任务直接进入 `Cancelled`
    pub fn cancel_if_not_started(&self) -> bool {
        self.update(|status| {
            if status.started_at.is_some() {
                return false;
            }
            Self::seal(status, DownloadState::Cancelled, None);
            true
        })
    }

    pub fn complete(&self) -> bool {
        self.update(|status| {
            Self::seal(status, DownloadState::Completed, None);
            true
        })
    }

    pub fn cancel(&self) -> bool {
        self.update(|status| {
            Self::seal(status, DownloadState::Cancelled, None);
            true
        })
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        self.update(|status| {
            Self::seal(status, DownloadState::Failed, Some(message));
            true
        })
    }

    fn seal(status: &mut DownloadStatus, state: DownloadState, error: Option<String>) {
        status.state = state;
        status.error_message = error;
        status.finished_at = Some(Utc::now());
    }

    fn update(&self, apply: impl FnOnce(&mut DownloadStatus) -> bool) -> bool {
        self.status.send_if_modified(|status| {
            if status.is_terminal() {
                return false;
            }
            apply(status)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> ProgressLedger {
        ProgressLedger::new("http://example.com/file", "file.bin")
    }

    #[test]
    fn starts_queued() {
        let ledger = ledger();
        let status = ledger.snapshot();
        assert_eq!(status.state, DownloadState::Queued);
        assert_eq!(status.downloaded_bytes, 0);
        assert_eq!(status.total_bytes, None);
        assert!(status.started_at.is_none());
    }

    #[test]
    fn terminal_snapshot_is_frozen() {
        let ledger = ledger();
        ledger.begin();
        ledger.set_total_bytes(Some(10));
        ledger.add_downloaded(10);
        assert!(ledger.complete());
        let frozen = ledger.snapshot();

        assert!(!ledger.add_downloaded(5));
        let gate = PauseGate::new();
        assert!(!ledger.mark_paused(&gate));
        assert!(!gate.is_paused());
        assert!(!ledger.cancel());
        assert!(!ledger.fail("late"));
        assert!(!ledger.set_total_bytes(None));
        assert_eq!(ledger.snapshot(), frozen);
        assert_eq!(frozen.state, DownloadState::Completed);
    }

    #[test]
    fn pause_resume_before_start_returns_to_queued() {
        let ledger = ledger();
        let gate = PauseGate::new();
        assert!(ledger.mark_paused(&gate));
        assert!(gate.is_paused());
        assert!(ledger.mark_resumed(&gate));
        assert!(!gate.is_paused());
        assert_eq!(ledger.state(), DownloadState::Queued);
    }

    #[test]
    fn begin_keeps_pause_requested_while_queued() {
        let ledger = ledger();
        let gate = PauseGate::new();
        ledger.mark_paused(&gate);
        ledger.begin();
        assert_eq!(ledger.state(), DownloadState::Paused);
        ledger.mark_resumed(&gate);
        assert_eq!(ledger.state(), DownloadState::Downloading);
    }

    #[test]
    fn started_download_is_not_cancelled_by_manager_side() {
        let ledger = ledger();
        ledger.begin();
        assert!(!ledger.cancel_if_not_started());
        assert_eq!(ledger.state(), DownloadState::Downloading);
    }

    #[test]
    fn queued_download_cancels_without_downloading() {
        let ledger = ledger();
        let mut rx = ledger.subscribe();
        assert!(ledger.cancel_if_not_started());
        assert!(rx.has_changed().unwrap());
        let status = rx.borrow_and_update().clone();
        assert_eq!(status.state, DownloadState::Cancelled);
        assert!(status.started_at.is_none());
        assert!(!ledger.begin());
    }

    #[test]
    fn failure_records_message() {
        let ledger = ledger();
        ledger.begin();
        ledger.fail("connection refused");
        let status = ledger.snapshot();
        assert_eq!(status.state, DownloadState::Failed);
        assert_eq!(status.error_message.as_deref(), Some("connection refused"));
        assert!(status.finished_at.is_some());
    }

    #[test]
    fn concurrent_pause_and_resume_keep_gate_and_state_in_step() {
        let ledger = ledger();
        let gate = PauseGate::new();
        ledger.begin();

        for round in 0..200 {
            std::thread::scope(|scope| {
                scope.spawn(|| {
                    for _ in 0..50 {
                        ledger.mark_paused(&gate);
                    }
                });
                scope.spawn(|| {
                    for _ in 0..50 {
                        ledger.mark_resumed(&gate);
                    }
                });
            });

            let paused = ledger.state() == DownloadState::Paused;
            assert_eq!(paused, gate.is_paused(), "第 {} 轮后闸门与状态不一致", round);
        }
    }
}
