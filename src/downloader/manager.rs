use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Semaphore, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::config::DownloadConfig;
use super::error::{DownloadError, Result};
use super::ledger::ProgressLedger;
use super::models::{DownloadId, DownloadStatus};
use super::pause_gate::PauseGate;
use super::task::DownloadTask;
use crate::common::client::build_client;

// 管理端持有的控制句柄
#[derive(Debug, Clone)]
struct DownloadHandle {
    ledger: Arc<ProgressLedger>,
    gate: Arc<PauseGate>,
    cancel: CancellationToken,
}

/// 下载管理器
///
/// 每个提交的下载立即被派发，并在信号量上排队等待工作槽位，
/// 因此 `start` 不会阻塞也不会拒绝。结束的任务会保留在表中，
/// 直到调用 `remove` 或 `prune_finished`；编号永不复用。
#[derive(Clone)]
pub struct DownloadManager {
    handles: Arc<DashMap<DownloadId, DownloadHandle>>, // id -> handle
    next_id: Arc<AtomicU64>,
    slots: Arc<Semaphore>, // 控制并发数
    tracker: TaskTracker,
    shutdown: CancellationToken,
    client: reqwest::Client,
    config: Arc<DownloadConfig>,
}

impl DownloadManager {
    pub fn new(max_concurrent: usize) -> Result<Self> {
        Self::with_config(DownloadConfig::with_max_concurrent(max_concurrent))
    }

    pub fn with_config(config: DownloadConfig) -> Result<Self> {
        let config = config.normalized();
        let client = build_client(&config)?;

        Ok(Self {
            handles: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
            slots: Arc::new(Semaphore::new(config.max_concurrent)),
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            client,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.config
    }

    /// 添加新的下载任务，立即返回编号
    ///
    /// 必须在 tokio 运行时内调用。只在 `shutdown` 之后返回错误。
    pub fn start(
        &self,
        source: impl Into<String>,
        destination: impl Into<PathBuf>,
    ) -> Result<DownloadId> {
        if self.tracker.is_closed() {
            warn!("管理器已关闭，拒绝新任务");
            return Err(DownloadError::ShuttingDown);
        }

        let id = DownloadId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let source = source.into();
        let destination = destination.into();

        let handle = DownloadHandle {
            ledger: Arc::new(ProgressLedger::new(source.clone(), destination.clone())),
            gate: Arc::new(PauseGate::new()),
            cancel: self.shutdown.child_token(),
        };
        let task = DownloadTask {
            id,
            source,
            destination,
            ledger: Arc::clone(&handle.ledger),
            gate: Arc::clone(&handle.gate),
            cancel: handle.cancel.clone(),
        };
        self.handles.insert(id, handle);

        debug!("添加下载任务 {}: {} -> {}", id, task.source, task.destination.display());

        let slots = Arc::clone(&self.slots);
        let client = self.client.clone();
        let config = Arc::clone(&self.config);
        self.tracker.spawn(async move {
            Self::run(task, slots, client, config).await;
        });

        Ok(id)
    }

    pub fn pause(&self, id: DownloadId) -> Result<()> {
        let handle = self.handle(id)?;
        if handle.ledger.is_terminal() {
            debug!("任务 {} 已结束，忽略暂停", id);
            return Ok(());
        }

        if handle.ledger.mark_paused(&handle.gate) {
            info!("任务 {} 已暂停", id);
        }
        Ok(())
    }

    pub fn resume(&self, id: DownloadId) -> Result<()> {
        let handle = self.handle(id)?;
        if handle.ledger.is_terminal() {
            debug!("任务 {} 已结束，忽略恢复", id);
            return Ok(());
        }

        if handle.ledger.mark_resumed(&handle.gate) {
            info!("任务 {} 已恢复", id);
        }
        Ok(())
    }

    /// 请求取消，不等待任务真正退出
    ///
    /// 还在排队的任务立即进入 `Cancelled`；已经结束的任务保持原状态。
    pub fn cancel(&self, id: DownloadId) -> Result<()> {
        let handle = self.handle(id)?;
        handle.cancel.cancel();
        if handle.ledger.cancel_if_not_started() {
            info!("排队中的任务 {} 已取消", id);
        } else {
            debug!("已向任务 {} 发送取消信号", id);
        }
        Ok(())
    }

    // 获取任务状态
    pub fn status(&self, id: DownloadId) -> Option<DownloadStatus> {
        self.handles.get(&id).map(|handle| handle.ledger.snapshot())
    }

    pub fn subscribe(&self, id: DownloadId) -> Option<watch::Receiver<DownloadStatus>> {
        self.handles.get(&id).map(|handle| handle.ledger.subscribe())
    }

    pub fn list(&self) -> Vec<(DownloadId, DownloadStatus)> {
        let mut all: Vec<_> = self
            .handles
            .iter()
            .map(|entry| (*entry.key(), entry.value().ledger.snapshot()))
            .collect();
        all.sort_by_key(|(id, _)| *id);
        all
    }

    /// 移除一个已结束的任务并返回它的最终状态
    pub fn remove(&self, id: DownloadId) -> Result<DownloadStatus> {
        match self
            .handles
            .remove_if(&id, |_, handle| handle.ledger.is_terminal())
        {
            Some((_, handle)) => Ok(handle.ledger.snapshot()),
            None if self.handles.contains_key(&id) => Err(DownloadError::StillActive(id)),
            None => Err(DownloadError::NotFound(id)),
        }
    }

    /// 清理所有已结束的任务，返回清理数量
    pub fn prune_finished(&self) -> usize {
        let before = self.handles.len();
        self.handles.retain(|_, handle| !handle.ledger.is_terminal());
        let pruned = before.saturating_sub(self.handles.len());
        if pruned > 0 {
            debug!("清理了 {} 个已结束的任务", pruned);
        }
        pruned
    }

    /// 停止接受新任务，并等待所有已提交的任务结束
    ///
    /// 暂停中的任务会一直等待恢复，需要立即退出时使用 `shutdown_now`。
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!("等待 {} 个下载任务结束", self.tracker.len());
        self.tracker.wait().await;
        info!("下载管理器已关闭");
    }

    /// 停止接受新任务，取消全部任务并等待它们退出
    pub async fn shutdown_now(&self) {
        self.tracker.close();
        self.shutdown.cancel();
        info!("取消 {} 个下载任务", self.tracker.len());
        self.tracker.wait().await;
        info!("下载管理器已关闭");
    }

    fn handle(&self, id: DownloadId) -> Result<DownloadHandle> {
        self.handles
            .get(&id)
            .map(|handle| handle.value().clone())
            .ok_or(DownloadError::NotFound(id))
    }

    async fn run(
        task: DownloadTask,
        slots: Arc<Semaphore>,
        client: reqwest::Client,
        config: Arc<DownloadConfig>,
    ) {
        let id = task.id;
        let _permit = tokio::select! {
            biased;
            _ = task.cancel.cancelled() => {
                task.ledger.cancel_if_not_started();
                debug!("任务 {} 在排队时被取消", id);
                return;
            }
            permit = slots.acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(e) => {
                    task.ledger.fail(format!("工作池不可用: {}", e));
                    return;
                }
            },
        };

        debug!("任务 {} 获得工作槽位", id);
        let state = task.run(&client, &config).await;
        debug!("任务 {} 释放工作槽位，最终状态: {}", id, state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::downloader::models::DownloadState;

    #[tokio::test]
    async fn ids_are_monotonic() {
        let manager = DownloadManager::new(1).unwrap();
        let first = manager.start("http://127.0.0.1:1/a", "a.bin").unwrap();
        let second = manager.start("http://127.0.0.1:1/b", "b.bin").unwrap();
        assert!(second > first);
        manager.shutdown_now().await;
    }

    #[tokio::test]
    async fn unknown_ids_are_not_found() {
        let manager = DownloadManager::new(2).unwrap();
        let id = DownloadId(42);
        assert!(matches!(manager.pause(id), Err(DownloadError::NotFound(_))));
        assert!(matches!(manager.resume(id), Err(DownloadError::NotFound(_))));
        assert!(matches!(manager.cancel(id), Err(DownloadError::NotFound(_))));
        assert!(matches!(manager.remove(id), Err(DownloadError::NotFound(_))));
        assert!(manager.status(id).is_none());
        assert!(manager.subscribe(id).is_none());
    }

    #[tokio::test]
    async fn start_is_refused_after_shutdown() {
        let manager = DownloadManager::new(2).unwrap();
        manager.shutdown().await;
        assert!(matches!(
            manager.start("http://127.0.0.1:1/a", "a.bin"),
            Err(DownloadError::ShuttingDown)
        ));
    }

    #[tokio::test]
    async fn cancelling_before_the_task_runs_skips_downloading() {
        let manager = DownloadManager::new(1).unwrap();
        let id = manager.start("http://127.0.0.1:1/a", "a.bin").unwrap();
        let mut rx = manager.subscribe(id).unwrap();

        // 当前线程运行时下，派发的任务还没有机会运行
        manager.cancel(id).unwrap();
        manager.shutdown().await;

        let status = rx.borrow_and_update().clone();
        assert_eq!(status.state, DownloadState::Cancelled);
        assert!(status.started_at.is_none());
        assert!(matches!(manager.remove(id), Ok(_)));
        assert!(manager.status(id).is_none());
    }

    #[tokio::test]
    async fn pause_and_resume_from_many_threads_stay_consistent() {
        let manager = DownloadManager::new(1).unwrap();
        let id = manager.start("http://127.0.0.1:1/a", "a.bin").unwrap();
        let handle = manager.handle(id).unwrap();

        for _ in 0..100 {
            std::thread::scope(|scope| {
                for worker in 0..4 {
                    let manager = manager.clone();
                    scope.spawn(move || {
                        for _ in 0..25 {
                            if worker % 2 == 0 {
                                manager.pause(id).unwrap();
                            } else {
                                manager.resume(id).unwrap();
                            }
                        }
                    });
                }
            });

            let paused = manager.status(id).unwrap().state == DownloadState::Paused;
            assert_eq!(paused, handle.gate.is_paused());
        }

        manager.shutdown_now().await;
    }
}
