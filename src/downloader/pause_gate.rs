use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// 检查点的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Proceed,
    Cancelled,
}

/// 协作式暂停闸门
///
/// 控制方调用 `pause` / `resume`，下载任务在安全点调用 `checkpoint`。
/// 暂停只阻止下一次写入，已经在途的数据不会回滚。
#[derive(Debug)]
pub struct PauseGate {
    paused: watch::Sender<bool>,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        Self {
            paused: watch::Sender::new(false),
        }
    }

    pub fn pause(&self) {
        self.paused.send_if_modified(|paused| !std::mem::replace(paused, true));
    }

    /// 清除暂停标记并唤醒正在等待的任务
    pub fn resume(&self) {
        self.paused.send_if_modified(|paused| std::mem::replace(paused, false));
    }

    pub fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    /// 暂停时挂起，直到恢复或取消；只有值真正变为未暂停时才会返回 `Proceed`
    pub async fn checkpoint(&self, cancel: &CancellationToken) -> Checkpoint {
        if cancel.is_cancelled() {
            return Checkpoint::Cancelled;
        }

        let mut rx = self.paused.subscribe();
        if !*rx.borrow_and_update() {
            return Checkpoint::Proceed;
        }

        debug!("任务已暂停，等待恢复");
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Checkpoint::Cancelled,
            resumed = async { rx.wait_for(|paused| !*paused).await.map(|_| ()) } => match resumed {
                Ok(()) => Checkpoint::Proceed,
                // 发送端随闸门一起存活，这里只在闸门被销毁时出现
                Err(_) => Checkpoint::Cancelled,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn proceeds_when_not_paused() {
        let gate = PauseGate::new();
        let token = CancellationToken::new();
        assert_eq!(gate.checkpoint(&token).await, Checkpoint::Proceed);
    }

    #[tokio::test]
    async fn pause_and_resume_are_idempotent() {
        let gate = PauseGate::new();
        gate.pause();
        gate.pause();
        assert!(gate.is_paused());
        gate.resume();
        gate.resume();
        assert!(!gate.is_paused());
    }

    #[tokio::test]
    async fn blocks_until_resumed() {
        let gate = Arc::new(PauseGate::new());
        let token = CancellationToken::new();
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            let token = token.clone();
            tokio::spawn(async move { gate.checkpoint(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        gate.resume();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Checkpoint::Proceed);
    }

    #[tokio::test]
    async fn repeated_pause_does_not_wake_waiter() {
        let gate = Arc::new(PauseGate::new());
        let token = CancellationToken::new();
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            let token = token.clone();
            tokio::spawn(async move { gate.checkpoint(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        gate.pause();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        token.cancel();
        assert_eq!(waiter.await.unwrap(), Checkpoint::Cancelled);
    }

    #[tokio::test]
    async fn cancellation_wakes_paused_task() {
        let gate = Arc::new(PauseGate::new());
        let token = CancellationToken::new();
        gate.pause();

        let waiter = {
            let gate = Arc::clone(&gate);
            let token = token.clone();
            tokio::spawn(async move { gate.checkpoint(&token).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        token.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(outcome, Checkpoint::Cancelled);
        assert!(gate.is_paused());
    }
}
