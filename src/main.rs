use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{debug, info, warn};

use dlcore::common::logger::PrettyLogger;
use dlcore::common::progress::ProgressBoard;
use dlcore::{DownloadId, DownloadManager, DownloadState, log_error, log_info, log_success, log_warning};

mod cli;

const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    // 初始化日志
    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    let config = args.download_config()?;
    debug!("下载配置: {:?}", config);

    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("无法创建输出目录: {}", args.output_dir.display()))?;

    let manager = DownloadManager::with_config(config)?;
    let mut board = ProgressBoard::new();
    let mut ids: Vec<DownloadId> = Vec::with_capacity(args.urls.len());

    for (index, url) in args.urls.iter().enumerate() {
        let name = cli::file_name_for(url, index);
        let id = manager.start(url.as_str(), args.output_dir.join(&name))?;
        info!("已提交 {}: {}", id, url);
        board.track(id, name);
        ids.push(id);
    }
    log_info!("开始下载 {} 个文件，并发数 {}", ids.len(), manager.config().max_concurrent);

    let interrupted = watch_until_done(&manager, &board, &ids).await;
    if interrupted {
        warn!("收到中断信号，取消全部下载");
        manager.shutdown_now().await;
    } else {
        manager.shutdown().await;
    }

    // 关闭后再刷新一次，保证显示的是最终状态
    for id in &ids {
        if let Some(status) = manager.status(*id) {
            board.update(*id, &status);
        }
    }
    board.clear();

    if interrupted {
        log_warning!("下载已中断");
    }
    let results = manager.list();
    PrettyLogger::completion_summary(&results);

    let failed = results
        .iter()
        .filter(|(_, status)| status.state == DownloadState::Failed)
        .count();
    if failed > 0 {
        log_error!("{} 个文件下载失败，详情见上方", failed);
    } else if !interrupted {
        log_success!("全部文件已保存到 {}", args.output_dir.display());
    }
    Ok(())
}

// 轮询所有任务直到全部结束；收到 Ctrl-C 时返回 true
async fn watch_until_done(manager: &DownloadManager, board: &ProgressBoard, ids: &[DownloadId]) -> bool {
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    // 只注册一次信号，重绘期间到达的 Ctrl-C 也不会丢失
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => return true,
            _ = ticker.tick() => {}
        }

        let mut finished = 0;
        for id in ids {
            if let Some(status) = manager.status(*id) {
                board.update(*id, &status);
                if status.is_terminal() {
                    finished += 1;
                }
            }
        }
        if finished == ids.len() {
            return false;
        }
    }
}
