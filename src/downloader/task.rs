use std::path::PathBuf;
use std::sync::Arc;

use futures::TryStreamExt;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use url::Url;

use super::config::DownloadConfig;
use super::error::{DownloadError, Result};
use super::ledger::ProgressLedger;
use super::models::{DownloadId, DownloadState};
use super::pause_gate::{Checkpoint, PauseGate};

/// 单个文件的流式下载任务
///
/// 账本和暂停闸门与控制方共享，其余资源（连接、缓冲区、文件句柄）
/// 都由任务独占。
#[derive(Debug)]
pub struct DownloadTask {
    pub id: DownloadId,
    pub source: String,
    pub destination: PathBuf,
    pub ledger: Arc<ProgressLedger>,
    pub gate: Arc<PauseGate>,
    pub cancel: CancellationToken,
}

enum Transfer {
    Completed,
    Cancelled,
}

impl DownloadTask {
    /// 执行下载并返回最终状态；所有错误都只记录到账本里
    pub async fn run(self, client: &reqwest::Client, config: &DownloadConfig) -> DownloadState {
        if !self.ledger.begin() {
            debug!("任务 {} 在开始前已结束", self.id);
            return self.ledger.state();
        }

        info!("开始下载任务 {}: {}", self.id, self.source);

        match self.transfer(client, config).await {
            Ok(Transfer::Completed) => {
                self.ledger.complete();
                info!(
                    "✅ 下载任务完成 {}: {} 字节",
                    self.id,
                    self.ledger.snapshot().downloaded_bytes
                );
            }
            Ok(Transfer::Cancelled) => {
                self.ledger.cancel();
                info!("下载任务已取消 {}", self.id);
            }
            Err(e) if self.cancel.is_cancelled() => {
                debug!("任务 {} 取消时出现错误: {}", self.id, e);
                self.ledger.cancel();
                info!("下载任务已取消 {}", self.id);
            }
            Err(e) => {
                let report = anyhow::Error::new(e);
                error!("❌ 下载任务失败 {}: {:#}", self.id, report);
                self.ledger.fail(format!("{:?}", report));
            }
        }

        self.ledger.state()
    }

    async fn transfer(&self, client: &reqwest::Client, config: &DownloadConfig) -> Result<Transfer> {
        let url = parse_source(&self.source)?;
        let read_timeout = config.read_timeout();

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Transfer::Cancelled),
            response = tokio::time::timeout(read_timeout, client.get(url).send()) => {
                response.map_err(|_| DownloadError::ReadTimeout(read_timeout))??
            }
        };
        check_response_status(&response, &self.source)?;

        let total_bytes = response.content_length();
        debug!("任务 {} 的总大小: {:?}", self.id, total_bytes);
        self.ledger.set_total_bytes(total_bytes);

        let mut file = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Transfer::Cancelled),
            file = tokio::fs::File::create(&self.destination) => {
                file.map_err(|e| DownloadError::io(&self.destination, e))?
            }
        };

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        let mut reader = StreamReader::new(Box::pin(stream));
        let outcome = self.copy_into(&mut reader, &mut file, config).await;

        // 无论结果如何都先把已写入的数据刷到文件，部分文件保持原样
        let flushed = file
            .flush()
            .await
            .map_err(|e| DownloadError::io(&self.destination, e));
        match outcome {
            Ok(Transfer::Completed) => flushed.map(|_| Transfer::Completed),
            other => other,
        }
    }

    // 读取 -> 取消检查 -> 暂停检查点 -> 写入并刷新 -> 计数
    async fn copy_into<R>(
        &self,
        reader: &mut R,
        file: &mut tokio::fs::File,
        config: &DownloadConfig,
    ) -> Result<Transfer>
    where
        R: AsyncRead + Unpin,
    {
        let read_timeout = config.read_timeout();
        let mut buffer = vec![0u8; config.chunk_size.max(1)];

        loop {
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Transfer::Cancelled),
                read = tokio::time::timeout(read_timeout, reader.read(&mut buffer)) => {
                    read.map_err(|_| DownloadError::ReadTimeout(read_timeout))??
                }
            };
            if read == 0 {
                return Ok(Transfer::Completed);
            }

            if self.gate.checkpoint(&self.cancel).await == Checkpoint::Cancelled {
                return Ok(Transfer::Cancelled);
            }

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(Transfer::Cancelled),
                written = async {
                    file.write_all(&buffer[..read]).await?;
                    // tokio 的文件写入在后台完成，刷新后才计入已下载字节
                    file.flush().await
                } => {
                    written.map_err(|e| DownloadError::io(&self.destination, e))?
                }
            }
            self.ledger.add_downloaded(read as u64);
        }
    }
}

fn parse_source(source: &str) -> Result<Url> {
    let url = Url::parse(source).map_err(|e| DownloadError::InvalidUrl(format!("{}: {}", source, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(DownloadError::InvalidUrl(format!(
            "{}: 不支持的协议 {}",
            source, scheme
        ))),
    }
}

// 检查响应状态，非 2xx 一律视为失败
fn check_response_status(response: &reqwest::Response, url: &str) -> Result<()> {
    let status = response.status();
    debug!("Response Status: {}", status);

    if status.is_success() {
        Ok(())
    } else {
        warn!("❌ 非成功状态码: {}", status);
        Err(DownloadError::HttpStatus {
            status,
            url: url.to_string(),
        })
    }
}
