use reqwest::{
    Client, ClientBuilder,
    header::{ACCEPT, ACCEPT_ENCODING, HeaderMap, HeaderValue, USER_AGENT},
};
use tracing::{debug, error};

use crate::downloader::config::DownloadConfig;
use crate::downloader::error::{DownloadError, Result};

// 所有下载任务共享的 HTTP 客户端
pub fn build_client(config: &DownloadConfig) -> Result<Client> {
    debug!(
        "创建 HTTP 客户端，连接超时: {:?}，读取超时: {:?}",
        config.connect_timeout(),
        config.read_timeout()
    );

    ClientBuilder::new()
        .connect_timeout(config.connect_timeout())
        .default_headers(default_headers(config))
        .build()
        .map_err(|e| {
            error!("Error creating client: {}", e);
            DownloadError::from(e)
        })
}

pub fn default_headers(config: &DownloadConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(ACCEPT, HeaderValue::from_static("*/*"));
    // 保证写入的字节与服务器声明的长度一致
    headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));
    let agent = HeaderValue::from_str(&config.user_agent)
        .unwrap_or_else(|_| HeaderValue::from_static("dlcore"));
    headers.insert(USER_AGENT, agent);
    headers
}
