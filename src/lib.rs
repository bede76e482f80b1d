pub mod common;
pub mod downloader;

pub use downloader::{
    DownloadConfig, DownloadError, DownloadId, DownloadManager, DownloadState, DownloadStatus,
};
