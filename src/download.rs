use std::{path::Path, sync::Arc};

use async_trait::async_trait;

use crate::{
    retry::Transient,
    util::{FetchError, HttpClient},
    ytdl::YtdlError,
};

#[derive(thiserror::Error, Debug)]
pub enum DownloadError {
    #[error("{0}")]
    FetchError(#[from] FetchError),
    #[error("{0}")]
    YtdlError(#[from] YtdlError),
}

impl Transient for DownloadError {
    fn is_transient(&self) -> bool {
        match self {
            DownloadError::FetchError(e) => e.is_transient(),
            DownloadError::YtdlError(e) => e.is_transient(),
        }
    }
}

/// Writes lesson media to disk. Existing files at `dest` are replaced.
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    async fn download_video(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;

    async fn download_subtitle(&self, url: &str, dest: &Path) -> Result<(), DownloadError>;
}

/// Streams both videos and subtitles straight from the resolved URL.
pub struct HttpDownloader {
    client: Arc<HttpClient>,
}

impl HttpDownloader {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MediaDownloader for HttpDownloader {
    async fn download_video(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        let size = self.client.download_file(url, dest).await?;
        debug!("Downloaded {} ({} bytes)", dest.display(), size);
        Ok(())
    }

    async fn download_subtitle(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.client.download_file(url, dest).await?;
        Ok(())
    }
}
