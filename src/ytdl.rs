use std::{io, path::Path, process::{ExitStatus, Stdio}, sync::Arc};

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio_stream::{wrappers::SplitStream, StreamExt};

use crate::{
    download::{DownloadError, MediaDownloader},
    retry::Transient,
    util::HttpClient,
};

pub const DEFAULT_PROGRAM: &str = "yt-dlp";

#[derive(thiserror::Error, Debug)]
pub enum YtdlError {
    #[error("could not run {program}: {source}")]
    SpawnError {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
    #[error("{program} exited with {status}")]
    ExitError { program: String, status: ExitStatus },
}

impl Transient for YtdlError {
    fn is_transient(&self) -> bool {
        matches!(self, YtdlError::ExitError { .. })
    }
}

/// Logs every line `reader` produces until it closes and returns how many
/// were logged. Output that is not UTF-8 is logged lossily.
async fn log_lines<R: AsyncRead + Unpin>(program: &str, reader: Option<R>, stderr: bool) -> usize {
    let Some(reader) = reader else {
        return 0;
    };

    let mut count = 0;
    let mut lines = SplitStream::new(BufReader::new(reader).split(b'\n'));
    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!("{}: could not read output: {}", program, e);
                break;
            }
        };
        let line = String::from_utf8_lossy(&line);
        let line = line.trim_end_matches('\r');
        if stderr {
            warn!("{}: {}", program, line);
        } else {
            debug!("{}: {}", program, line);
        }
        count += 1;
    }

    count
}

/// Runs `program` to download `url` into `output`, overwriting it.
pub async fn download(program: &str, url: &str, output: &Path) -> Result<(), YtdlError> {
    let mut cmd = tokio::process::Command::new(program);

    cmd.arg("--no-progress")
        .arg("--force-overwrites")
        .arg("-o")
        .arg(output)
        .arg(url)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd.spawn().map_err(|source| YtdlError::SpawnError {
        program: program.to_string(),
        source,
    })?;

    let (stdout, stderr) = (child.stdout.take(), child.stderr.take());
    let (status, _, _) = tokio::join!(
        child.wait(),
        log_lines(program, stdout, false),
        log_lines(program, stderr, true),
    );
    let status = status?;

    if !status.success() {
        return Err(YtdlError::ExitError {
            program: program.to_string(),
            status,
        });
    }

    Ok(())
}

/// Hands videos to an external downloader, subtitles go through the
/// HTTP client.
pub struct YtdlDownloader {
    client: Arc<HttpClient>,
    program: String,
}

impl YtdlDownloader {
    pub fn new(client: Arc<HttpClient>, program: impl Into<String>) -> Self {
        Self {
            client,
            program: program.into(),
        }
    }
}

#[async_trait]
impl MediaDownloader for YtdlDownloader {
    async fn download_video(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        download(&self.program, url, dest).await?;
        Ok(())
    }

    async fn download_subtitle(&self, url: &str, dest: &Path) -> Result<(), DownloadError> {
        self.client.download_file(url, dest).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_fatal() {
        let err = download("femdown-no-such-program", "https://example.com/v.mp4", Path::new("v.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, YtdlError::SpawnError { .. }), "unexpected error: {err}");
        assert!(!err.is_transient());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_program_is_transient() {
        let err = download("false", "https://example.com/v.mp4", Path::new("v.mp4"))
            .await
            .unwrap_err();

        assert!(matches!(err, YtdlError::ExitError { .. }), "unexpected error: {err}");
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn output_that_is_not_utf8_is_logged() {
        let output: &[u8] = b"[download] caf\xe9.mp4\r\n\xff\xfe\nDone";
        assert_eq!(log_lines("yt-dlp", Some(output), false).await, 3);
        assert_eq!(log_lines("yt-dlp", None::<&[u8]>, true).await, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn succeeding_program() {
        download("true", "https://example.com/v.mp4", Path::new("v.mp4"))
            .await
            .unwrap();
    }
}
