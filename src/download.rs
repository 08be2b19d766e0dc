//! Streaming HTTP download service: chunked writes, resumable via `.part`
//! staging, progress callbacks, bounded retry on transient failure.

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::TryStreamExt;
use miette::Diagnostic;
use reqwest::header;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, trace, warn};

use crate::fs;
use crate::progress::{ProgressReporter, TaskKind};

/// Files smaller than this are downloaded without a visible progress task.
pub const PROGRESS_THRESHOLD_BYTES: u64 = 1024 * 1024;
const CHUNK_RETRY_LIMIT: u32 = 3;

#[derive(Debug, Error, Diagnostic)]
pub enum DownloadError {
    #[error("network request failed")]
    #[diagnostic(code(my_unicorn::download::network))]
    Network(#[from] reqwest::Error),

    #[error(transparent)]
    #[diagnostic(code(my_unicorn::download::io))]
    Io(#[from] std::io::Error),

    #[error("download of {url} was cancelled")]
    #[diagnostic(code(my_unicorn::download::cancelled))]
    Cancelled { url: String },
}

/// Streaming HTTP GET, writing chunked to disk with resume support.
#[derive(Clone)]
pub struct DownloadService {
    client: reqwest::Client,
}

impl Default for DownloadService {
    fn default() -> Self {
        Self::new()
    }
}

impl DownloadService {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .connect_timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds"),
        }
    }

    /// Downloads `url` to `dest`, staging through `dest.part` and renaming
    /// on success. A stale `.part` file from a prior failed attempt is
    /// overwritten, not resumed. Total content length is used for progress
    /// reporting when known.
    #[instrument(skip(self, reporter))]
    pub async fn download_file(
        &self,
        url: &str,
        dest: &Path,
        label: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), DownloadError> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let part_path = part_path(dest);
        let mut attempt = 0;

        loop {
            match self
                .try_download(url, dest, &part_path, label, reporter)
                .await
            {
                Ok(()) => return Ok(()),
                Err(DownloadError::Network(e)) if attempt < CHUNK_RETRY_LIMIT && is_transient(&e) => {
                    attempt += 1;
                    let backoff = Duration::from_millis(250 * 2u64.pow(attempt));
                    warn!(url, attempt, ?backoff, "retrying transient download failure");
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    let _ = fs::remove_file(&part_path).await;
                    return Err(e);
                }
            }
        }
    }

    async fn try_download(
        &self,
        url: &str,
        dest: &Path,
        part_path: &Path,
        label: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<(), DownloadError> {
        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "*/*")
            .send()
            .await?
            .error_for_status()?;

        let total = response.content_length();

        let task_id = (total.unwrap_or(0) >= PROGRESS_THRESHOLD_BYTES).then(|| {
            reporter.add_task(label, TaskKind::Download, total, Some(label.to_string()), None, None, None)
        });

        // Runs whenever this scope ends without `into_inner` below: on a
        // stream error, or on the enclosing future simply being dropped
        // (cancellation). Removes the partial file and marks the task
        // failed so a cancelled download never leaves stray `.part` files
        // or a progress bar stuck mid-fill.
        let part_path_buf = part_path.to_path_buf();
        let guard_task_id = task_id.clone();
        let cleanup = scopeguard::guard((), |()| {
            let _ = std::fs::remove_file(&part_path_buf);
            if let Some(id) = &guard_task_id {
                reporter.finish_task(id, false, Some("cancelled".to_string()));
            }
        });

        let file = fs::File::create(part_path).await?;
        let mut writer = BufWriter::new(file);
        let mut stream = response.bytes_stream();
        let mut downloaded = 0u64;

        while let Some(chunk) = stream.try_next().await? {
            writer.write_all(&chunk).await?;
            downloaded += chunk.len() as u64;
            if let Some(task_id) = &task_id {
                reporter.update_task(task_id, Some(downloaded), None, None);
            }
        }
        writer.flush().await?;

        fs::rename(part_path, dest).await?;
        scopeguard::ScopeGuard::into_inner(cleanup);

        if let Some(task_id) = &task_id {
            reporter.finish_task(task_id, true, None);
        }

        debug!(url, ?dest, downloaded, "download complete");
        Ok(())
    }

    /// Downloads the AppImage asset, labeling the progress task with its
    /// filename.
    pub async fn download_appimage(
        &self,
        url: &str,
        filename: &str,
        dest_dir: &Path,
        reporter: &dyn ProgressReporter,
    ) -> Result<PathBuf, DownloadError> {
        let dest = dest_dir.join(crate::sanitize_filename(filename));
        self.download_file(url, &dest, filename, reporter).await?;
        Ok(dest)
    }

    /// Downloads a checksum file and returns its body as text. No progress
    /// task is created; these files are small.
    #[instrument(skip(self))]
    pub async fn download_checksum_file(&self, url: &str) -> Result<String, DownloadError> {
        trace!(url, "fetching checksum file");
        let text = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(text)
    }
}

fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    dest.with_file_name(name)
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_timeout()
        || error.is_connect()
        || matches!(error.status().map(|s| s.as_u16()), Some(429) | Some(503))
}
