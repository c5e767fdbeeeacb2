//! Streaming artifact download with progress and cancellation

use std::path::{Path, PathBuf};
use std::time::Duration;

use futures::StreamExt;
use percent_encoding::percent_decode_str;
use reqwest::header::CONTENT_DISPOSITION;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use url::Url;

use super::github::USER_AGENT;
use crate::error::{InstallerError, IoResultExt};
use crate::progress::DownloadProgress;

/// Filename used when the server suggests none
pub const DEFAULT_FILENAME: &str = "downloaded_file.dmg";

const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30); // Initial connection
const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300); // 5 min no data

/// Downloads one artifact at a time into a caller-owned directory
#[derive(Clone)]
pub struct ProgressDownloader {
    client: reqwest::Client,
    inactivity_timeout: Duration,
}

impl ProgressDownloader {
    pub fn new() -> Result<Self, InstallerError> {
        let client = reqwest::Client::builder()
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self {
            client,
            inactivity_timeout: DOWNLOAD_INACTIVITY_TIMEOUT,
        })
    }

    /// Fail the transfer when no data arrives for `limit`
    pub fn with_inactivity_timeout(mut self, limit: Duration) -> Self {
        self.inactivity_timeout = limit;
        self
    }

    /// Download `url` into `dest_dir`
    ///
    /// Progress snapshots are pushed best-effort into `progress_tx`. Resolves
    /// exactly once: with the final file path, with
    /// [`InstallerError::InstallationCancelled`] once `cancel` fires, or with
    /// the transport/filesystem error. Partial data never survives a failed or
    /// cancelled transfer.
    pub async fn download(
        &self,
        url: &Url,
        dest_dir: &Path,
        cancel: &CancellationToken,
        progress_tx: mpsc::Sender<DownloadProgress>,
    ) -> Result<PathBuf, InstallerError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                log::info!("Download of {url} cancelled");
                Err(InstallerError::InstallationCancelled)
            }
            result = self.transfer(url, dest_dir, progress_tx) => result,
        }
    }

    async fn transfer(
        &self,
        url: &Url,
        dest_dir: &Path,
        progress_tx: mpsc::Sender<DownloadProgress>,
    ) -> Result<PathBuf, InstallerError> {
        log::info!("Downloading {url}");

        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(InstallerError::HttpError(status.as_u16()));
        }

        let filename = suggested_filename(&response).unwrap_or_else(|| DEFAULT_FILENAME.to_string());
        let total_bytes = response.content_length().unwrap_or(0);

        // Payload lands in a hidden temp file first; dropping it (error or
        // cancellation) removes the partial data.
        let partial = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(dest_dir)
            .at_path("create download file in", dest_dir)?;
        let std_file = partial
            .as_file()
            .try_clone()
            .at_path("open", partial.path())?;
        let mut file = tokio::fs::File::from_std(std_file);

        let send_best_effort = |progress: DownloadProgress| {
            if let Err(mpsc::error::TrySendError::Closed(_)) = progress_tx.try_send(progress) {
                log::debug!("Progress receiver gone, continuing download without updates");
            }
        };

        let mut stream = response.bytes_stream();
        let mut downloaded: u64 = 0;
        send_best_effort(DownloadProgress::new(0, total_bytes));

        loop {
            let chunk = match timeout(self.inactivity_timeout, stream.next()).await {
                Ok(Some(Ok(chunk))) => chunk,
                Ok(Some(Err(e))) => return Err(e.into()),
                Ok(None) => break,
                Err(_) => {
                    log::warn!(
                        "No data for {:?} after {}/{} bytes of {}",
                        self.inactivity_timeout,
                        downloaded,
                        total_bytes,
                        url
                    );
                    return Err(InstallerError::Stalled(self.inactivity_timeout));
                }
            };

            file.write_all(&chunk)
                .await
                .at_path("write", partial.path())?;
            downloaded += chunk.len() as u64;
            send_best_effort(DownloadProgress::new(downloaded, total_bytes));
        }

        file.flush().await.at_path("flush", partial.path())?;
        drop(file);

        let destination = dest_dir.join(&filename);
        remove_existing(&destination).await?;
        partial
            .persist(&destination)
            .map_err(|e| InstallerError::io_at("move download to", &destination, e.error))?;

        log::info!("Downloaded {} bytes to {}", downloaded, destination.display());
        Ok(destination)
    }
}

/// Overwrite semantics: whatever already sits at `path` goes first
async fn remove_existing(path: &Path) -> Result<(), InstallerError> {
    match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await.at_path("remove", path),
        Ok(_) => tokio::fs::remove_file(path).await.at_path("remove", path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(InstallerError::io_at("inspect", path, e)),
    }
}

/// Filename suggested by the server: `Content-Disposition`, then the last
/// segment of the final URL
fn suggested_filename(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_content_disposition)
        .or_else(|| filename_from_url(response.url()))
}

pub(crate) fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for param in header.split(';').map(str::trim) {
        if let Some(value) = param.strip_prefix("filename*=") {
            // RFC 5987: charset'lang'percent-encoded-value
            let value = value.trim_matches('"');
            let encoded = value.rsplit("''").next().unwrap_or(value);
            let decoded = percent_decode_str(encoded).decode_utf8().ok();
            if let Some(name) = decoded.as_deref().and_then(sanitize) {
                return Some(name);
            }
        } else if let Some(value) = param.strip_prefix("filename=") {
            plain = plain.or_else(|| sanitize(value.trim_matches('"')));
        }
    }
    plain
}

pub(crate) fn filename_from_url(url: &Url) -> Option<String> {
    url.path_segments()
        .and_then(|mut segments| segments.next_back())
        .and_then(sanitize)
}

/// Keep only a plain final path component
fn sanitize(name: &str) -> Option<String> {
    let name = Path::new(name).file_name()?.to_str()?.trim();
    if name.is_empty() || name.starts_with('.') {
        None
    } else {
        Some(name.to_string())
    }
}
