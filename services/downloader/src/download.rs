//! Resumable file downloads and whole-run fetching.
//!
//! - HTTP Range requests resume `.partial` files left by an earlier attempt
//! - exponential backoff between attempts
//! - size verification against Content-Length before the final rename

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::{header, Client, Response, StatusCode};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::catalog::RunDescriptor;
use crate::config::DownloadSettings;
use crate::error::DownloadError;

/// Retry and timeout behaviour of a [`DownloadManager`].
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub max_retries: u32,
    /// Doubles after every failed attempt
    pub initial_retry_delay: Duration,
    pub max_retry_delay: Duration,
    pub request_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self::from(&DownloadSettings::default())
    }
}

impl From<&DownloadSettings> for DownloadConfig {
    fn from(settings: &DownloadSettings) -> Self {
        Self {
            max_retries: settings.max_retries,
            initial_retry_delay: settings.initial_retry_delay(),
            max_retry_delay: settings.max_retry_delay(),
            request_timeout: settings.request_timeout(),
        }
    }
}

/// Fetches every part of a run into a local directory.
#[async_trait]
pub trait RunFetcher: Send + Sync {
    /// Download all parts of `run` into `dest_dir` and return that directory.
    async fn fetch(&self, run: &RunDescriptor, dest_dir: &Path) -> Result<PathBuf, DownloadError>;
}

pub struct DownloadManager {
    client: Client,
    config: DownloadConfig,
}

impl DownloadManager {
    pub fn new(config: DownloadConfig) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(4)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| DownloadError::Config(format!("HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Download `url` to `dest`, retrying with backoff. An existing `dest`
    /// is taken as complete.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64, DownloadError> {
        if let Ok(meta) = fs::metadata(dest).await {
            debug!(path = %dest.display(), "File already present, skipping download");
            return Ok(meta.len());
        }
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }

        let partial = partial_path(dest);
        let mut attempt = 0;
        let mut delay = self.config.initial_retry_delay;

        loop {
            match self.download_with_resume(url, &partial).await {
                Ok(bytes) => {
                    // rename can fail across filesystems
                    if fs::rename(&partial, dest).await.is_err() {
                        fs::copy(&partial, dest).await?;
                        fs::remove_file(&partial).await?;
                    }
                    info!(path = %dest.display(), bytes, "Download completed");
                    return Ok(bytes);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.config.max_retries {
                        return Err(DownloadError::RetriesExhausted {
                            attempts: attempt,
                            last_error: e.to_string(),
                        });
                    }

                    warn!(
                        error = %e,
                        retry = attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Download failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    delay = std::cmp::min(delay * 2, self.config.max_retry_delay);
                }
            }
        }
    }

    /// One attempt: resume `partial` if the server allows it, then verify
    /// the final size.
    async fn download_with_resume(&self, url: &str, partial: &Path) -> Result<u64, DownloadError> {
        let (total, supports_range) = self.probe(url).await;

        let mut resume_from = match fs::metadata(partial).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        if let Some(total) = total {
            if resume_from == total {
                return Ok(total);
            }
            if resume_from > total {
                fs::remove_file(partial).await.ok();
                resume_from = 0;
            }
        }

        let mut request = self.client.get(url);
        if resume_from > 0 && supports_range {
            info!(resume_from, total = ?total, "Resuming download");
            request = request.header(header::RANGE, format!("bytes={}-", resume_from));
        } else if resume_from > 0 {
            warn!("Server does not support range requests, restarting download");
            fs::remove_file(partial).await.ok();
            resume_from = 0;
        }

        let response = request.send().await.map_err(|e| DownloadError::Http {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let append = match response.status() {
            StatusCode::PARTIAL_CONTENT => true,
            StatusCode::OK => false,
            StatusCode::RANGE_NOT_SATISFIABLE => {
                // the partial file no longer matches the remote one
                fs::remove_file(partial).await.ok();
                return Err(DownloadError::Http {
                    url: url.to_string(),
                    reason: "range not satisfiable, partial file discarded".to_string(),
                });
            }
            status => {
                return Err(DownloadError::Http {
                    url: url.to_string(),
                    reason: format!("HTTP {}", status),
                })
            }
        };

        let expected = total.or_else(|| {
            content_length(&response).map(|len| if append { len + resume_from } else { len })
        });

        let written = stream_to_file(response, partial, append).await?;
        let actual = fs::metadata(partial).await?.len();
        debug!(written, actual, "Response body stored");

        if let Some(expected) = expected {
            if actual != expected {
                return Err(DownloadError::SizeMismatch {
                    url: url.to_string(),
                    expected,
                    actual,
                });
            }
        }
        Ok(actual)
    }

    /// Content length and range support from a HEAD request. Failures are
    /// not fatal; the GET decides.
    async fn probe(&self, url: &str) -> (Option<u64>, bool) {
        match self.client.head(url).send().await {
            Ok(response) if response.status().is_success() => {
                let ranges = response
                    .headers()
                    .get(header::ACCEPT_RANGES)
                    .and_then(|v| v.to_str().ok())
                    .map_or(true, |v| v != "none");
                (content_length(&response), ranges)
            }
            Ok(response) => {
                debug!(status = %response.status(), "HEAD not supported");
                (None, false)
            }
            Err(e) => {
                debug!(error = %e, "HEAD request failed");
                (None, false)
            }
        }
    }
}

#[async_trait]
impl RunFetcher for DownloadManager {
    #[instrument(skip(self, run), fields(run_id = %run.run_id, parts = run.parts.len()))]
    async fn fetch(&self, run: &RunDescriptor, dest_dir: &Path) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(dest_dir).await?;
        let mut total = 0u64;
        for part in &run.parts {
            total += self.download(&part.url, &dest_dir.join(&part.file_name)).await?;
        }
        info!(dir = %dest_dir.display(), bytes = total, "Run fetched");
        Ok(dest_dir.to_path_buf())
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".partial");
    dest.with_file_name(name)
}

fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

async fn stream_to_file(response: Response, path: &Path, append: bool) -> Result<u64, DownloadError> {
    let url = response.url().to_string();
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .append(append)
        .truncate(!append)
        .open(path)
        .await?;

    let mut written = 0u64;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| DownloadError::Http {
            url: url.clone(),
            reason: format!("reading body: {}", e),
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }

    file.flush().await?;
    file.sync_all().await?;
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_path_appends_suffix() {
        let p = partial_path(Path::new("/data/run/FH00-15_grib2.bin"));
        assert_eq!(p, PathBuf::from("/data/run/FH00-15_grib2.bin.partial"));
    }

    #[test]
    fn test_config_from_settings() {
        let settings = DownloadSettings {
            max_retries: 1,
            initial_retry_delay_secs: 3,
            ..DownloadSettings::default()
        };
        let config = DownloadConfig::from(&settings);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.initial_retry_delay, Duration::from_secs(3));
        assert_eq!(config.max_retry_delay, Duration::from_secs(120));
    }
}
