//! Single-attempt asset fetching.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::DownloadConfig;
use crate::error::Result;
use crate::fs::{FileSystem, TokioFileSystem};

/// Why a single fetch attempt did not produce a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// The server answered with something other than 200.
    Status(u16),
    /// The request exceeded the per-request timeout.
    Timeout,
    /// Connection, TLS or protocol failure.
    Transport(String),
    /// The response body was empty.
    Empty,
    /// The body could not be written to disk.
    Write(String),
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(code) => write!(f, "status {code}"),
            Self::Timeout => f.write_str("timed out"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::Empty => f.write_str("empty body"),
            Self::Write(e) => write!(f, "write error: {e}"),
        }
    }
}

/// Result of one fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    /// The body was written completely to the target path.
    Saved { bytes: u64 },
    /// The attempt failed; nothing is left at the target path.
    Failed(FetchFailure),
}

/// Performs one download attempt of `url` into `path`.
///
/// Implementations never return errors: every failure is a
/// [`FetchOutcome::Failed`] value.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, path: &Path) -> FetchOutcome;
}

/// Returns the `.part` file path for a given final path.
fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

/// Fetches over HTTP, streaming the body into a `.part` file that is renamed
/// into place only after a complete, non-empty write.
pub struct HttpFetcher<F: FileSystem = TokioFileSystem> {
    http: reqwest::Client,
    fs: F,
}

impl HttpFetcher<TokioFileSystem> {
    /// Builds a fetcher using the timeout and user agent from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &DownloadConfig) -> Result<Self> {
        Self::with_fs(config, TokioFileSystem)
    }
}

impl<F: FileSystem> HttpFetcher<F> {
    /// Builds a fetcher with a custom file system implementation.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_fs(config: &DownloadConfig, fs: F) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.as_str())
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { http, fs })
    }

    async fn stream_to_part(
        &self,
        response: &mut reqwest::Response,
        part: &Path,
    ) -> std::result::Result<u64, FetchFailure> {
        let mut file = self
            .fs
            .create_file(part)
            .await
            .map_err(|e| FetchFailure::Write(e.to_string()))?;

        let mut total: u64 = 0;
        loop {
            match response.chunk().await {
                Ok(Some(chunk)) => {
                    file.write_all(&chunk)
                        .await
                        .map_err(|e| FetchFailure::Write(e.to_string()))?;
                    total += chunk.len() as u64;
                }
                Ok(None) => break,
                Err(e) => return Err(classify(&e)),
            }
        }
        file.flush()
            .await
            .map_err(|e| FetchFailure::Write(e.to_string()))?;

        if total == 0 {
            return Err(FetchFailure::Empty);
        }
        Ok(total)
    }

    async fn try_fetch(&self, url: &str, path: &Path) -> std::result::Result<u64, FetchFailure> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            self.fs
                .create_dir_all(parent)
                .await
                .map_err(|e| FetchFailure::Write(e.to_string()))?;
        }

        let mut response = self.http.get(url).send().await.map_err(|e| classify(&e))?;
        if response.status() != reqwest::StatusCode::OK {
            return Err(FetchFailure::Status(response.status().as_u16()));
        }

        let part = part_path(path);
        match self.stream_to_part(&mut response, &part).await {
            Ok(bytes) => match self.fs.rename_file(&part, path).await {
                Ok(()) => Ok(bytes),
                Err(e) => {
                    let _ = self.fs.remove_file(&part).await;
                    Err(FetchFailure::Write(e.to_string()))
                }
            },
            Err(failure) => {
                let _ = self.fs.remove_file(&part).await;
                Err(failure)
            }
        }
    }
}

fn classify(err: &reqwest::Error) -> FetchFailure {
    if err.is_timeout() {
        FetchFailure::Timeout
    } else {
        FetchFailure::Transport(err.to_string())
    }
}

#[async_trait]
impl<F: FileSystem> Fetcher for HttpFetcher<F> {
    async fn fetch(&self, url: &str, path: &Path) -> FetchOutcome {
        match self.try_fetch(url, path).await {
            Ok(bytes) => {
                log::info!("Saved {} ({bytes} bytes)", path.display());
                FetchOutcome::Saved { bytes }
            }
            Err(failure) => {
                log::debug!("Fetch of {url} failed: {failure}");
                FetchOutcome::Failed(failure)
            }
        }
    }
}
