//! Batched, retrying download engine.

use std::path::Path;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::config::DownloadConfig;
use crate::context::RunContext;
use crate::fetch::{FetchFailure, FetchOutcome, Fetcher, HttpFetcher};
use crate::item::DownloadTask;

/// Trait for receiving download progress updates.
///
/// All methods have default no-op implementations for convenience.
pub trait DownloadProgress: Send + Sync {
    /// Called before a batch is started.
    fn on_batch_start(&self, _batch: usize, _total_batches: usize, _size: usize) {}

    /// Called after a single fetch of one URL variant failed.
    fn on_attempt_failed(
        &self,
        _task: &DownloadTask,
        _url: &str,
        _attempt: u32,
        _max_attempts: u32,
        _failure: &FetchFailure,
    ) {
    }

    /// Called when an asset was written to `path`.
    fn on_asset_complete(&self, _task: &DownloadTask, _path: &Path, _bytes: u64) {}

    /// Called when an asset exhausted every attempt.
    fn on_asset_failed(&self, _task: &DownloadTask) {}

    /// Called once every task of a batch has finished.
    fn on_batch_complete(&self, _batch: usize) {}
}

/// A null progress implementation that ignores all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl DownloadProgress for NoProgress {}

/// Totals of one [`DownloadEngine::download_all`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadReport {
    /// Assets written to disk.
    pub succeeded: usize,
    /// Bytes written across all saved assets.
    pub bytes: u64,
    /// Assets added to the failed collection, including cancelled ones.
    pub failed: usize,
    /// Batches that were started.
    pub batches: usize,
    /// Tasks never started because the run was cancelled.
    pub cancelled: usize,
}

/// Shared counters of one `download_all` call.
#[derive(Default)]
struct Tally {
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    bytes: AtomicU64,
}

/// Runs download tasks in fixed-size batches with per-asset retry.
///
/// Batches never overlap: the next batch starts only after every task of the
/// current one has either saved its asset or exhausted its attempts.
pub struct DownloadEngine<C: Fetcher = HttpFetcher> {
    fetcher: C,
    config: DownloadConfig,
}

impl<C: Fetcher> DownloadEngine<C> {
    /// Creates an engine around `fetcher`.
    #[must_use]
    pub const fn new(fetcher: C, config: DownloadConfig) -> Self {
        Self { fetcher, config }
    }

    /// Returns a reference to the underlying fetcher.
    #[must_use]
    pub const fn fetcher(&self) -> &C {
        &self.fetcher
    }

    /// Fetches one asset, alternating between its URL variants.
    ///
    /// Each of the `max_retries` attempts tries the primary URL, then the
    /// fallback URL, pausing `retry_interval` after every failed fetch.
    /// Returns the number of bytes written, or `None` once every attempt on
    /// both variants has failed.
    pub async fn fetch_with_retry(
        &self,
        task: &DownloadTask,
        progress: &dyn DownloadProgress,
    ) -> Option<u64> {
        let max_attempts = self.config.max_retries.max(1);
        let variants = [
            (task.primary_url.as_str(), task.primary_path.as_path()),
            (task.fallback_url.as_str(), task.fallback_path.as_path()),
        ];

        for attempt in 1..=max_attempts {
            for (url, path) in variants {
                match self.fetcher.fetch(url, path).await {
                    FetchOutcome::Saved { bytes } => {
                        progress.on_asset_complete(task, path, bytes);
                        return Some(bytes);
                    }
                    FetchOutcome::Failed(failure) => {
                        log::debug!(
                            "{} attempt {attempt}/{max_attempts} via {url}: {failure}",
                            task.key()
                        );
                        progress.on_attempt_failed(task, url, attempt, max_attempts, &failure);
                        if !self.config.retry_interval.is_zero() {
                            tokio::time::sleep(self.config.retry_interval).await;
                        }
                    }
                }
            }
        }

        log::error!(
            "Giving up on {} after {max_attempts} attempts on each variant",
            task.key()
        );
        progress.on_asset_failed(task);
        None
    }

    /// Downloads `tasks` in batches of `max_concurrency`.
    ///
    /// Failed assets are appended to the context's failed collection. When
    /// `cancel` fires, the running batch drains and the remaining tasks are
    /// recorded as failed so they can be re-driven.
    pub async fn download_all(
        &self,
        tasks: &[DownloadTask],
        ctx: &RunContext,
        progress: &dyn DownloadProgress,
        cancel: Option<&CancellationToken>,
    ) -> DownloadReport {
        let batch_size = self.config.max_concurrency.max(1);
        let total_batches = tasks.len().div_ceil(batch_size);
        let tally = Tally::default();
        let mut report = DownloadReport::default();

        for (index, batch) in tasks.chunks(batch_size).enumerate() {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                let remaining = &tasks[index * batch_size..];
                log::warn!("Cancelled; {} asset(s) not started", remaining.len());
                for task in remaining {
                    ctx.add_failed_asset(task.to_failure());
                }
                report.cancelled = remaining.len();
                tally.failed.fetch_add(remaining.len(), Ordering::Relaxed);
                break;
            }

            let number = index + 1;
            log::info!(
                "Batch {number}/{total_batches}: {} asset(s)",
                batch.len()
            );
            progress.on_batch_start(number, total_batches, batch.len());
            report.batches += 1;

            let jobs: Vec<_> = batch
                .iter()
                .map(|task| self.run_task(task, ctx, progress, &tally))
                .collect();
            join_all(jobs).await;

            progress.on_batch_complete(number);
        }

        report.succeeded = tally.succeeded.load(Ordering::Relaxed);
        report.failed = tally.failed.load(Ordering::Relaxed);
        report.bytes = tally.bytes.load(Ordering::Relaxed);
        report
    }

    async fn run_task(
        &self,
        task: &DownloadTask,
        ctx: &RunContext,
        progress: &dyn DownloadProgress,
        tally: &Tally,
    ) {
        if let Some(written) = self.fetch_with_retry(task, progress).await {
            tally.succeeded.fetch_add(1, Ordering::Relaxed);
            tally.bytes.fetch_add(written, Ordering::Relaxed);
        } else {
            tally.failed.fetch_add(1, Ordering::Relaxed);
            ctx.add_failed_asset(task.to_failure());
        }
    }
}
