//! One complete run: harvest, recover, download, recover, summarize.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogReader, CatalogRecord};
use crate::context::RunContext;
use crate::download::{DownloadEngine, DownloadProgress, NoProgress};
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::fs::FileSystem;
use crate::harvest::{Extraction, Harvest, Harvester};
use crate::item::{AssetKey, DownloadTask, FailedAsset, Item};
use crate::recovery::{FailureKind, OperatorPrompt, RecoveryLoop, RecoveryRound};
use crate::summary::{RunSummary, RunTotals};

/// Wires the harvester, download engine and recovery loops together.
pub struct Pipeline<'a, R: CatalogReader, F: FileSystem, C: Fetcher> {
    harvester: Harvester<R, F>,
    engine: DownloadEngine<C>,
    prompt: &'a dyn OperatorPrompt,
    progress: &'a dyn DownloadProgress,
    cancel: Option<CancellationToken>,
    max_recovery_rounds: Option<usize>,
}

impl<'a, R: CatalogReader, F: FileSystem, C: Fetcher> Pipeline<'a, R, F, C> {
    /// Creates a pipeline that asks `prompt` before every recovery round.
    #[must_use]
    pub fn new(
        harvester: Harvester<R, F>,
        engine: DownloadEngine<C>,
        prompt: &'a dyn OperatorPrompt,
    ) -> Self {
        Self {
            harvester,
            engine,
            prompt,
            progress: &NoProgress,
            cancel: None,
            max_recovery_rounds: None,
        }
    }

    /// Sets the observer notified of download events.
    #[must_use]
    pub fn with_progress(mut self, progress: &'a dyn DownloadProgress) -> Self {
        self.progress = progress;
        self
    }

    /// Sets the token that stops paging, further batches and recovery rounds.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.harvester = self.harvester.with_cancellation(token.clone());
        self.cancel = Some(token);
        self
    }

    /// Caps each recovery loop at `rounds` rounds.
    #[must_use]
    pub const fn with_max_recovery_rounds(mut self, rounds: Option<usize>) -> Self {
        self.max_recovery_rounds = rounds;
        self
    }

    /// Runs every phase for the author `catalog_id`, writing under `base_dir`.
    ///
    /// # Errors
    ///
    /// Returns an error only for fatal setup conditions: the author cannot be
    /// resolved or the output directory cannot be created. Page, item and
    /// asset failures are reported in the summary.
    pub async fn run(&self, catalog_id: &str, base_dir: &Path) -> Result<RunSummary> {
        let started = Instant::now();
        let ctx = RunContext::new();

        let output_dir = self.harvester.resolve_output_dir(catalog_id, base_dir).await?;
        let Harvest {
            mut items,
            mut skipped,
            records,
            stop,
        } = self.harvester.harvest(catalog_id, &output_dir, &ctx).await;

        let mut catalog_round = CatalogRecovery {
            harvester: &self.harvester,
            records: &records,
            output_dir: &output_dir,
            ctx: &ctx,
            items: &mut items,
            skipped: &mut skipped,
            cancel: self.cancel.as_ref(),
        };
        let outcome = RecoveryLoop::new(FailureKind::CatalogItems, self.prompt)
            .with_max_rounds(self.max_recovery_rounds)
            .run(ctx.take_failed_items(), &mut catalog_round)
            .await;
        ctx.set_failed_items(outcome.residual);
        sort_by_record_order(&mut items, &records);

        let tasks = unique_tasks(&items);
        log::info!("{} asset(s) to download", tasks.len());
        let report = self
            .engine
            .download_all(&tasks, &ctx, self.progress, self.cancel.as_ref())
            .await;
        log::info!(
            "Downloaded {} of {} asset(s), {} failed",
            report.succeeded,
            tasks.len(),
            report.failed
        );

        let mut download_round = DownloadRecovery {
            engine: &self.engine,
            tasks: tasks.iter().map(|task| (task.key(), task)).collect(),
            ctx: &ctx,
            progress: self.progress,
            cancel: self.cancel.as_ref(),
            succeeded: report.succeeded,
            bytes: report.bytes,
        };
        let outcome = RecoveryLoop::new(FailureKind::Downloads, self.prompt)
            .with_max_rounds(self.max_recovery_rounds)
            .run(ctx.take_failed_assets(), &mut download_round)
            .await;
        ctx.set_failed_assets(outcome.residual);

        let totals = RunTotals {
            planned: tasks.len(),
            downloaded: download_round.succeeded,
            bytes: download_round.bytes,
            elapsed: started.elapsed(),
        };
        Ok(RunSummary::new(output_dir, &items, skipped, stop, &ctx, totals))
    }
}

/// Flattens the items' tasks, keeping the first task per `(item_id, asset_index)`.
fn unique_tasks(items: &[Item]) -> Vec<DownloadTask> {
    let mut seen = HashSet::new();
    items
        .iter()
        .flat_map(|item| &item.asset_tasks)
        .filter(|task| seen.insert(task.key()))
        .cloned()
        .collect()
}

fn sort_by_record_order(items: &mut [Item], records: &[CatalogRecord]) {
    let position: HashMap<&str, usize> = records
        .iter()
        .enumerate()
        .rev()
        .map(|(i, record)| (record.id.trim(), i))
        .collect();
    items.sort_by_key(|item| position.get(item.id.as_str()).copied().unwrap_or(usize::MAX));
}

/// Re-extracts exactly the records whose items failed.
struct CatalogRecovery<'r, R: CatalogReader, F: FileSystem> {
    harvester: &'r Harvester<R, F>,
    records: &'r [CatalogRecord],
    output_dir: &'r Path,
    ctx: &'r RunContext,
    items: &'r mut Vec<Item>,
    skipped: &'r mut Vec<String>,
    cancel: Option<&'r CancellationToken>,
}

#[async_trait]
impl<'r, R: CatalogReader, F: FileSystem> RecoveryRound<String> for CatalogRecovery<'r, R, F> {
    async fn retry(&mut self, failed: Vec<String>) -> Vec<String> {
        let wanted: HashSet<&str> = failed.iter().map(String::as_str).collect();
        let retry: Vec<CatalogRecord> = self
            .records
            .iter()
            .filter(|record| wanted.contains(record.id.trim()))
            .cloned()
            .collect();

        let Extraction { items, skipped } =
            self.harvester.extract(&retry, self.output_dir, self.ctx).await;
        log::info!("Recovered {} item(s)", items.len());
        self.items.extend(items);
        self.skipped.extend(skipped);
        self.ctx.take_failed_items()
    }

    fn can_continue(&self) -> bool {
        !self.cancel.is_some_and(CancellationToken::is_cancelled)
    }
}

/// Re-submits failed assets through the engine.
struct DownloadRecovery<'r, C: Fetcher> {
    engine: &'r DownloadEngine<C>,
    tasks: HashMap<AssetKey, &'r DownloadTask>,
    ctx: &'r RunContext,
    progress: &'r dyn DownloadProgress,
    cancel: Option<&'r CancellationToken>,
    succeeded: usize,
    bytes: u64,
}

#[async_trait]
impl<'r, C: Fetcher> RecoveryRound<FailedAsset> for DownloadRecovery<'r, C> {
    async fn retry(&mut self, failed: Vec<FailedAsset>) -> Vec<FailedAsset> {
        let mut unresolved = Vec::new();
        let mut tasks = Vec::with_capacity(failed.len());
        for record in failed {
            match self.tasks.get(&record.key()) {
                Some(task) => tasks.push((*task).clone()),
                None => {
                    log::warn!("No task found for {record}; keeping it as failed");
                    unresolved.push(record);
                }
            }
        }

        let report = self
            .engine
            .download_all(&tasks, self.ctx, self.progress, self.cancel)
            .await;
        self.succeeded += report.succeeded;
        self.bytes += report.bytes;

        let mut residual = self.ctx.take_failed_assets();
        residual.extend(unresolved);
        residual
    }

    fn can_continue(&self) -> bool {
        !self.cancel.is_some_and(CancellationToken::is_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::config::{CatalogConfig, DownloadConfig};
    use crate::fetch::{FetchFailure, FetchOutcome};
    use crate::harvest::PageStop;
    use crate::harvest::tests::{HOST, MockFileSystem, StubReader, record, thumb};
    use crate::recovery::FixedAnswer;

    /// Fails the first `failures` fetches of every URL, then saves 10 bytes.
    struct FlakyFetcher {
        failures: usize,
        seen: Mutex<HashMap<String, usize>>,
        calls: AtomicUsize,
        /// Cancelled on the first fetch.
        cancel_on_fetch: Option<CancellationToken>,
    }

    impl FlakyFetcher {
        fn new(failures: usize) -> Self {
            Self {
                failures,
                seen: Mutex::new(HashMap::new()),
                calls: AtomicUsize::new(0),
                cancel_on_fetch: None,
            }
        }
    }

    #[async_trait]
    impl Fetcher for FlakyFetcher {
        async fn fetch(&self, url: &str, _path: &Path) -> FetchOutcome {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(token) = &self.cancel_on_fetch {
                token.cancel();
            }
            let mut seen = self.seen.lock().unwrap();
            let count = seen.entry(url.to_string()).or_default();
            *count += 1;
            if *count > self.failures {
                FetchOutcome::Saved { bytes: 10 }
            } else {
                FetchOutcome::Failed(FetchFailure::Status(503))
            }
        }
    }

    fn pipeline<'a>(
        reader: StubReader,
        fs: MockFileSystem,
        fetcher: FlakyFetcher,
        prompt: &'a dyn OperatorPrompt,
    ) -> Pipeline<'a, StubReader, MockFileSystem, FlakyFetcher> {
        let catalog = CatalogConfig::new()
            .with_page_size(18)
            .with_page_delay(std::time::Duration::ZERO);
        let download = DownloadConfig::new()
            .with_retry_interval(std::time::Duration::ZERO)
            .with_max_retries(1);
        Pipeline::new(
            Harvester::with_fs(reader, catalog, HOST, fs),
            DownloadEngine::new(fetcher, download),
            prompt,
        )
    }

    #[tokio::test]
    async fn one_page_two_items_end_to_end() {
        let reader = StubReader::new(vec![vec![
            record("10", "#t Sky - Ann", &thumb("10"), Some(3)),
            record("11", "#t Anim - Ann", "https://x/img-master/ugoira/11_square1200.jpg", None),
        ]]);
        let prompt = FixedAnswer(false);
        let p = pipeline(reader, MockFileSystem::default(), FlakyFetcher::new(0), &prompt);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        assert_eq!(summary.output_dir, PathBuf::from("/base/Ann___7"));
        assert_eq!(summary.skipped, vec!["11"]);
        assert_eq!(summary.total_items(), 1);
        assert_eq!(summary.items[0].declared, Some(3));
        assert_eq!(summary.total_assets, 3);
        assert_eq!(summary.planned, 3);
        assert_eq!(summary.downloaded, 3);
        assert_eq!(summary.bytes, 30);
        assert_eq!(summary.stop, PageStop::Exhausted { page: 1 });
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn existing_assets_are_not_planned() {
        let reader = StubReader::new(vec![vec![record("10", "#t Sky - Ann", &thumb("10"), Some(2))]]);
        let fs = MockFileSystem::default();
        fs.add_file("/base/Ann___7/Sky_10.png");
        fs.add_file("/base/Ann___7/Sky_10_p1.jpg");
        let prompt = FixedAnswer(false);
        let fetcher = FlakyFetcher::new(0);
        let p = pipeline(reader, fs, fetcher, &prompt);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        assert_eq!(summary.planned, 0);
        assert_eq!(summary.downloaded, 0);
        assert_eq!(summary.total_assets, 2);
        assert_eq!(p.engine_calls(), 0);
    }

    #[tokio::test]
    async fn approved_download_recovery_converges() {
        let reader = StubReader::new(vec![vec![record("10", "#t Sky - Ann", &thumb("10"), Some(2))]]);
        let prompt = FixedAnswer(true);
        // Every URL fails twice: the first pass and round one fail, round two succeeds.
        let p = pipeline(reader, MockFileSystem::default(), FlakyFetcher::new(2), &prompt);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        assert!(summary.failed_assets.is_empty());
        assert_eq!(summary.downloaded, 2);
        assert!(summary.is_complete());
    }

    #[tokio::test]
    async fn declined_download_recovery_keeps_residual() {
        let reader = StubReader::new(vec![vec![record("10", "#t Sky - Ann", &thumb("10"), Some(2))]]);
        let prompt = FixedAnswer(false);
        let p = pipeline(reader, MockFileSystem::default(), FlakyFetcher::new(usize::MAX), &prompt);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        let failed: Vec<String> = summary.failed_assets.iter().map(ToString::to_string).collect();
        assert_eq!(failed, vec!["10_p0", "10_p1"]);
        assert_eq!(summary.downloaded, 0);
        assert!(!summary.is_complete());
    }

    #[tokio::test]
    async fn approved_catalog_recovery_restores_item_in_order() {
        let reader = StubReader::new(vec![vec![
            record("10", "#t Sky - Ann", &thumb("10"), None),
            record("11", "#t Sea - Ann", &thumb("11"), None),
        ]]);
        let fs = MockFileSystem::default();
        fs.break_path("/base/Ann___7/Sky_10.jpg", 1);
        let prompt = FixedAnswer(true);
        let p = pipeline(reader, fs, FlakyFetcher::new(0), &prompt);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        let ids: Vec<&str> = summary.items.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "11"]);
        assert!(summary.failed_items.is_empty());
        assert_eq!(summary.downloaded, 2);
    }

    #[tokio::test]
    async fn declined_catalog_recovery_reports_failed_item() {
        let reader = StubReader::new(vec![vec![record("10", "#t Sky - Ann", &thumb("10"), None)]]);
        let fs = MockFileSystem::default();
        fs.break_path("/base/Ann___7/Sky_10.jpg", 1);
        let prompt = FixedAnswer(false);
        let p = pipeline(reader, fs, FlakyFetcher::new(0), &prompt);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        assert_eq!(summary.failed_items, vec!["10"]);
        assert_eq!(summary.planned, 0);
    }

    #[tokio::test]
    async fn cancelled_run_reads_no_pages() {
        let reader = StubReader::new(vec![vec![record("10", "#t Sky - Ann", &thumb("10"), Some(2))]]);
        let prompt = FixedAnswer(true);
        let token = CancellationToken::new();
        token.cancel();
        let p = pipeline(reader, MockFileSystem::default(), FlakyFetcher::new(0), &prompt)
            .with_cancellation(token);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        assert_eq!(summary.stop, PageStop::Cancelled { page: 1 });
        assert_eq!(summary.planned, 0);
        assert!(!summary.is_complete());
        assert_eq!(p.engine_calls(), 0);
    }

    #[tokio::test]
    async fn cancel_during_downloads_skips_download_recovery() {
        let reader = StubReader::new(vec![vec![record("10", "#t Sky - Ann", &thumb("10"), Some(2))]]);
        let prompt = FixedAnswer(true);
        let token = CancellationToken::new();
        let mut fetcher = FlakyFetcher::new(usize::MAX);
        fetcher.cancel_on_fetch = Some(token.clone());
        let p = pipeline(reader, MockFileSystem::default(), fetcher, &prompt)
            .with_cancellation(token);

        let summary = p.run("7", Path::new("/base")).await.unwrap();

        // The running batch drains: two assets, one attempt on each variant.
        assert_eq!(p.engine_calls(), 4);
        assert_eq!(summary.failed_assets.len(), 2);
        assert_eq!(summary.stop, PageStop::Exhausted { page: 1 });
    }

    #[test]
    fn duplicate_tasks_are_submitted_once() {
        let task = DownloadTask::new("1", 0, "T", "2023/01/01/00/00/00/1_p0", HOST, Path::new("/o"));
        let item = Item {
            id: "1".into(),
            title: "T".into(),
            asset_count: 1,
            sequence_base_path: "2023/01/01/00/00/00/1_p0".into(),
            asset_tasks: vec![task],
        };
        assert_eq!(unique_tasks(&[item.clone(), item]).len(), 1);
    }

    impl Pipeline<'_, StubReader, MockFileSystem, FlakyFetcher> {
        fn engine_calls(&self) -> usize {
            self.engine.fetcher().calls.load(Ordering::SeqCst)
        }
    }
}
