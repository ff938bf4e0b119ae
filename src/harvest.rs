//! Catalog harvesting: paging, item extraction and task synthesis.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use futures::{StreamExt, stream};
use regex::Regex;
use tokio_util::sync::CancellationToken;

use crate::catalog::{CatalogReader, CatalogRecord};
use crate::config::CatalogConfig;
use crate::context::RunContext;
use crate::error::{Error, Result};
use crate::fs::{FileSystem, TokioFileSystem};
use crate::item::{DownloadTask, Item};
use crate::partition::partition;
use crate::sanitize::sanitize;

/// `#tag Title - Author`: the title sits between the first tag and the dash.
static TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^#.*?\s+(.*?)\s*-\s*.*").expect("valid regex"));

/// Date-and-id shaped path of the first asset, e.g. `2023/05/01/12/00/00/42_p0`.
static SEQUENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"/(\d{4}/\d{2}/\d{2}/\d{2}/\d{2}/\d{2}/\d+_p0)").expect("valid regex")
});

/// Why a record was skipped rather than turned into an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The record carries no identifier.
    MissingId,
    /// The listed work is hidden, deleted or could not be read.
    Unavailable,
    /// The thumbnail has no asset path template (animated or unsupported post).
    NoSequencePath,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingId => f.write_str("record has no id"),
            Self::Unavailable => f.write_str("work is hidden, deleted or unreadable"),
            Self::NoSequencePath => {
                f.write_str("no asset path in thumbnail (animated or unsupported format)")
            }
        }
    }
}

/// Result of turning one catalog record into an item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The item and its still-missing assets.
    Ready(Item),
    /// The record can never be processed; not retried.
    Skip { id: String, reason: SkipReason },
    /// Processing hit a transient error; eligible for recovery.
    Failed { id: String, reason: String },
}

/// Why paging stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageStop {
    /// The last page was reached normally.
    Exhausted { page: u32 },
    /// A page was not ready in time; later pages were not read.
    Timeout { page: u32 },
    /// A page could not be read; later pages were not read.
    Failed { page: u32, message: String },
    /// The run was cancelled before this page was requested.
    Cancelled { page: u32 },
}

impl fmt::Display for PageStop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exhausted { page } => write!(f, "last page {page} reached"),
            Self::Timeout { page } => write!(f, "page {page} timed out"),
            Self::Failed { page, message } => write!(f, "page {page} failed: {message}"),
            Self::Cancelled { page } => write!(f, "cancelled before page {page}"),
        }
    }
}

impl PageStop {
    /// Returns `true` if paging ended before the catalog was exhausted.
    #[must_use]
    pub const fn is_partial(&self) -> bool {
        !matches!(self, Self::Exhausted { .. })
    }
}

/// Items extracted from a set of records.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    /// Ready items, in record order.
    pub items: Vec<Item>,
    /// Ids of skipped records, in record order.
    pub skipped: Vec<String>,
}

/// Everything a harvest produced.
#[derive(Debug, Clone)]
pub struct Harvest {
    /// Ready items in page-traversal order.
    pub items: Vec<Item>,
    /// Ids of skipped records.
    pub skipped: Vec<String>,
    /// Raw records of every page read, kept for re-extraction.
    pub records: Vec<CatalogRecord>,
    /// Why paging stopped.
    pub stop: PageStop,
}

/// Extracts the display title from a combined label, unsanitized.
#[must_use]
pub fn extract_title(label: &str, id: &str) -> String {
    TITLE_RE
        .captures(label)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| format!("Untitled_{id}"), |m| m.as_str().to_string())
}

/// Extracts the first-asset path template from a thumbnail URL.
#[must_use]
pub fn extract_sequence_path(thumbnail_url: &str) -> Option<&str> {
    SEQUENCE_RE
        .captures(thumbnail_url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Walks catalog pages and derives download tasks for every item.
pub struct Harvester<R: CatalogReader, F: FileSystem = TokioFileSystem> {
    reader: R,
    fs: F,
    config: CatalogConfig,
    asset_host: String,
    cancel: Option<CancellationToken>,
}

impl<R: CatalogReader> Harvester<R, TokioFileSystem> {
    /// Creates a harvester that checks the real file system.
    #[must_use]
    pub fn new(reader: R, config: CatalogConfig, asset_host: impl Into<String>) -> Self {
        Self::with_fs(reader, config, asset_host, TokioFileSystem)
    }
}

impl<R: CatalogReader, F: FileSystem> Harvester<R, F> {
    /// Creates a harvester with a custom file system implementation.
    #[must_use]
    pub fn with_fs(reader: R, config: CatalogConfig, asset_host: impl Into<String>, fs: F) -> Self {
        Self {
            reader,
            fs,
            config,
            asset_host: asset_host.into(),
            cancel: None,
        }
    }

    /// Stops paging at the next page boundary once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled)
    }

    /// Waits out the pause between pages; `false` if cancelled meanwhile.
    async fn page_pause(&self) -> bool {
        let delay = self.config.page_delay;
        match &self.cancel {
            Some(token) => tokio::select! {
                () = token.cancelled() => false,
                () = tokio::time::sleep(delay) => true,
            },
            None => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                true
            }
        }
    }

    /// Resolves the author and creates `<base_dir>/<name>_<id>`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Identity`] if the author cannot be resolved within the
    /// page timeout, or an I/O error if the directory cannot be created.
    pub async fn resolve_output_dir(&self, catalog_id: &str, base_dir: &Path) -> Result<PathBuf> {
        let name = tokio::time::timeout(
            self.config.page_timeout,
            self.reader.author_name(catalog_id),
        )
        .await
        .map_err(|_| Error::Identity(format!("author {catalog_id} did not load in time")))?
        .map_err(|e| match e {
            Error::Identity(_) => e,
            other => Error::Identity(other.to_string()),
        })?;

        let dir = base_dir.join(sanitize(&format!("{}_{catalog_id}", name.trim())));
        self.fs.create_dir_all(&dir).await?;
        log::info!("Author {name} -> {}", dir.display());
        Ok(dir)
    }

    /// Reads pages sequentially until a short or final page, a page error or
    /// cancellation.
    pub async fn collect_records(&self, catalog_id: &str) -> (Vec<CatalogRecord>, PageStop) {
        let mut records = Vec::new();
        let mut page: u32 = 1;

        let stop = loop {
            if self.is_cancelled() {
                log::warn!("Cancelled before page {page}; keeping {} record(s)", records.len());
                break PageStop::Cancelled { page };
            }
            let fetched =
                tokio::time::timeout(self.config.page_timeout, self.reader.page(catalog_id, page))
                    .await;
            let result = match fetched {
                Err(_) | Ok(Err(Error::PageTimeout { .. })) => {
                    log::warn!("Page {page} did not load in time; keeping {} record(s)", records.len());
                    break PageStop::Timeout { page };
                }
                Ok(Err(e)) => {
                    log::warn!("Page {page} failed: {e}; keeping {} record(s)", records.len());
                    break PageStop::Failed {
                        page,
                        message: e.to_string(),
                    };
                }
                Ok(Ok(result)) => result,
            };

            let count = result.records.len();
            log::info!("Page {page}: {count} record(s)");
            records.extend(result.records);

            if result.is_last_page || count < self.config.page_size {
                break PageStop::Exhausted { page };
            }

            page += 1;
            if !self.page_pause().await {
                log::warn!("Cancelled before page {page}; keeping {} record(s)", records.len());
                break PageStop::Cancelled { page };
            }
        };

        (records, stop)
    }

    /// Turns one record into an item, dropping assets already on disk.
    pub async fn extract_item(
        &self,
        record: &CatalogRecord,
        output_dir: &Path,
        ctx: &RunContext,
    ) -> ItemOutcome {
        let id = record.id.trim();
        if id.is_empty() {
            return ItemOutcome::Skip {
                id: String::new(),
                reason: SkipReason::MissingId,
            };
        }
        if record.is_unavailable() {
            return ItemOutcome::Skip {
                id: id.to_string(),
                reason: SkipReason::Unavailable,
            };
        }

        let raw_title = extract_title(&record.label, id);
        let title = sanitize(&raw_title);
        if title != raw_title {
            log::info!("Sanitized title: {raw_title} -> {title}");
        }

        let asset_count = record.asset_count.filter(|&c| c > 0).unwrap_or(1);

        let Some(base_path) = extract_sequence_path(&record.thumbnail_url) else {
            return ItemOutcome::Skip {
                id: id.to_string(),
                reason: SkipReason::NoSequencePath,
            };
        };

        let mut asset_tasks = Vec::with_capacity(asset_count as usize);
        for index in 0..asset_count {
            let task = DownloadTask::new(id, index, &title, base_path, &self.asset_host, output_dir);
            match self.already_present(&task).await {
                Ok(true) => {
                    log::debug!("Already present, skipping: {}", task.path_stem().display());
                }
                Ok(false) => asset_tasks.push(task),
                Err(e) => {
                    return ItemOutcome::Failed {
                        id: id.to_string(),
                        reason: format!("checking {}: {e}", task.path_stem().display()),
                    };
                }
            }
        }

        ctx.record_asset_count(id, asset_count);

        ItemOutcome::Ready(Item {
            id: id.to_string(),
            title,
            asset_count,
            sequence_base_path: base_path.to_string(),
            asset_tasks,
        })
    }

    async fn already_present(&self, task: &DownloadTask) -> std::io::Result<bool> {
        Ok(self.fs.file_exists(&task.primary_path).await?
            || self.fs.file_exists(&task.fallback_path).await?)
    }

    /// Extracts items from `records` across at most `max_catalog_workers` chunks.
    ///
    /// Failed items are added to the context's failed set; the output keeps
    /// record order.
    pub async fn extract(
        &self,
        records: &[CatalogRecord],
        output_dir: &Path,
        ctx: &RunContext,
    ) -> Extraction {
        let workers = self.config.max_catalog_workers.max(1);
        let chunks = partition(records, workers);

        let jobs: Vec<_> = chunks
            .into_iter()
            .map(|chunk| self.extract_chunk(chunk, output_dir, ctx))
            .collect();
        let outcomes: Vec<Vec<ItemOutcome>> = stream::iter(jobs).buffered(workers).collect().await;

        let mut extraction = Extraction::default();
        for outcome in outcomes.into_iter().flatten() {
            match outcome {
                ItemOutcome::Ready(item) => extraction.items.push(item),
                ItemOutcome::Skip { id, reason } => {
                    log::warn!("Skipping item {id}: {reason}");
                    extraction.skipped.push(id);
                }
                ItemOutcome::Failed { id, reason } => {
                    log::warn!("Item {id} failed: {reason}");
                    ctx.add_failed_item(&id);
                }
            }
        }
        extraction
    }

    async fn extract_chunk(
        &self,
        chunk: &[CatalogRecord],
        output_dir: &Path,
        ctx: &RunContext,
    ) -> Vec<ItemOutcome> {
        let mut outcomes = Vec::with_capacity(chunk.len());
        for record in chunk {
            outcomes.push(self.extract_item(record, output_dir, ctx).await);
        }
        outcomes
    }

    /// Reads the whole catalog and extracts every item.
    pub async fn harvest(&self, catalog_id: &str, output_dir: &Path, ctx: &RunContext) -> Harvest {
        let (records, stop) = self.collect_records(catalog_id).await;
        let Extraction { items, skipped } = self.extract(&records, output_dir, ctx).await;

        log::info!(
            "Harvested {} item(s) from {} record(s), skipped {}",
            items.len(),
            records.len(),
            skipped.len()
        );
        if !skipped.is_empty() {
            log::info!("Skipped ids: {}", skipped.join(", "));
        }

        Harvest {
            items,
            skipped,
            records,
            stop,
        }
    }
}
