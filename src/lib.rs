//! illust-dl - harvests an author's catalog and downloads every asset.
//!
//! The library pages through an author's catalog, derives one download task
//! per asset, fetches the tasks in bounded batches with retry across the
//! `.jpg` and `.png` variants, and lets an operator re-drive whatever failed.
//! The terminal front end lives behind the `cli` feature.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//!
//! use illust_dl::{
//!     AjaxCatalogReader, AppConfig, DownloadEngine, FixedAnswer, Harvester, HttpFetcher,
//!     Pipeline, Session,
//! };
//!
//! # async fn example() -> illust_dl::Result<()> {
//! let config = AppConfig::default();
//! let session = Session::load(Path::new("cookie.json"))?;
//!
//! let reader = AjaxCatalogReader::new(
//!     &session,
//!     &config.download.user_agent,
//!     config.catalog.page_timeout,
//!     config.catalog.page_size,
//! )?;
//! let harvester = Harvester::new(reader, config.catalog.clone(), config.download.asset_host.clone());
//! let engine = DownloadEngine::new(HttpFetcher::new(&config.download)?, config.download.clone());
//!
//! // Never re-drive failures.
//! let prompt = FixedAnswer(false);
//! let summary = Pipeline::new(harvester, engine, &prompt)
//!     .run("123456", &config.paths.base_dir)
//!     .await?;
//! println!("Downloaded {} of {} asset(s)", summary.downloaded, summary.planned);
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod catalog;
pub mod config;
pub mod context;
pub mod download;
pub mod error;
pub mod fetch;
pub mod fs;
pub mod harvest;
pub mod item;
pub mod partition;
pub mod pipeline;
pub mod recovery;
pub mod sanitize;
pub mod session;
pub mod summary;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export main types for convenience
pub use catalog::{AjaxCatalogReader, CatalogReader, CatalogRecord, PageResult};
pub use config::{AppConfig, CatalogConfig, DownloadConfig, PathConfig};
pub use context::RunContext;
pub use download::{DownloadEngine, DownloadProgress, DownloadReport, NoProgress};
pub use error::{Error, Result};
pub use fetch::{FetchFailure, FetchOutcome, Fetcher, HttpFetcher};
pub use fs::{FileSystem, TokioFileSystem};
pub use harvest::{Harvest, Harvester, ItemOutcome, PageStop, SkipReason};
pub use item::{AssetFormat, AssetKey, DownloadTask, FailedAsset, Item};
pub use partition::partition;
pub use pipeline::Pipeline;
pub use recovery::{FailureKind, FixedAnswer, OperatorPrompt, RecoveryLoop, RecoveryRound};
pub use sanitize::sanitize;
pub use session::Session;
pub use summary::{RunSummary, format_bytes, format_duration};
