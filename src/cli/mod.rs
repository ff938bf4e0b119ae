//! CLI mode for illust-dl - downloads one author's catalog from the terminal.

mod progress;

use std::path::PathBuf;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use crate::{
    AjaxCatalogReader, AppConfig, DownloadEngine, Error, FixedAnswer, Harvester, HttpFetcher,
    OperatorPrompt, Pipeline, Session,
};

pub use progress::{BarProgress, ConsolePrompt, print_summary};

/// Recovery rounds allowed per loop when `--yes` approves them unattended.
pub const AUTO_APPROVE_ROUNDS: usize = 3;

/// Command-line arguments.
#[derive(Debug, Parser)]
#[command(name = "illust-dl", version)]
#[command(about = "Download every illustration of a Pixiv author", long_about = None)]
pub struct Args {
    /// Numeric id of the author.
    #[arg(value_parser = parse_author_id)]
    pub author_id: String,

    /// Config file (default: <config dir>/illust-dl/config.toml).
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Directory the author folder is created in.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// File holding the session cookie header string.
    #[arg(long, value_name = "FILE")]
    pub cookies: Option<PathBuf>,

    /// Assets downloaded concurrently per batch.
    #[arg(short = 'j', long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Approve recovery rounds without asking (at most 3 per loop).
    #[arg(short, long, conflicts_with = "no_retry_prompt")]
    pub yes: bool,

    /// Never re-drive failures; report them and exit.
    #[arg(long)]
    pub no_retry_prompt: bool,
}

fn parse_author_id(s: &str) -> Result<String, String> {
    let id = s.trim();
    if !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()) {
        Ok(id.to_string())
    } else {
        Err(format!("'{s}' is not a numeric author id"))
    }
}

impl Args {
    /// Overrides file configuration with the flags that were given.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(dir) = &self.output {
            config.paths.base_dir.clone_from(dir);
        }
        if let Some(file) = &self.cookies {
            config.paths.cookie_file.clone_from(file);
        }
        if let Some(n) = self.concurrency {
            config.download.max_concurrency = n.max(1);
        }
    }
}

/// Runs one download of `args.author_id`.
///
/// # Errors
///
/// Returns an error for fatal setup failures (unreadable config, invalid
/// session cookie, unresolvable author) and [`Error::Cancelled`] after an
/// interrupted run has printed its summary.
pub async fn run(args: Args) -> crate::Result<()> {
    let config_path = args.config.clone().unwrap_or_else(AppConfig::default_path);
    let mut config = AppConfig::load(&config_path)?;
    args.apply(&mut config);

    let session = Session::load(&config.paths.cookie_file)?;
    log::info!(
        "Loaded {} cookie(s) from {}",
        session.len(),
        config.paths.cookie_file.display()
    );

    let reader = AjaxCatalogReader::new(
        &session,
        &config.download.user_agent,
        config.catalog.page_timeout,
        config.catalog.page_size,
    )?;
    let harvester = Harvester::new(
        reader,
        config.catalog.clone(),
        config.download.asset_host.clone(),
    );
    let engine = DownloadEngine::new(HttpFetcher::new(&config.download)?, config.download.clone());

    let progress = BarProgress::new();
    let prompt: Box<dyn OperatorPrompt> = if args.yes {
        Box::new(FixedAnswer(true))
    } else if args.no_retry_prompt {
        Box::new(FixedAnswer(false))
    } else {
        Box::new(ConsolePrompt::new(progress.bar()))
    };

    let token = CancellationToken::new();
    let watcher = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("Interrupted; stopping after the current step");
            watcher.cancel();
        }
    });

    let pipeline = Pipeline::new(harvester, engine, prompt.as_ref())
        .with_progress(&progress)
        .with_cancellation(token.clone())
        .with_max_recovery_rounds(args.yes.then_some(AUTO_APPROVE_ROUNDS));

    let result = pipeline.run(&args.author_id, &config.paths.base_dir).await;
    progress.finish();
    print_summary(&result?);

    if token.is_cancelled() {
        return Err(Error::Cancelled);
    }
    Ok(())
}
