//! Progress bar, operator prompt and summary reporting for the terminal.

use std::path::Path;
use std::time::Duration;

use console::{Term, style};
use indicatif::{ProgressBar, ProgressStyle};

use crate::download::DownloadProgress;
use crate::fetch::FetchFailure;
use crate::item::DownloadTask;
use crate::recovery::{OperatorPrompt, is_affirmative};
use crate::summary::{RunSummary, format_bytes, format_duration};

const SEPARATOR: &str = "────────────────────────────────────────────────────────────";

/// Creates the bar counting finished assets across every batch.
fn make_total_progress_bar() -> ProgressBar {
    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{bar:40.green/white}] {pos}/{len} assets ({elapsed}) {msg}",
        )
        .expect("progress template is valid")
        .progress_chars("━━╌"),
    );
    bar
}

/// Reports download events on a single terminal progress bar.
pub struct BarProgress {
    bar: ProgressBar,
}

impl Default for BarProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl BarProgress {
    #[must_use]
    pub fn new() -> Self {
        let bar = make_total_progress_bar();
        bar.enable_steady_tick(Duration::from_millis(250));
        Self { bar }
    }

    /// Handle used to hide the bar while the operator is prompted.
    #[must_use]
    pub fn bar(&self) -> ProgressBar {
        self.bar.clone()
    }

    pub fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl DownloadProgress for BarProgress {
    fn on_batch_start(&self, batch: usize, total_batches: usize, size: usize) {
        self.bar.inc_length(size as u64);
        self.bar.set_message(format!("batch {batch}/{total_batches}"));
    }

    fn on_attempt_failed(
        &self,
        task: &DownloadTask,
        _url: &str,
        attempt: u32,
        max_attempts: u32,
        failure: &FetchFailure,
    ) {
        log::debug!("{} attempt {attempt}/{max_attempts}: {failure}", task.key());
    }

    fn on_asset_complete(&self, _task: &DownloadTask, path: &Path, bytes: u64) {
        self.bar.inc(1);
        let name = path.file_name().map_or_else(
            || path.display().to_string(),
            |n| n.to_string_lossy().into_owned(),
        );
        self.bar
            .println(format!("  {} {name} ({})", style("✓").green(), format_bytes(bytes)));
    }

    fn on_asset_failed(&self, task: &DownloadTask) {
        self.bar.inc(1);
        self.bar
            .println(format!("  {} {}", style("✗").red(), task.path_stem().display()));
    }
}

/// Asks the operator on the terminal; only `y`/`yes` approves.
pub struct ConsolePrompt {
    term: Term,
    bar: ProgressBar,
}

impl ConsolePrompt {
    #[must_use]
    pub fn new(bar: ProgressBar) -> Self {
        Self {
            term: Term::stdout(),
            bar,
        }
    }
}

impl OperatorPrompt for ConsolePrompt {
    fn confirm(&self, question: &str) -> bool {
        self.bar.suspend(|| {
            if self.term.write_line(question).is_err() {
                return false;
            }
            // A closed stdin counts as "no".
            self.term
                .read_line()
                .is_ok_and(|answer| is_affirmative(&answer))
        })
    }
}

/// Prints the end-of-run report.
pub fn print_summary(summary: &RunSummary) {
    println!("\n{SEPARATOR}");
    println!("Run Summary: {}", summary.output_dir.display());
    println!("{SEPARATOR}");

    for item in &summary.items {
        let declared = item
            .declared
            .map_or_else(|| "?".to_string(), |n| n.to_string());
        println!("  {} {} ({declared} asset(s))", item.id, item.title);
    }
    if !summary.items.is_empty() {
        println!("{SEPARATOR}");
    }

    println!("  Items:             {}", summary.total_items());
    println!("  Declared assets:   {}", summary.total_assets);
    println!("  Planned:           {}", summary.planned);
    println!("  Downloaded:        {}", summary.downloaded);
    println!("  Total size:        {}", format_bytes(summary.bytes));
    println!("  Total time:        {}", format_duration(summary.elapsed));
    if summary.downloaded > 0 {
        println!(
            "  Average speed:     {}/s",
            format_bytes(summary.average_speed())
        );
    }

    if !summary.skipped.is_empty() {
        println!("  Skipped:           {}", summary.skipped.join(", "));
    }
    if summary.stop.is_partial() {
        println!("  {}", style(format!("Paging stopped early: {}", summary.stop)).yellow());
    }
    if !summary.failed_items.is_empty() {
        println!(
            "  {} {}",
            style("Failed items:     ").red(),
            summary.failed_items.join(", ")
        );
    }
    if !summary.failed_assets.is_empty() {
        let listed: Vec<String> = summary
            .failed_assets
            .iter()
            .map(ToString::to_string)
            .collect();
        println!(
            "  {} {}",
            style("Failed assets:    ").red(),
            listed.join(", ")
        );
    }
    if summary.is_complete() {
        println!("  {}", style("All assets are on disk.").green());
    }

    println!("{SEPARATOR}");
}
