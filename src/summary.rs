//! End-of-run totals and human-readable formatting.

use std::path::PathBuf;
use std::time::Duration;

use crate::context::RunContext;
use crate::harvest::PageStop;
use crate::item::{FailedAsset, Item};

/// Declared asset count of one harvested item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemCount {
    pub id: String,
    pub title: String,
    /// `None` when no count was ever recorded for the id.
    pub declared: Option<u32>,
}

/// Totals of a whole run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    /// Directory the author's assets were written to.
    pub output_dir: PathBuf,
    /// Per-item counts in page-traversal order.
    pub items: Vec<ItemCount>,
    /// Sum of declared asset counts.
    pub total_assets: u64,
    /// Tasks submitted to the download engine (missing assets at harvest time).
    pub planned: usize,
    /// Assets written during this run, recovery rounds included.
    pub downloaded: usize,
    /// Bytes written during this run.
    pub bytes: u64,
    /// Wall-clock duration of the run.
    pub elapsed: Duration,
    /// Ids skipped as unprocessable.
    pub skipped: Vec<String>,
    /// Items still failing after catalog recovery.
    pub failed_items: Vec<String>,
    /// Assets still failing after download recovery.
    pub failed_assets: Vec<FailedAsset>,
    /// Why catalog paging ended.
    pub stop: PageStop,
}

/// Inputs of a [`RunSummary`] that are not held by the [`RunContext`].
#[derive(Debug, Clone)]
pub struct RunTotals {
    pub planned: usize,
    pub downloaded: usize,
    pub bytes: u64,
    pub elapsed: Duration,
}

impl RunSummary {
    /// Builds the summary from the final items and the run context.
    #[must_use]
    pub fn new(
        output_dir: PathBuf,
        items: &[Item],
        skipped: Vec<String>,
        stop: PageStop,
        ctx: &RunContext,
        totals: RunTotals,
    ) -> Self {
        Self {
            output_dir,
            items: items
                .iter()
                .map(|item| ItemCount {
                    id: item.id.clone(),
                    title: item.title.clone(),
                    declared: ctx.asset_count(&item.id),
                })
                .collect(),
            total_assets: ctx.total_assets(),
            planned: totals.planned,
            downloaded: totals.downloaded,
            bytes: totals.bytes,
            elapsed: totals.elapsed,
            skipped,
            failed_items: ctx.failed_items(),
            failed_assets: ctx.failed_assets(),
            stop,
        }
    }

    /// Number of harvested items.
    #[must_use]
    pub fn total_items(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` when nothing is left failing and paging was not cut short.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.failed_items.is_empty() && self.failed_assets.is_empty() && !self.stop.is_partial()
    }

    /// Returns the average download speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Formats a byte count as a human-readable string (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 3] = ["KB", "MB", "GB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if value < 1024.0 {
            break;
        }
        value /= 1024.0;
        unit = next;
    }
    format!("{value:.2} {unit}")
}

/// Formats a duration as "5.0s", "1m 05s" or "1h 01m 05s".
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    match secs {
        0..60 => format!("{secs}.{:01}s", d.subsec_millis() / 100),
        60..3600 => format!("{}m {:02}s", secs / 60, secs % 60),
        _ => format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60),
    }
}
