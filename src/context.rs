//! Shared state of one harvest-and-download run.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::item::FailedAsset;

/// Counters and failure collections shared by the concurrent phases of a run.
///
/// Each collection has its own lock; no operation needs more than one.
#[derive(Debug, Default)]
pub struct RunContext {
    asset_counts: Mutex<HashMap<String, u32>>,
    failed_items: Mutex<BTreeSet<String>>,
    failed_assets: Mutex<Vec<FailedAsset>>,
}

// Every mutation is a single insert or push, so a poisoned lock still guards
// consistent data.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RunContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the declared asset count of an item. Later writes are ignored.
    pub fn record_asset_count(&self, item_id: &str, count: u32) {
        lock(&self.asset_counts)
            .entry(item_id.to_string())
            .or_insert(count);
    }

    /// Declared asset count of an item, if recorded.
    #[must_use]
    pub fn asset_count(&self, item_id: &str) -> Option<u32> {
        lock(&self.asset_counts).get(item_id).copied()
    }

    /// Sum of all recorded asset counts.
    #[must_use]
    pub fn total_assets(&self) -> u64 {
        lock(&self.asset_counts)
            .values()
            .map(|&c| u64::from(c))
            .sum()
    }

    /// Marks an item as not processable into tasks.
    pub fn add_failed_item(&self, item_id: &str) {
        lock(&self.failed_items).insert(item_id.to_string());
    }

    /// Removes and returns every failed item id.
    pub fn take_failed_items(&self) -> Vec<String> {
        std::mem::take(&mut *lock(&self.failed_items))
            .into_iter()
            .collect()
    }

    /// Replaces the failed item set.
    pub fn set_failed_items(&self, ids: impl IntoIterator<Item = String>) {
        *lock(&self.failed_items) = ids.into_iter().collect();
    }

    /// Snapshot of the failed item ids, sorted.
    #[must_use]
    pub fn failed_items(&self) -> Vec<String> {
        lock(&self.failed_items).iter().cloned().collect()
    }

    /// Records an asset that exhausted its retries.
    pub fn add_failed_asset(&self, failed: FailedAsset) {
        lock(&self.failed_assets).push(failed);
    }

    /// Removes and returns every failed asset.
    pub fn take_failed_assets(&self) -> Vec<FailedAsset> {
        std::mem::take(&mut *lock(&self.failed_assets))
    }

    /// Replaces the failed asset collection.
    pub fn set_failed_assets(&self, failed: Vec<FailedAsset>) {
        *lock(&self.failed_assets) = failed;
    }

    /// Snapshot of the failed assets.
    #[must_use]
    pub fn failed_assets(&self) -> Vec<FailedAsset> {
        lock(&self.failed_assets).clone()
    }
}
