//! Catalog items, download tasks and the asset naming scheme.

use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix of the first asset in a sequence path template.
pub const FIRST_ASSET_SUFFIX: &str = "_p0";

/// Encodings an asset may be served in.
///
/// The true format is not visible in catalog metadata, so every asset is
/// tried under both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetFormat {
    Jpg,
    Png,
}

impl AssetFormat {
    /// Order in which the variants are tried: primary first.
    pub const PREFERENCE: [Self; 2] = [Self::Jpg, Self::Png];

    /// File extension without the dot.
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }
}

/// Identifies one asset within a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AssetKey {
    pub item_id: String,
    pub asset_index: u32,
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_p{}", self.item_id, self.asset_index)
    }
}

/// Replaces the trailing `_p0` of a sequence template with `_p<index>`.
#[must_use]
pub fn asset_path(base_path: &str, index: u32) -> String {
    let stem = base_path
        .strip_suffix(FIRST_ASSET_SUFFIX)
        .unwrap_or(base_path);
    format!("{stem}_p{index}")
}

/// Absolute URL of asset `index` in `format` on the mirror `host`.
#[must_use]
pub fn asset_url(host: &str, base_path: &str, index: u32, format: AssetFormat) -> String {
    format!(
        "{}/{}.{}",
        host.trim_end_matches('/'),
        asset_path(base_path, index),
        format.extension()
    )
}

/// File name without extension: `<title>_<id>` for the cover,
/// `<title>_<id>_p<index>` for the rest.
#[must_use]
pub fn asset_file_stem(title: &str, item_id: &str, index: u32) -> String {
    if index == 0 {
        format!("{title}_{item_id}")
    } else {
        format!("{title}_{item_id}_p{index}")
    }
}

/// One asset to fetch, with both URL variants and their target paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    pub item_id: String,
    pub asset_index: u32,
    pub primary_url: String,
    pub fallback_url: String,
    pub primary_path: PathBuf,
    pub fallback_path: PathBuf,
}

impl DownloadTask {
    /// Builds the task for asset `index` of an item.
    #[must_use]
    pub fn new(
        item_id: &str,
        index: u32,
        title: &str,
        base_path: &str,
        host: &str,
        output_dir: &Path,
    ) -> Self {
        let [primary, fallback] = AssetFormat::PREFERENCE;
        // Titles may contain dots, so extensions are appended rather than set.
        let stem = asset_file_stem(title, item_id, index);
        Self {
            item_id: item_id.to_string(),
            asset_index: index,
            primary_url: asset_url(host, base_path, index, primary),
            fallback_url: asset_url(host, base_path, index, fallback),
            primary_path: output_dir.join(format!("{stem}.{}", primary.extension())),
            fallback_path: output_dir.join(format!("{stem}.{}", fallback.extension())),
        }
    }

    /// Key used for deduplication and failure lookup.
    #[must_use]
    pub fn key(&self) -> AssetKey {
        AssetKey {
            item_id: self.item_id.clone(),
            asset_index: self.asset_index,
        }
    }

    /// Target path with the extension removed.
    #[must_use]
    pub fn path_stem(&self) -> PathBuf {
        self.primary_path.with_extension("")
    }

    /// Converts the task into the record kept when it fails.
    #[must_use]
    pub fn to_failure(&self) -> FailedAsset {
        FailedAsset {
            item_id: self.item_id.clone(),
            asset_index: self.asset_index,
            path_stem: self.path_stem(),
        }
    }
}

/// An asset that exhausted its retries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FailedAsset {
    pub item_id: String,
    pub asset_index: u32,
    pub path_stem: PathBuf,
}

impl fmt::Display for FailedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_p{}", self.item_id, self.asset_index)
    }
}

impl FailedAsset {
    /// Key of the task this record was produced from.
    #[must_use]
    pub fn key(&self) -> AssetKey {
        AssetKey {
            item_id: self.item_id.clone(),
            asset_index: self.asset_index,
        }
    }
}

/// One catalog entry and the assets still missing on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub id: String,
    pub title: String,
    pub asset_count: u32,
    /// Template path of the first asset, ending in `_p0`.
    pub sequence_base_path: String,
    pub asset_tasks: Vec<DownloadTask>,
}

impl Item {
    /// Looks up the task for `asset_index`, if it was not already on disk.
    #[must_use]
    pub fn task(&self, asset_index: u32) -> Option<&DownloadTask> {
        self.asset_tasks
            .iter()
            .find(|task| task.asset_index == asset_index)
    }
}
