//! Catalog page reading.
//!
//! The harvester only sees the [`CatalogReader`] trait. Readers are driven
//! strictly sequentially: a reader may hold a single authenticated session.

mod ajax;

pub use ajax::AjaxCatalogReader;

use async_trait::async_trait;

use crate::error::Result;

/// One raw entry of a catalog page, before any interpretation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogRecord {
    /// Stable provider identifier.
    pub id: String,
    /// Combined label text, shaped like `#tag Title - Author`.
    pub label: String,
    /// Thumbnail URL; the asset path template is extracted from it.
    pub thumbnail_url: String,
    /// Declared number of assets, when the provider shows one.
    pub asset_count: Option<u32>,
}

impl CatalogRecord {
    /// Placeholder for a listed id whose work could not be read (hidden,
    /// deleted or malformed). It carries no thumbnail and is skipped.
    #[must_use]
    pub fn unavailable(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: String::new(),
            thumbnail_url: String::new(),
            asset_count: None,
        }
    }

    /// Returns `true` if the record has no thumbnail to derive assets from.
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        self.thumbnail_url.trim().is_empty()
    }
}

/// The records of one catalog page.
#[derive(Debug, Clone, Default)]
pub struct PageResult {
    /// Records in provider order.
    pub records: Vec<CatalogRecord>,
    /// Set by readers that know the page is the final one.
    pub is_last_page: bool,
}

/// Source of catalog pages for one author.
#[async_trait]
pub trait CatalogReader: Send + Sync {
    /// Resolves the display name of the catalog owner.
    async fn author_name(&self, catalog_id: &str) -> Result<String>;

    /// Fetches the records on the 1-based `page`.
    ///
    /// Readers return one record per listed id, unreadable ones included, so
    /// a page shorter than the page size is the final page.
    ///
    /// Readers report a page that could not be produced in time with
    /// [`Error::PageTimeout`](crate::Error::PageTimeout).
    async fn page(&self, catalog_id: &str, page: u32) -> Result<PageResult>;
}
