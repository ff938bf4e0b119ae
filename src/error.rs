//! Error types for the illust-dl library.
//!
//! Only run-level and page-level conditions are errors. Item-level and
//! asset-level problems are carried as values (see
//! [`ItemOutcome`](crate::harvest::ItemOutcome) and
//! [`FetchOutcome`](crate::fetch::FetchOutcome)).

use thiserror::Error;

/// Errors that can occur while harvesting or downloading.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Malformed JSON payload from the catalog provider.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Session cookie data is missing or unusable.
    #[error("Session error: {0}")]
    Session(String),

    /// A catalog page did not become available in time.
    #[error("Page {page} was not ready in time")]
    PageTimeout {
        /// 1-based index of the page that timed out.
        page: u32,
    },

    /// The catalog provider rejected a request or returned an unexpected payload.
    #[error("Catalog error: {0}")]
    Catalog(String),

    /// The target author could not be resolved.
    #[error("Could not resolve author: {0}")]
    Identity(String),

    /// The run was cancelled by the operator.
    #[error("Operation cancelled")]
    Cancelled,
}

impl Error {
    /// Returns `true` for errors that must abort the whole run.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Session(_) | Self::Identity(_) | Self::Config(_))
    }
}

/// A specialized `Result` type for illust-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
