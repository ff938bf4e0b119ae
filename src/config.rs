//! Configuration types for harvesting and downloading.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Mobile Edge user agent; the provider serves the lighter mobile markup to it.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Linux; Android 10; K) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/130.0.0.0 Safari/537.36 EdgA/130.0.0.0";

/// Mirror host serving original-resolution assets without a referer check.
pub const DEFAULT_ASSET_HOST: &str = "https://i.pixiv.cat/img-original/img";

/// Serializes a `Duration` as fractional seconds (`1.5` rather than a table).
mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let value = f64::deserialize(d)?;
        Duration::try_from_secs_f64(value).map_err(serde::de::Error::custom)
    }
}

/// Configuration for the download engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Size of each download batch, i.e. the peak number of open requests.
    pub max_concurrency: usize,
    /// Attempts per asset; each attempt tries both URL variants.
    pub max_retries: u32,
    /// Pause after every failed fetch.
    #[serde(with = "secs")]
    pub retry_interval: Duration,
    /// Timeout applied to a single request.
    #[serde(with = "secs")]
    pub request_timeout: Duration,
    /// User agent sent with every request.
    pub user_agent: String,
    /// Base URL the asset path templates are resolved against.
    pub asset_host: String,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            max_retries: 3,
            retry_interval: Duration::from_millis(1500),
            request_timeout: Duration::from_secs(10),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            asset_host: DEFAULT_ASSET_HOST.to_string(),
        }
    }
}

impl DownloadConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_max_concurrency(mut self, concurrency: usize) -> Self {
        self.max_concurrency = concurrency;
        self
    }

    /// Sets the number of attempts per asset.
    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the pause after a failed fetch.
    #[must_use]
    pub const fn with_retry_interval(mut self, interval: Duration) -> Self {
        self.retry_interval = interval;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the asset mirror host.
    #[must_use]
    pub fn with_asset_host(mut self, host: impl Into<String>) -> Self {
        self.asset_host = host.into();
        self
    }
}

/// Configuration for catalog paging and item extraction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Nominal number of records on a full page.
    pub page_size: usize,
    /// Pause between consecutive page requests.
    #[serde(with = "secs")]
    pub page_delay: Duration,
    /// How long to wait for a page before giving up on paging.
    #[serde(with = "secs")]
    pub page_timeout: Duration,
    /// Number of workers deriving items from fetched records.
    pub max_catalog_workers: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: 18,
            page_delay: Duration::from_secs(3),
            page_timeout: Duration::from_secs(10),
            max_catalog_workers: 2,
        }
    }
}

impl CatalogConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the nominal page size.
    #[must_use]
    pub const fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    /// Sets the pause between pages.
    #[must_use]
    pub const fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    /// Sets the number of extraction workers.
    #[must_use]
    pub const fn with_max_catalog_workers(mut self, workers: usize) -> Self {
        self.max_catalog_workers = workers;
        self
    }
}

/// Filesystem locations used by a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathConfig {
    /// Directory under which one folder per author is created.
    pub base_dir: PathBuf,
    /// File holding the session cookie header string.
    pub cookie_file: PathBuf,
}

impl Default for PathConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("pixiv_downloads"),
            cookie_file: PathBuf::from("cookie.json"),
        }
    }
}

/// Complete application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Download engine settings.
    pub download: DownloadConfig,
    /// Catalog paging settings.
    pub catalog: CatalogConfig,
    /// Filesystem locations.
    pub paths: PathConfig,
}

impl AppConfig {
    /// Creates a new config with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the default config file location
    /// (`$XDG_CONFIG_HOME/illust-dl/config.toml` on Linux).
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("illust-dl")
            .join("config.toml")
    }

    /// Loads configuration from `path`. A missing file yields the defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!("{}: {e}", path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_download_config() {
        let config = DownloadConfig::default();
        assert_eq!(config.max_concurrency, 5);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_interval, Duration::from_millis(1500));
        assert_eq!(config.request_timeout, Duration::from_secs(10));
        assert_eq!(config.asset_host, DEFAULT_ASSET_HOST);
    }

    #[test]
    fn default_catalog_config() {
        let config = CatalogConfig::default();
        assert_eq!(config.page_size, 18);
        assert_eq!(config.page_delay, Duration::from_secs(3));
        assert_eq!(config.max_catalog_workers, 2);
    }

    #[test]
    fn download_config_builder_pattern() {
        let config = DownloadConfig::new()
            .with_max_concurrency(8)
            .with_max_retries(1)
            .with_retry_interval(Duration::ZERO)
            .with_asset_host("http://localhost");

        assert_eq!(config.max_concurrency, 8);
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.retry_interval, Duration::ZERO);
        assert_eq!(config.asset_host, "http://localhost");
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: AppConfig = toml::from_str(
            "[download]\nmax_concurrency = 9\nretry_interval = 0.25\n\n[paths]\nbase_dir = \"/tmp/art\"\n",
        )
        .unwrap();
        assert_eq!(config.download.max_concurrency, 9);
        assert_eq!(config.download.retry_interval, Duration::from_millis(250));
        assert_eq!(config.download.max_retries, 3);
        assert_eq!(config.catalog.page_size, 18);
        assert_eq!(config.paths.base_dir, PathBuf::from("/tmp/art"));
        assert_eq!(config.paths.cookie_file, PathBuf::from("cookie.json"));
    }

    #[test]
    fn app_config_serializes_to_toml() {
        let config = AppConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let back: AppConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(back.download.retry_interval, config.download.retry_interval);
        assert_eq!(back.catalog.page_timeout, config.catalog.page_timeout);
    }

    #[test]
    fn load_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = AppConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.download.max_concurrency, 5);
    }

    #[test]
    fn load_invalid_file_is_config_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "download = 3").unwrap();
        assert!(matches!(AppConfig::load(&path), Err(Error::Config(_))));
    }

    #[test]
    fn default_path_is_namespaced() {
        assert!(AppConfig::default_path().to_string_lossy().contains("illust-dl"));
    }
}
