//! Catalog reader backed by the provider's JSON endpoints.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{COOKIE, HeaderMap, HeaderValue, REFERER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::OnceCell;

use super::{CatalogReader, CatalogRecord, PageResult};
use crate::error::{Error, Result};
use crate::session::Session;

/// Root of the JSON API.
pub const DEFAULT_API_BASE: &str = "https://www.pixiv.net/ajax";
const SITE_REFERER: &str = "https://www.pixiv.net/";

/// Response envelope shared by every endpoint.
#[derive(Deserialize)]
struct Envelope {
    error: bool,
    #[serde(default)]
    message: String,
    #[serde(default)]
    body: serde_json::Value,
}

#[derive(Deserialize)]
struct UserBody {
    name: String,
}

#[derive(Deserialize)]
struct WorksBody {
    /// An object keyed by id; `[]` when none of the requested works exist.
    #[serde(default)]
    works: serde_json::Value,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Work {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    alt: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    page_count: Option<u32>,
    #[serde(default)]
    user_name: String,
}

impl Work {
    fn into_record(self) -> CatalogRecord {
        let label = self
            .alt
            .filter(|alt| !alt.trim().is_empty())
            .unwrap_or_else(|| format!("# {} - {}", self.title, self.user_name));
        CatalogRecord {
            id: self.id,
            label,
            thumbnail_url: self.url,
            asset_count: self.page_count,
        }
    }
}

/// Reads an author's catalog through the `ajax` JSON API.
///
/// The full id listing is fetched once and sliced into pages of
/// `page_size`, newest first.
pub struct AjaxCatalogReader {
    http: reqwest::Client,
    api_base: String,
    page_size: usize,
    listing: OnceCell<Vec<String>>,
}

impl AjaxCatalogReader {
    /// Builds a reader that authenticates with `session`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cookie header is not a valid header value or
    /// the HTTP client cannot be built.
    pub fn new(
        session: &Session,
        user_agent: &str,
        timeout: Duration,
        page_size: usize,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let cookie = HeaderValue::from_str(&session.header())
            .map_err(|e| Error::Session(format!("cookie is not a valid header: {e}")))?;
        headers.insert(COOKIE, cookie);
        headers.insert(REFERER, HeaderValue::from_static(SITE_REFERER));

        let http = reqwest::Client::builder()
            .user_agent(user_agent)
            .default_headers(headers)
            .timeout(timeout)
            .build()?;

        Ok(Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            page_size: page_size.max(1),
            listing: OnceCell::new(),
        })
    }

    /// Sets the API root (default [`DEFAULT_API_BASE`]).
    #[must_use]
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let envelope: Envelope = serde_json::from_str(&text).map_err(|e| {
            Error::Catalog(format!("{url} returned {status} with an unreadable body: {e}"))
        })?;
        if envelope.error {
            return Err(Error::Catalog(format!("{url}: {}", envelope.message)));
        }
        Ok(serde_json::from_value(envelope.body)?)
    }

    async fn listing(&self, catalog_id: &str) -> Result<&[String]> {
        let ids = self
            .listing
            .get_or_try_init(|| async {
                let body: serde_json::Value = self
                    .get(&format!("{}/user/{catalog_id}/profile/all", self.api_base), &[])
                    .await?;
                let ids = listing_ids(&body);
                log::info!("Catalog {catalog_id} lists {} works", ids.len());
                Ok::<_, Error>(ids)
            })
            .await?;
        Ok(ids)
    }
}

/// Collects illustration and manga ids from a `profile/all` body, newest first.
///
/// Empty sections come back as `[]` instead of `{}`.
fn listing_ids(body: &serde_json::Value) -> Vec<String> {
    let mut ids: Vec<String> = ["illusts", "manga"]
        .iter()
        .filter_map(|section| body.get(section).and_then(serde_json::Value::as_object))
        .flat_map(|works| works.keys().cloned())
        .collect();
    ids.sort_by(|a, b| {
        let (na, nb) = (a.parse::<u64>().ok(), b.parse::<u64>().ok());
        nb.cmp(&na).then_with(|| b.cmp(a))
    });
    ids.dedup();
    ids
}

fn map_timeout(err: Error, page: u32) -> Error {
    match err {
        Error::Http(e) if e.is_timeout() => Error::PageTimeout { page },
        other => other,
    }
}

#[async_trait]
impl CatalogReader for AjaxCatalogReader {
    async fn author_name(&self, catalog_id: &str) -> Result<String> {
        let user: UserBody = self
            .get(&format!("{}/user/{catalog_id}", self.api_base), &[])
            .await
            .map_err(|e| Error::Identity(format!("author {catalog_id}: {e}")))?;
        Ok(user.name)
    }

    async fn page(&self, catalog_id: &str, page: u32) -> Result<PageResult> {
        let ids = self
            .listing(catalog_id)
            .await
            .map_err(|e| map_timeout(e, page))?;
        let start = (page.saturating_sub(1) as usize).saturating_mul(self.page_size);
        if start >= ids.len() {
            return Ok(PageResult {
                records: Vec::new(),
                is_last_page: true,
            });
        }
        let end = (start + self.page_size).min(ids.len());
        let slice = &ids[start..end];

        let mut query: Vec<(&str, &str)> = slice.iter().map(|id| ("ids[]", id.as_str())).collect();
        query.push(("work_category", "illustManga"));
        query.push(("is_first_page", "0"));

        let body: WorksBody = self
            .get(
                &format!("{}/user/{catalog_id}/profile/illusts", self.api_base),
                &query,
            )
            .await
            .map_err(|e| map_timeout(e, page))?;

        let records = slice
            .iter()
            .map(|id| match body.works.get(id.as_str()) {
                Some(value) => match serde_json::from_value::<Work>(value.clone()) {
                    Ok(work) => work.into_record(),
                    Err(e) => {
                        log::warn!("Work {id} on page {page} is unreadable: {e}");
                        CatalogRecord::unavailable(id.as_str())
                    }
                },
                None => {
                    log::warn!("Work {id} on page {page} is hidden or deleted");
                    CatalogRecord::unavailable(id.as_str())
                }
            })
            .collect();

        Ok(PageResult {
            records,
            is_last_page: end == ids.len(),
        })
    }
}
