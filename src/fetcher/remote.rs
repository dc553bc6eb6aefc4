//! HTTP-backed index source and item fetcher
//!
//! Listing layout:
//! - `GET {base}/{type}?start={offset}&size={n}` returns a JSON array of
//!   `{"id", "label", "locator"}` objects
//! - `GET {base}/{type}/pages` optionally returns `[{"start", "size"}, ...]`;
//!   404 means the type has no directory page and is paginated blind
//!
//! Items are fetched from each entry's `locator`. The body is recorded
//! verbatim (lossy UTF-8) with its content type and SHA-256 digest. Field
//! extraction is left to whoever consumes the item cache.

use super::http::{HttpClient, DEFAULT_REQUEST_TIMEOUT};
use super::{FetcherError, FetcherResult, Fetched, IndexSource, ItemFetcher, PageRequest, SkipReason};
use crate::{DocumentType, EntryId, IndexEntry, Item};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

#[derive(Debug, Deserialize)]
struct ListingRow {
    id: String,
    #[serde(default)]
    label: String,
    locator: String,
}

#[derive(Debug, Deserialize)]
struct PageBoundary {
    start: u64,
    size: usize,
}

/// Paginated JSON listing over HTTP
#[derive(Debug, Clone)]
pub struct HttpIndexSource {
    client: HttpClient,
    base_url: String,
}

impl HttpIndexSource {
    /// Create a source rooted at `base_url`
    pub fn new(base_url: impl Into<String>) -> FetcherResult<Self> {
        Ok(Self::with_client(HttpClient::new(DEFAULT_REQUEST_TIMEOUT)?, base_url))
    }

    /// Create a source sharing an existing client
    pub fn with_client(client: HttpClient, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn type_url(&self, doc_type: &DocumentType) -> String {
        format!("{}/{}", self.base_url, doc_type)
    }
}

#[async_trait]
impl IndexSource for HttpIndexSource {
    async fn page_boundaries(
        &self,
        doc_type: &DocumentType,
    ) -> FetcherResult<Option<Vec<PageRequest>>> {
        let url = format!("{}/pages", self.type_url(doc_type));
        match self.client.get_json::<Vec<PageBoundary>>(&url, &[]).await {
            Ok(rows) => Ok(Some(
                rows.into_iter()
                    .map(|b| PageRequest::new(b.start, b.size))
                    .collect(),
            )),
            Err(FetcherError::HttpError { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn fetch_page(
        &self,
        doc_type: &DocumentType,
        page: PageRequest,
    ) -> FetcherResult<Vec<IndexEntry>> {
        let params = [
            ("start", page.start.to_string()),
            ("size", page.size.to_string()),
        ];
        let rows: Vec<ListingRow> = self.client.get_json(&self.type_url(doc_type), &params).await?;

        rows.into_iter()
            .map(|row| {
                let id = EntryId::parse(&row.id)
                    .map_err(|e| FetcherError::InvalidResponse(e.to_string()))?;
                Ok(IndexEntry::new(id, doc_type.clone(), row.label, row.locator))
            })
            .collect()
    }
}

/// Fetches each entry's locator and records the raw body
#[derive(Debug, Clone)]
pub struct HttpItemFetcher {
    client: HttpClient,
    max_bytes: u64,
}

impl HttpItemFetcher {
    /// Create a fetcher refusing bodies over `max_bytes`
    pub fn new(max_bytes: u64) -> FetcherResult<Self> {
        Ok(Self::with_client(HttpClient::new(DEFAULT_REQUEST_TIMEOUT)?, max_bytes))
    }

    /// Create a fetcher sharing an existing client
    pub fn with_client(client: HttpClient, max_bytes: u64) -> Self {
        Self { client, max_bytes }
    }
}

#[async_trait]
impl ItemFetcher for HttpItemFetcher {
    async fn fetch_item(&self, entry: &IndexEntry) -> FetcherResult<Fetched> {
        let body = match self.client.get_bytes(&entry.locator, self.max_bytes).await {
            Ok(body) => body,
            Err(FetcherError::HttpError { status: 404 | 410, .. }) => {
                debug!(id = %entry.id, "Item resource missing, no content");
                return Ok(Fetched::NoContent);
            }
            Err(FetcherError::TooLarge { size, max }) => {
                return Ok(Fetched::Skipped(SkipReason::TooLarge { size, max }));
            }
            Err(e) => return Err(e),
        };

        if body.bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Fetched::NoContent);
        }

        Ok(Fetched::Item(item_from_body(entry, &body.bytes, body.content_type)))
    }
}

fn item_from_body(entry: &IndexEntry, bytes: &[u8], content_type: Option<String>) -> Item {
    let digest = Sha256::digest(bytes);
    let sha256: String = digest.iter().map(|b| format!("{b:02x}")).collect();

    Item::new(serde_json::json!({
        "id": entry.id.as_str(),
        "type": entry.doc_type.as_str(),
        "label": entry.label,
        "locator": entry.locator,
        "content_type": content_type,
        "bytes": bytes.len(),
        "sha256": sha256,
        "body": String::from_utf8_lossy(bytes),
        "fetched_at": Utc::now().to_rfc3339(),
    }))
}
