//! HTTP transport shared by the reference collaborators
//!
//! Thin wrapper over `reqwest` that maps transport failures and status codes
//! into [`FetcherError`] and enforces a byte ceiling on bodies. Pacing and
//! retries are applied by the callers (the paginator and the worker pool),
//! not here.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::fetcher::{FetcherError, FetcherResult};
use crate::metrics::HttpRequestMetrics;

/// Default per-request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body and metadata of a successful response
#[derive(Debug, Clone)]
pub struct HttpBody {
    /// Status code (always 2xx)
    pub status: u16,
    /// `Content-Type` header, if any
    pub content_type: Option<String>,
    /// Raw body bytes
    pub bytes: Vec<u8>,
}

/// Shared HTTP client
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Arc<Client>,
}

impl HttpClient {
    /// Build a client with the given request timeout
    ///
    /// # Errors
    /// Returns `NetworkError` if the TLS backend cannot be initialized
    pub fn new(timeout: Duration) -> FetcherResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("index-harvester/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FetcherError::NetworkError(format!("Failed to build HTTP client: {e}")))?;
        Ok(Self::from_client(Arc::new(client)))
    }

    /// Wrap an existing client
    pub fn from_client(client: Arc<Client>) -> Self {
        Self { client }
    }

    /// GET `url` with query `params` and deserialize a JSON body
    pub async fn get_json<T>(&self, url: &str, params: &[(&str, String)]) -> FetcherResult<T>
    where
        T: DeserializeOwned,
    {
        debug!("Making GET request to: {} with {} params", url, params.len());
        let metrics = HttpRequestMetrics::start("index");
        let response = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(|e| {
                metrics.record_network_error();
                map_reqwest_error(e)
            })?;
        metrics.record_complete(response.status().as_u16());

        let response = ensure_success(response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| FetcherError::ParseError(format!("Failed to deserialize response: {e}")))
    }

    /// GET `url` and read the body, refusing anything over `max_bytes`
    ///
    /// The announced `Content-Length` is checked first; the streamed body is
    /// checked again while reading since the header may be absent or wrong.
    pub async fn get_bytes(&self, url: &str, max_bytes: u64) -> FetcherResult<HttpBody> {
        debug!("Making GET request to: {}", url);
        let metrics = HttpRequestMetrics::start("item");
        let response = self.client.get(url).send().await.map_err(|e| {
            metrics.record_network_error();
            map_reqwest_error(e)
        })?;
        metrics.record_complete(response.status().as_u16());

        let mut response = ensure_success(response).await?;

        if let Some(announced) = response.content_length() {
            if announced > max_bytes {
                return Err(FetcherError::TooLarge {
                    size: announced,
                    max: max_bytes,
                });
            }
        }

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(map_reqwest_error)? {
            let size = (bytes.len() + chunk.len()) as u64;
            if size > max_bytes {
                return Err(FetcherError::TooLarge {
                    size,
                    max: max_bytes,
                });
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(HttpBody {
            status,
            content_type,
            bytes,
        })
    }
}

async fn ensure_success(response: reqwest::Response) -> FetcherResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        status.canonical_reason().unwrap_or("error").to_string()
    } else {
        response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string())
    };
    Err(FetcherError::HttpError {
        status: status.as_u16(),
        message,
    })
}

fn map_reqwest_error(e: reqwest::Error) -> FetcherError {
    if e.is_timeout() {
        FetcherError::Timeout(e.to_string())
    } else if e.is_decode() || e.is_body() {
        FetcherError::InvalidResponse(e.to_string())
    } else {
        FetcherError::NetworkError(e.to_string())
    }
}
