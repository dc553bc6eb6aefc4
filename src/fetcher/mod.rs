//! Index and item collaborators
//!
//! The harvester never talks to a remote service directly. It drives an
//! [`IndexSource`] for discovery and an [`ItemFetcher`] for detail records;
//! [`remote`] provides HTTP-backed implementations of both.

use crate::{DocumentType, IndexEntry, Item};
use async_trait::async_trait;
use std::fmt;

pub mod http;
pub mod pagination;
pub mod remote;
pub mod retry;

/// Fetcher errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetcherError {
    /// Non-success HTTP status
    #[error("HTTP error {status}: {message}")]
    HttpError {
        /// Status code returned by the remote
        status: u16,
        /// Response text or reason
        message: String,
    },

    /// Response parse error
    #[error("parse error: {0}")]
    ParseError(String),

    /// Invalid response
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Network error (connection refused, reset, DNS)
    #[error("network error: {0}")]
    NetworkError(String),

    /// Request timed out
    #[error("timeout: {0}")]
    Timeout(String),

    /// Body exceeds the configured byte ceiling
    #[error("response too large: {size} bytes (max: {max} bytes)")]
    TooLarge {
        /// Observed (or announced) size
        size: u64,
        /// Ceiling
        max: u64,
    },
}

impl FetcherError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        self.retry_class().is_retryable()
    }
}

/// Result type for fetcher operations
pub type FetcherResult<T> = Result<T, FetcherError>;

/// One page of an index listing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    /// 1-based offset of the first entry
    pub start: u64,
    /// Requested number of entries
    pub size: usize,
}

impl PageRequest {
    /// Create a page request
    pub fn new(start: u64, size: usize) -> Self {
        Self { start, size }
    }

    /// Offset of the page that follows this one
    pub fn next(&self) -> Self {
        Self {
            start: self.start + self.size as u64,
            size: self.size,
        }
    }
}

/// Why an entry was skipped permanently
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Body over the byte ceiling
    TooLarge {
        /// Observed size
        size: u64,
        /// Ceiling
        max: u64,
    },
    /// Collaborator-specific reason
    Other(String),
}

impl SkipReason {
    /// Short label stored in the cache sentinel
    pub fn label(&self) -> &str {
        match self {
            Self::TooLarge { .. } => "too_large",
            Self::Other(reason) => reason,
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLarge { size, max } => write!(f, "too large ({size} > {max} bytes)"),
            Self::Other(reason) => f.write_str(reason),
        }
    }
}

/// Non-error result of fetching one entry's detail
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    /// Detail record
    Item(Item),
    /// Remote resource legitimately empty
    NoContent,
    /// Permanently skipped
    Skipped(SkipReason),
}

/// Paginated index listing
#[async_trait]
pub trait IndexSource: Send + Sync {
    /// Known page boundaries for `doc_type`, if a directory page lists them.
    ///
    /// `None` selects blind pagination.
    async fn page_boundaries(
        &self,
        _doc_type: &DocumentType,
    ) -> FetcherResult<Option<Vec<PageRequest>>> {
        Ok(None)
    }

    /// Fetch one page of entries for `doc_type`
    async fn fetch_page(
        &self,
        doc_type: &DocumentType,
        page: PageRequest,
    ) -> FetcherResult<Vec<IndexEntry>>;
}

/// Per-item detail fetch
#[async_trait]
pub trait ItemFetcher: Send + Sync {
    /// Fetch the detail record for `entry`
    async fn fetch_item(&self, entry: &IndexEntry) -> FetcherResult<Fetched>;
}
