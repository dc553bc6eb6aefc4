//! # Index Harvester Library
//!
//! An incremental, resumable, concurrent harvester for large paginated remote
//! document indexes. For every discovered index entry it fetches a detail
//! sub-resource (status page, PDF, roster, ...) and persists it in a local
//! item cache.
//!
//! ## Features
//!
//! - **Index discovery**: blind or known-boundary pagination with a
//!   recycled-data guard
//! - **Crash-safe checkpoints**: pagination progress written atomically after
//!   every page
//! - **Incremental runs**: a progress ledger records terminal outcomes so
//!   completed work is never fetched twice
//! - **Bounded concurrency**: a worker pool with a process-wide politeness
//!   throttle
//! - **Batch flush**: results are persisted every N completions, not every one
//! - **Cooperative interruption**: first Ctrl+C drains in-flight work and
//!   flushes, second Ctrl+C exits immediately
//!
//! ## Quick Start
//!
//! ```no_run
//! use index_harvester::fetcher::remote::{HttpIndexSource, HttpItemFetcher};
//! use index_harvester::harvester::{HarvestConfig, HarvestEngine};
//! use index_harvester::identifier::DocumentType;
//! use index_harvester::shutdown::InterruptCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let bill = DocumentType::parse("bill")?;
//! let config = HarvestConfig::new("./harvest")
//!     .with_discover_types(vec![bill.clone()])
//!     .with_eligible_types(vec![bill])
//!     .with_limit(100);
//!
//! let engine = HarvestEngine::new(config)?;
//! let source = HttpIndexSource::new("https://example.org/index")?;
//! let fetcher = HttpItemFetcher::new(10 * 1024 * 1024)?;
//! let summary = engine
//!     .run(&source, fetcher, InterruptCoordinator::shared())
//!     .await?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`identifier`] - Document type and entry id newtypes
//! - [`fetcher`] - Index and item collaborator traits, HTTP transport, pagination
//! - [`resume`] - Checkpoint store, progress ledger, item cache, atomic writes
//! - [`harvester`] - Throttle, delta engine, worker pool, batch flush, engine
//! - [`shutdown`] - Interrupt coordinator
//! - [`metrics`] - Prometheus metrics

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};

/// CLI command implementations
pub mod cli;

/// Harvest orchestration
pub mod harvester;

/// Index and item fetchers
pub mod fetcher;

/// Document type and entry id parsing
pub mod identifier;

/// Production observability metrics
pub mod metrics;

/// Durable harvest state
pub mod resume;

/// Interrupt coordination shared across modules
pub mod shutdown;

pub use identifier::{DocumentType, EntryId};

/// Key under which the harvester marks cache entries that carry no content
const SENTINEL_KEY: &str = "_harvest_status";

/// Lightweight descriptor of one discoverable unit of work
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Unique id of the entry
    pub id: EntryId,
    /// Document type the entry was listed under
    #[serde(rename = "type")]
    pub doc_type: DocumentType,
    /// Human readable title
    #[serde(default)]
    pub label: String,
    /// URI of the detail sub-resource
    pub locator: String,
}

impl IndexEntry {
    /// Create a new index entry
    pub fn new(
        id: EntryId,
        doc_type: DocumentType,
        label: impl Into<String>,
        locator: impl Into<String>,
    ) -> Self {
        Self {
            id,
            doc_type,
            label: label.into(),
            locator: locator.into(),
        }
    }
}

/// Fetched detail record for one entry
///
/// The schema belongs to whoever parses the remote document; the harvester
/// only stores it and asks a [`ContentPolicy`] whether it is usable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Item(pub serde_json::Value);

impl Item {
    /// Wrap an arbitrary JSON value
    pub fn new(value: serde_json::Value) -> Self {
        Self(value)
    }

    /// Cache marker for an entry whose remote resource has nothing to fetch
    pub fn no_content_marker() -> Self {
        let mut marker = serde_json::Map::new();
        marker.insert(SENTINEL_KEY.to_string(), "no_content".into());
        Self(serde_json::Value::Object(marker))
    }

    /// Cache marker for an entry that was skipped
    pub fn skipped_marker(reason: &str) -> Self {
        let mut marker = serde_json::Map::new();
        marker.insert(SENTINEL_KEY.to_string(), "skipped".into());
        marker.insert("reason".to_string(), reason.into());
        Self(serde_json::Value::Object(marker))
    }

    /// Which marker this item is, if it is one
    pub fn sentinel(&self) -> Option<Sentinel> {
        match self.0.get(SENTINEL_KEY)?.as_str()? {
            "no_content" => Some(Sentinel::NoContent),
            "skipped" => Some(Sentinel::Skipped),
            _ => None,
        }
    }

    /// Borrow the underlying JSON value
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }
}

/// Markers the harvester writes into the item cache for contentless outcomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sentinel {
    /// Remote resource legitimately empty
    NoContent,
    /// Skipped (e.g. over the byte ceiling)
    Skipped,
}

/// Decides whether a cached item counts as harvested
pub trait ContentPolicy: Send + Sync {
    /// Whether `item` holds usable content
    fn has_usable_content(&self, item: &Item) -> bool;
}

impl<F> ContentPolicy for F
where
    F: Fn(&Item) -> bool + Send + Sync,
{
    fn has_usable_content(&self, item: &Item) -> bool {
        self(item)
    }
}

/// Default policy: anything that is not a sentinel, `null`, or an empty
/// string, array or object
#[derive(Debug, Clone, Copy, Default)]
pub struct NonEmptyContent;

impl ContentPolicy for NonEmptyContent {
    fn has_usable_content(&self, item: &Item) -> bool {
        if item.sentinel().is_some() {
            return false;
        }
        match item.as_value() {
            serde_json::Value::Null => false,
            serde_json::Value::String(s) => !s.trim().is_empty(),
            serde_json::Value::Array(a) => !a.is_empty(),
            serde_json::Value::Object(o) => !o.is_empty(),
            _ => true,
        }
    }
}
