//! Harvest orchestration
//!
//! A run flows through these pieces in order:
//!
//! 1. **Discovery**: [`crate::fetcher::pagination::IndexPaginator`] walks every
//!    configured document type, checkpointing after each page
//! 2. **Delta**: [`delta::compute_work`] removes everything the ledger or the
//!    item cache already accounts for
//! 3. **Fetch**: [`pool::WorkerPool`] runs per-item fetches with bounded
//!    concurrency, paced by the shared [`throttle::Throttle`]
//! 4. **Persist**: [`flush::BatchFlush`] folds completions into the cache and
//!    ledger and writes both every N completions
//!
//! [`engine::HarvestEngine`] ties them together and watches the
//! [`crate::shutdown::InterruptCoordinator`] between steps.
//!
//! # Quick Start
//!
//! ```no_run
//! use index_harvester::harvester::{HarvestConfig, HarvestEngine};
//! use index_harvester::fetcher::remote::{HttpIndexSource, HttpItemFetcher};
//! use index_harvester::identifier::DocumentType;
//! use index_harvester::shutdown::InterruptCoordinator;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let motion = DocumentType::parse("motion")?;
//! let config = HarvestConfig::new("./state")
//!     .with_discover_types(vec![motion])
//!     .with_workers(4);
//! let engine = HarvestEngine::new(config)?;
//! let source = HttpIndexSource::new("https://example.org/index")?;
//! let fetcher = HttpItemFetcher::new(10 * 1024 * 1024)?;
//! let summary = engine.run(&source, fetcher, InterruptCoordinator::shared()).await?;
//! assert!(summary.attempted() <= summary.work_set);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod delta;
pub mod engine;
pub mod flush;
pub mod pool;
pub mod progress;
pub mod throttle;

pub use config::HarvestConfig;
pub use engine::{HarvestEngine, HarvestSummary};
pub use pool::{Completion, ItemOutcome, WorkerPool};
pub use throttle::{SharedThrottle, Throttle};

use crate::resume::StoreError;

/// Harvest errors
///
/// Only configuration mistakes and durable-store failures surface here.
/// Per-item and per-page failures are reported as data in the summary.
#[derive(Debug, thiserror::Error)]
pub enum HarvestError {
    /// Invalid configuration
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Cannot write the checkpoint, ledger, or item cache
    #[error("durable store failure: {0}")]
    Store(#[from] StoreError),
}
