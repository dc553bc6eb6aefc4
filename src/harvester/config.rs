//! Harvest configuration and tuning constants

use super::HarvestError;
use crate::fetcher::retry::RetryPolicy;
use crate::DocumentType;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Maximum number of retries for a failed page or item fetch.
/// Transient failures usually clear within a few attempts; beyond that the
/// item is left for the next run.
pub const MAX_RETRIES: u32 = 5;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000; // 1 second

/// Maximum backoff delay in milliseconds.
/// Retry 5 would be 32s; capped to 30s.
pub const MAX_BACKOFF_MS: u64 = 30000; // 30 seconds

/// Completions folded into memory before cache and ledger are written.
/// Writing after every item dominates I/O once item bodies get large.
pub const DEFAULT_FLUSH_INTERVAL: usize = 25;

/// Entries requested per index page.
pub const DEFAULT_PAGE_SIZE: usize = 100;

/// Default number of concurrent item fetches.
pub const DEFAULT_WORKERS: usize = 3;

/// Upper bound on concurrent item fetches.
pub const MAX_WORKERS: usize = 32;

/// Default spacing between requests to the remote.
pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_secs(1);

/// Default byte ceiling for a single item body (10MB).
pub const DEFAULT_MAX_ITEM_BYTES: u64 = 10 * 1024 * 1024;

/// Hard cap on pages requested for one type in blind mode.
pub const MAX_PAGINATION_ITERATIONS: usize = 10_000;

/// Minimum interval between `[PROGRESS]` log lines.
pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Checkpoint file name inside the data directory
pub const CHECKPOINT_FILE: &str = "checkpoint.json";
/// Progress ledger file name inside the data directory
pub const LEDGER_FILE: &str = "ledger.json";
/// Item cache file name inside the data directory
pub const ITEM_CACHE_FILE: &str = "items.json";

/// Settings for one harvest run
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Directory holding checkpoint, ledger, and item cache
    pub data_dir: PathBuf,
    /// Types to paginate
    pub discover_types: Vec<DocumentType>,
    /// Types whose items are fetched; empty means every discovered type
    pub eligible_types: Vec<DocumentType>,
    /// Work-set size limit (0 = unlimited)
    pub limit: usize,
    /// Per-type pagination limit (0 = unlimited)
    pub index_limit: usize,
    /// Concurrent item fetches
    pub workers: usize,
    /// Minimum spacing between requests (zero disables throttling)
    pub throttle_interval: Duration,
    /// Completions between durable writes
    pub flush_interval: usize,
    /// Entries per index page
    pub page_size: usize,
    /// Wipe ledger and checkpoint before starting
    pub reset: bool,
    /// Rebuild the ledger from the item cache instead of trusting the file
    pub verify: bool,
    /// Retry budget for pages and items
    pub retry: RetryPolicy,
    /// Minimum interval between progress log lines
    pub progress_interval: Duration,
}

impl HarvestConfig {
    /// Configuration with defaults, storing state under `data_dir`
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            discover_types: Vec::new(),
            eligible_types: Vec::new(),
            limit: 0,
            index_limit: 0,
            workers: DEFAULT_WORKERS,
            throttle_interval: DEFAULT_THROTTLE_INTERVAL,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            page_size: DEFAULT_PAGE_SIZE,
            reset: false,
            verify: false,
            retry: RetryPolicy::default(),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Set the types to paginate
    pub fn with_discover_types(mut self, types: Vec<DocumentType>) -> Self {
        self.discover_types = types;
        self
    }

    /// Restrict item fetching to these types
    pub fn with_eligible_types(mut self, types: Vec<DocumentType>) -> Self {
        self.eligible_types = types;
        self
    }

    /// Set the work-set limit (0 = unlimited)
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Set the per-type pagination limit (0 = unlimited)
    pub fn with_index_limit(mut self, limit: usize) -> Self {
        self.index_limit = limit;
        self
    }

    /// Set worker count
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Set request spacing
    pub fn with_throttle_interval(mut self, interval: Duration) -> Self {
        self.throttle_interval = interval;
        self
    }

    /// Set completions per flush
    pub fn with_flush_interval(mut self, interval: usize) -> Self {
        self.flush_interval = interval;
        self
    }

    /// Set index page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    /// Wipe ledger and checkpoint before running
    pub fn with_reset(mut self, reset: bool) -> Self {
        self.reset = reset;
        self
    }

    /// Rebuild the ledger from the item cache
    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    /// Set the retry policy
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the progress log cadence
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Whether items of `doc_type` are fetched
    pub fn is_eligible(&self, doc_type: &DocumentType) -> bool {
        self.eligible_types.is_empty() || self.eligible_types.contains(doc_type)
    }

    /// Checkpoint file location
    pub fn checkpoint_path(&self) -> PathBuf {
        self.data_dir.join(CHECKPOINT_FILE)
    }

    /// Ledger file location
    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join(LEDGER_FILE)
    }

    /// Item cache file location
    pub fn item_cache_path(&self) -> PathBuf {
        self.data_dir.join(ITEM_CACHE_FILE)
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Check the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<(), HarvestError> {
        if self.discover_types.is_empty() {
            return Err(HarvestError::InvalidConfig(
                "at least one document type must be discovered".to_string(),
            ));
        }
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(HarvestError::InvalidConfig(format!(
                "workers must be between 1 and {MAX_WORKERS}, got {}",
                self.workers
            )));
        }
        if self.flush_interval == 0 {
            return Err(HarvestError::InvalidConfig(
                "flush interval must be at least 1".to_string(),
            ));
        }
        if self.page_size == 0 {
            return Err(HarvestError::InvalidConfig(
                "page size must be at least 1".to_string(),
            ));
        }
        if self.reset && self.verify {
            return Err(HarvestError::InvalidConfig(
                "reset and verify are mutually exclusive".to_string(),
            ));
        }
        if let Some(stray) = self
            .eligible_types
            .iter()
            .find(|t| !self.discover_types.contains(t))
        {
            return Err(HarvestError::InvalidConfig(format!(
                "eligible type '{stray}' is not among the discovered types"
            )));
        }
        Ok(())
    }
}
