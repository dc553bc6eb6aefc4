//! Index pagination with crash-safe checkpointing
//!
//! Two modes per document type:
//! - **Known boundaries**: the source lists its pages up front; each page is
//!   fetched exactly once.
//! - **Blind**: fixed-size pages from offset 1 until an empty page, or until
//!   the recycled-data guard fires.
//!
//! Some listings never return an empty page. Once real data runs out they
//! start serving earlier pages again. In blind mode the first entry of every
//! page is checked: an ordinal below the requested start offset means the
//! data is recycled and pagination stops without appending that page.
//!
//! After every appended page the whole checkpoint is persisted.

use crate::fetcher::retry::{with_retry, RetryPolicy};
use crate::fetcher::{FetcherError, IndexSource, PageRequest};
use crate::harvester::config::MAX_PAGINATION_ITERATIONS;
use crate::harvester::Throttle;
use crate::resume::{Checkpoint, CheckpointStore, StoreError};
use crate::shutdown::InterruptCoordinator;
use crate::{DocumentType, IndexEntry};
use tracing::{debug, info, warn};

/// Why pagination for one type stopped
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationEnd {
    /// Blind mode received an empty page
    Exhausted,
    /// Every known page was fetched
    KnownPagesDone,
    /// First entry of a page had an ordinal below the requested start
    RecycledData {
        /// Offset that was requested
        requested_start: u64,
        /// Ordinal of the page's first entry
        first_ordinal: u64,
    },
    /// Accumulated entries reached the configured limit
    LimitReached,
    /// Blind mode hit [`MAX_PAGINATION_ITERATIONS`]
    IterationCap,
    /// Interrupt observed between pages
    Interrupted,
    /// A page fetch failed after retries
    Failed(FetcherError),
}

impl PaginationEnd {
    /// Short human-readable description
    pub fn describe(&self) -> String {
        match self {
            Self::Exhausted => "exhausted".to_string(),
            Self::KnownPagesDone => "all known pages fetched".to_string(),
            Self::RecycledData {
                requested_start,
                first_ordinal,
            } => format!("recycled data at offset {requested_start} (first ordinal {first_ordinal})"),
            Self::LimitReached => "limit reached".to_string(),
            Self::IterationCap => "iteration cap reached".to_string(),
            Self::Interrupted => "interrupted".to_string(),
            Self::Failed(e) => format!("failed: {e}"),
        }
    }

    /// Whether the type's listing is known to be fully walked
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Self::Exhausted | Self::KnownPagesDone | Self::RecycledData { .. } | Self::LimitReached
        )
    }
}

/// Result of paginating one document type
#[derive(Debug, Clone)]
pub struct TypeDiscovery {
    /// Type that was paginated
    pub doc_type: DocumentType,
    /// Pages appended to the checkpoint
    pub pages: usize,
    /// Entries appended to the checkpoint
    pub entries: usize,
    /// Stop reason
    pub end: PaginationEnd,
}

/// Walks paginated listings into a [`Checkpoint`]
pub struct IndexPaginator<'a, S: IndexSource + ?Sized> {
    source: &'a S,
    throttle: &'a Throttle,
    store: &'a CheckpointStore,
    interrupt: &'a InterruptCoordinator,
    retry: RetryPolicy,
    page_size: usize,
    limit: usize,
}

impl<'a, S: IndexSource + ?Sized> IndexPaginator<'a, S> {
    /// Create a paginator
    pub fn new(
        source: &'a S,
        throttle: &'a Throttle,
        store: &'a CheckpointStore,
        interrupt: &'a InterruptCoordinator,
    ) -> Self {
        Self {
            source,
            throttle,
            store,
            interrupt,
            retry: RetryPolicy::default(),
            page_size: crate::harvester::config::DEFAULT_PAGE_SIZE,
            limit: 0,
        }
    }

    /// Set the blind-mode page size
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Stop each type once it has `limit` entries (0 = unlimited)
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Retry policy for page fetches
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Paginate `doc_type` from scratch into `checkpoint`.
    ///
    /// Any entries already held for the type are discarded first and the
    /// slot records the size of the first page requested. The checkpoint is
    /// saved after every appended page.
    ///
    /// # Errors
    /// Only a failure to persist the checkpoint is an error. Fetch failures
    /// end pagination for this type and are reported in
    /// [`TypeDiscovery::end`].
    pub async fn paginate_type(
        &self,
        doc_type: &DocumentType,
        checkpoint: &mut Checkpoint,
    ) -> Result<TypeDiscovery, StoreError> {
        let boundaries = self.known_boundaries(doc_type).await;
        let first_page_size = boundaries
            .as_ref()
            .and_then(|pages| pages.first())
            .map_or(self.page_size, |page| page.size);
        checkpoint.restart(doc_type, first_page_size);

        let mut discovery = TypeDiscovery {
            doc_type: doc_type.clone(),
            pages: 0,
            entries: 0,
            end: PaginationEnd::Exhausted,
        };

        discovery.end = match boundaries {
            Some(pages) => {
                info!(doc_type = %doc_type, pages = pages.len(), "Paginating known page boundaries");
                self.walk_known(doc_type, pages, checkpoint, &mut discovery)
                    .await?
            }
            None => {
                info!(doc_type = %doc_type, page_size = self.page_size, "Paginating blind");
                self.walk_blind(doc_type, checkpoint, &mut discovery).await?
            }
        };

        info!(
            doc_type = %doc_type,
            pages = discovery.pages,
            entries = discovery.entries,
            end = ?discovery.end,
            "Pagination finished"
        );
        Ok(discovery)
    }

    async fn known_boundaries(&self, doc_type: &DocumentType) -> Option<Vec<PageRequest>> {
        let context = format!("page boundaries for {doc_type}");
        let source = self.source;
        match with_retry(&self.retry, Some(self.interrupt), &context, move || {
            source.page_boundaries(doc_type)
        })
        .await
        {
            Ok(pages) => pages,
            Err(e) => {
                warn!(doc_type = %doc_type, error = %e, "Page boundary lookup failed, falling back to blind pagination");
                None
            }
        }
    }

    async fn walk_known(
        &self,
        doc_type: &DocumentType,
        pages: Vec<PageRequest>,
        checkpoint: &mut Checkpoint,
        discovery: &mut TypeDiscovery,
    ) -> Result<PaginationEnd, StoreError> {
        for page in pages {
            let entries = match self.fetch(doc_type, page).await {
                Ok(entries) => entries,
                Err(end) => return Ok(end),
            };
            if entries.is_empty() {
                debug!(doc_type = %doc_type, start = page.start, "Known page was empty");
                continue;
            }
            if self.append(doc_type, entries, checkpoint, discovery)? {
                return Ok(PaginationEnd::LimitReached);
            }
        }
        Ok(PaginationEnd::KnownPagesDone)
    }

    async fn walk_blind(
        &self,
        doc_type: &DocumentType,
        checkpoint: &mut Checkpoint,
        discovery: &mut TypeDiscovery,
    ) -> Result<PaginationEnd, StoreError> {
        let mut page = PageRequest::new(1, self.page_size);

        for _ in 0..MAX_PAGINATION_ITERATIONS {
            let entries = match self.fetch(doc_type, page).await {
                Ok(entries) => entries,
                Err(end) => return Ok(end),
            };

            if entries.is_empty() {
                debug!(
                    doc_type = %doc_type,
                    start = page.start,
                    total = discovery.entries,
                    "Empty page received"
                );
                return Ok(PaginationEnd::Exhausted);
            }

            if let Some(first_ordinal) = entries[0].id.ordinal() {
                if first_ordinal < page.start {
                    warn!(
                        doc_type = %doc_type,
                        requested_start = page.start,
                        first_ordinal,
                        first_id = %entries[0].id,
                        "Recycled data detected, stopping pagination"
                    );
                    return Ok(PaginationEnd::RecycledData {
                        requested_start: page.start,
                        first_ordinal,
                    });
                }
            }

            if self.append(doc_type, entries, checkpoint, discovery)? {
                return Ok(PaginationEnd::LimitReached);
            }
            page = page.next();
        }

        warn!(
            doc_type = %doc_type,
            max_iterations = MAX_PAGINATION_ITERATIONS,
            "Pagination iteration cap reached"
        );
        Ok(PaginationEnd::IterationCap)
    }

    /// Throttled, retried page fetch. `Err` carries the stop reason.
    async fn fetch(
        &self,
        doc_type: &DocumentType,
        page: PageRequest,
    ) -> Result<Vec<IndexEntry>, PaginationEnd> {
        if !self.interrupt.should_continue() {
            info!(doc_type = %doc_type, start = page.start, "Interrupt observed, stopping pagination");
            return Err(PaginationEnd::Interrupted);
        }

        let context = format!("{doc_type} page at {}", page.start);
        let (source, throttle) = (self.source, self.throttle);
        let result = with_retry(&self.retry, Some(self.interrupt), &context, move || async move {
            throttle.acquire().await;
            source.fetch_page(doc_type, page).await
        })
        .await;

        match result {
            Ok(entries) => {
                debug!(
                    doc_type = %doc_type,
                    start = page.start,
                    received = entries.len(),
                    "Received index page"
                );
                Ok(entries)
            }
            // Backoff was cut short by an interrupt
            Err(e) if !self.interrupt.should_continue() => {
                info!(doc_type = %doc_type, start = page.start, error = %e, "Interrupt observed during page retries");
                Err(PaginationEnd::Interrupted)
            }
            Err(e) => {
                warn!(doc_type = %doc_type, start = page.start, error = %e, "Index page fetch failed");
                Err(PaginationEnd::Failed(e))
            }
        }
    }

    /// Append a page (truncated to the limit) and persist. Returns whether
    /// the limit is now reached.
    fn append(
        &self,
        doc_type: &DocumentType,
        mut entries: Vec<IndexEntry>,
        checkpoint: &mut Checkpoint,
        discovery: &mut TypeDiscovery,
    ) -> Result<bool, StoreError> {
        if self.limit > 0 {
            entries.truncate(self.limit.saturating_sub(discovery.entries));
        }
        let added = entries.len();
        checkpoint.extend(doc_type, entries);
        self.store.save(checkpoint)?;

        discovery.pages += 1;
        discovery.entries += added;
        crate::metrics::record_index_page(doc_type.as_str(), added);

        Ok(self.limit > 0 && discovery.entries >= self.limit)
    }
}
