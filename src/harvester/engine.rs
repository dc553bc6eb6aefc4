//! Harvest run orchestration
//!
//! One call to [`HarvestEngine::run`] performs discovery, reconciliation,
//! delta computation, concurrent fetching, and batched persistence, checking
//! the interrupt coordinator between every step. Only the task driving
//! `run` mutates the item cache and ledger.

use super::config::HarvestConfig;
use super::delta::compute_work;
use super::flush::{BatchFlush, OutcomeTally};
use super::pool::WorkerPool;
use super::progress::ProgressState;
use super::throttle::{SharedThrottle, Throttle};
use super::HarvestError;
use crate::fetcher::pagination::IndexPaginator;
use crate::fetcher::{IndexSource, ItemFetcher};
use crate::resume::atomic::remove_if_exists;
use crate::resume::{CheckpointPolicy, CheckpointStore, ItemCache, ProgressLedger};
use crate::shutdown::SharedInterrupt;
use crate::{ContentPolicy, DocumentType, IndexEntry, NonEmptyContent};
use indicatif::ProgressBar;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Discovery result for one document type
#[derive(Debug, Clone, Serialize)]
pub struct TypeReport {
    /// Document type
    pub doc_type: DocumentType,
    /// Index entries known for the type after discovery
    pub entries: usize,
    /// Whether a trusted checkpoint replaced pagination
    pub from_checkpoint: bool,
    /// How pagination ended
    pub outcome: String,
}

/// What a run did
#[derive(Debug, Clone, Serialize)]
pub struct HarvestSummary {
    /// Per-type discovery results
    pub discovery: Vec<TypeReport>,
    /// Every type was fully discovered and the checkpoint removed
    pub discovery_complete: bool,
    /// Index entries discovered across all types
    pub discovered: usize,
    /// Ledger ids demoted at startup because the item cache does not back them
    pub demoted: usize,
    /// Entries already handled by earlier runs
    pub already_handled: usize,
    /// Entries selected for fetching this run
    pub work_set: usize,
    /// Outcome counts of attempted items
    #[serde(flatten)]
    pub outcomes: OutcomeTally,
    /// Work-set entries never started because of an interrupt
    pub not_started: usize,
    /// Durable writes of cache and ledger
    pub flushes: usize,
    /// An interrupt was received during the run
    pub interrupted: bool,
    /// Wall time in seconds
    pub elapsed_secs: f64,
}

impl HarvestSummary {
    /// Items that reached a worker
    pub fn attempted(&self) -> usize {
        self.outcomes.total()
    }

    /// Whether nothing is left for a follow-up run
    pub fn completed_all(&self) -> bool {
        !self.interrupted
            && self.discovery_complete
            && self.not_started == 0
            && self.outcomes.errors == 0
    }
}

impl fmt::Display for HarvestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Harvest summary")?;
        for report in &self.discovery {
            let source = if report.from_checkpoint {
                "checkpoint"
            } else {
                report.outcome.as_str()
            };
            writeln!(f, "  {:<16} {:>7} entries ({source})", report.doc_type, report.entries)?;
        }
        writeln!(f, "  discovered:      {}", self.discovered)?;
        if self.demoted > 0 {
            writeln!(f, "  demoted:         {}", self.demoted)?;
        }
        writeln!(f, "  already handled: {}", self.already_handled)?;
        writeln!(f, "  work set:        {}", self.work_set)?;
        writeln!(f, "  done:            {}", self.outcomes.done)?;
        writeln!(f, "  no content:      {}", self.outcomes.no_content)?;
        writeln!(f, "  skipped:         {}", self.outcomes.skipped)?;
        writeln!(f, "  errors:          {}", self.outcomes.errors)?;
        if self.not_started > 0 {
            writeln!(f, "  not started:     {}", self.not_started)?;
        }
        writeln!(f, "  elapsed:         {:.1}s", self.elapsed_secs)?;

        if self.interrupted {
            write!(f, "Run INTERRUPTED; progress saved, re-run to resume")
        } else if self.completed_all() {
            write!(f, "All work completed")
        } else {
            write!(f, "Run finished with work left over; re-run to retry")
        }
    }
}

struct Discovery {
    index: Vec<IndexEntry>,
    reports: Vec<TypeReport>,
    complete: bool,
    interrupted: bool,
}

/// Drives harvest runs
pub struct HarvestEngine {
    config: HarvestConfig,
    throttle: SharedThrottle,
    policy: Arc<dyn ContentPolicy>,
    progress_bar: Option<ProgressBar>,
}

impl HarvestEngine {
    /// Create an engine after validating `config`
    pub fn new(config: HarvestConfig) -> Result<Self, HarvestError> {
        config.validate()?;
        let throttle = Throttle::shared(config.throttle_interval);
        Ok(Self {
            config,
            throttle,
            policy: Arc::new(NonEmptyContent),
            progress_bar: None,
        })
    }

    /// Use an existing throttle, e.g. one shared with another run against
    /// the same host
    pub fn with_throttle(mut self, throttle: SharedThrottle) -> Self {
        self.throttle = throttle;
        self
    }

    /// Replace the default "has usable content" predicate
    pub fn with_content_policy(mut self, policy: impl ContentPolicy + 'static) -> Self {
        self.policy = Arc::new(policy);
        self
    }

    /// Advance `bar` as items complete
    pub fn with_progress_bar(mut self, bar: ProgressBar) -> Self {
        self.progress_bar = Some(bar);
        self
    }

    /// Throttle shared by pagination and item fetches
    pub fn throttle(&self) -> SharedThrottle {
        self.throttle.clone()
    }

    /// Run configuration
    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Run one harvest to completion or interruption.
    ///
    /// # Errors
    /// Only a failure to write the checkpoint, ledger, or item cache is
    /// returned. Everything else ends up in the summary.
    pub async fn run<S, F>(
        &self,
        source: &S,
        fetcher: F,
        interrupt: SharedInterrupt,
    ) -> Result<HarvestSummary, HarvestError>
    where
        S: IndexSource + ?Sized,
        F: ItemFetcher + 'static,
    {
        self.run_shared(source, Arc::new(fetcher), interrupt).await
    }

    /// [`run`](Self::run) with a fetcher that is already shared
    pub async fn run_shared<S, F>(
        &self,
        source: &S,
        fetcher: Arc<F>,
        interrupt: SharedInterrupt,
    ) -> Result<HarvestSummary, HarvestError>
    where
        S: IndexSource + ?Sized,
        F: ItemFetcher + ?Sized + 'static,
    {
        let span = info_span!(
            "harvest_run",
            data_dir = %self.config.data_dir.display(),
            workers = self.config.workers,
            limit = self.config.limit
        );
        let result = self
            .run_inner(source, fetcher, interrupt.clone())
            .instrument(span)
            .await;
        if let Err(e) = &result {
            error!(error = %e, "Harvest run aborted");
        }
        interrupt.mark_exiting();
        result
    }

    async fn run_inner<S, F>(
        &self,
        source: &S,
        fetcher: Arc<F>,
        interrupt: SharedInterrupt,
    ) -> Result<HarvestSummary, HarvestError>
    where
        S: IndexSource + ?Sized,
        F: ItemFetcher + ?Sized + 'static,
    {
        let started = Instant::now();
        let config = &self.config;

        if config.reset {
            warn!("Reset requested, wiping progress ledger and checkpoint");
            remove_if_exists(&config.ledger_path())?;
            remove_if_exists(&config.checkpoint_path())?;
        }

        let cache = ItemCache::load(&config.item_cache_path());
        let mut demoted = 0;
        let ledger = if config.verify {
            ProgressLedger::rebuild_from_cache(&cache, self.policy.as_ref())
        } else {
            let mut ledger = ProgressLedger::load(&config.ledger_path());
            demoted = ledger.reconcile(&cache, self.policy.as_ref());
            ledger
        };

        let mut flusher = BatchFlush::new(
            cache,
            ledger,
            config.item_cache_path(),
            config.ledger_path(),
            self.policy.clone(),
            config.flush_interval,
        );
        if config.verify || demoted > 0 {
            flusher.mark_dirty();
        }

        let discovery = self.discover(source, &interrupt).await?;
        let discovered = discovery.index.len();

        let mut summary = HarvestSummary {
            discovery: discovery.reports,
            discovery_complete: discovery.complete,
            discovered,
            demoted,
            already_handled: 0,
            work_set: 0,
            outcomes: OutcomeTally::default(),
            not_started: 0,
            flushes: 0,
            interrupted: false,
            elapsed_secs: 0.0,
        };

        if discovery.interrupted {
            info!("Interrupted during discovery, checkpoint kept for the next run");
            flusher.flush()?;
            summary.flushes = flusher.flushes();
            summary.interrupted = true;
            summary.elapsed_secs = started.elapsed().as_secs_f64();
            return Ok(summary);
        }

        let work = compute_work(
            &discovery.index,
            flusher.ledger(),
            flusher.cache(),
            self.policy.as_ref(),
            &config.eligible_types,
            config.limit,
        );
        summary.already_handled = work.already_handled;
        summary.work_set = work.len();
        info!(
            discovered,
            already_handled = work.already_handled,
            ineligible = work.ineligible,
            work_set = work.len(),
            "Work set computed"
        );

        let mut pool = WorkerPool::new(fetcher, self.throttle.clone(), interrupt.clone(), config.workers)
            .with_retry_policy(config.retry);
        pool.enqueue(work.entries);

        let mut progress = ProgressState::new(summary.work_set as u64, config.progress_interval);
        if let Some(bar) = &self.progress_bar {
            bar.set_length(summary.work_set as u64);
        }
        let mut flushed_on_interrupt = false;

        while let Some(completion) = pool.next_completion().await {
            if flusher.record(completion) {
                flusher.flush()?;
            }

            progress.update(1);
            if let Some(bar) = &self.progress_bar {
                bar.inc(1);
            }
            if progress.should_emit_update() {
                info!("{}", progress.format_progress());
                progress.mark_emitted();
            }

            if !interrupt.should_continue() && !flushed_on_interrupt {
                info!(
                    in_flight = pool.in_flight(),
                    not_started = pool.pending(),
                    "Interrupt observed, draining in-flight items"
                );
                flusher.flush()?;
                flushed_on_interrupt = true;
            }
        }

        flusher.flush()?;
        if let Some(bar) = &self.progress_bar {
            bar.finish();
        }

        summary.outcomes = flusher.tally();
        summary.not_started = pool.pending();
        summary.flushes = flusher.flushes();
        summary.interrupted = interrupt.was_interrupted();
        summary.elapsed_secs = started.elapsed().as_secs_f64();

        info!(
            done = summary.outcomes.done,
            no_content = summary.outcomes.no_content,
            skipped = summary.outcomes.skipped,
            errors = summary.outcomes.errors,
            not_started = summary.not_started,
            interrupted = summary.interrupted,
            "Harvest run finished"
        );
        Ok(summary)
    }

    /// Paginate every configured type, reusing trusted checkpoint slots.
    async fn discover<S>(
        &self,
        source: &S,
        interrupt: &SharedInterrupt,
    ) -> Result<Discovery, HarvestError>
    where
        S: IndexSource + ?Sized,
    {
        let config = &self.config;
        let store = CheckpointStore::new(config.checkpoint_path());
        let paginator = IndexPaginator::new(source, &self.throttle, &store, interrupt)
            .with_page_size(config.page_size)
            .with_limit(config.index_limit)
            .with_retry_policy(config.retry);

        let mut checkpoint = store.load();
        let mut reports = Vec::with_capacity(config.discover_types.len());
        let mut complete = true;
        let mut interrupted = false;

        for doc_type in &config.discover_types {
            let count = checkpoint.entry_count(doc_type);
            let page_size = checkpoint
                .first_page_size(doc_type)
                .unwrap_or(config.page_size);
            let policy = CheckpointPolicy::new(page_size);
            if policy.is_checkpoint_trustworthy(doc_type, count, config.index_limit) {
                let dropped = if config.index_limit > 0 {
                    checkpoint.truncate(doc_type, config.index_limit)
                } else {
                    0
                };
                if dropped > 0 {
                    debug!(doc_type = %doc_type, dropped, index_limit = config.index_limit, "Checkpoint slot capped at index limit");
                }
                let count = count - dropped;
                info!(doc_type = %doc_type, entries = count, "Reusing checkpointed index");
                reports.push(TypeReport {
                    doc_type: doc_type.clone(),
                    entries: count,
                    from_checkpoint: true,
                    outcome: "checkpoint".to_string(),
                });
                continue;
            }
            if count > 0 {
                warn!(
                    doc_type = %doc_type,
                    entries = count,
                    "Checkpoint slot may be truncated, re-paginating from scratch"
                );
            }

            if !interrupt.should_continue() {
                interrupted = true;
                break;
            }

            let result = paginator.paginate_type(doc_type, &mut checkpoint).await?;
            reports.push(TypeReport {
                doc_type: doc_type.clone(),
                entries: result.entries,
                from_checkpoint: false,
                outcome: result.end.describe(),
            });
            if !result.end.is_complete() {
                complete = false;
            }
            if result.end == crate::fetcher::pagination::PaginationEnd::Interrupted {
                interrupted = true;
                break;
            }
        }

        if interrupted {
            complete = false;
        }

        let index: Vec<IndexEntry> = config
            .discover_types
            .iter()
            .filter_map(|t| checkpoint.entries(t))
            .flatten()
            .cloned()
            .collect();

        if complete {
            store.clear()?;
            info!(entries = index.len(), "Discovery complete, checkpoint cleared");
        } else {
            warn!(
                entries = index.len(),
                "Discovery incomplete, checkpoint kept for the next run"
            );
        }

        Ok(Discovery {
            index,
            reports,
            complete,
            interrupted,
        })
    }
}
