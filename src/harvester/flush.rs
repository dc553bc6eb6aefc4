//! Batch flush: the single place durable state is mutated
//!
//! Completions are folded into the in-memory item cache and ledger as they
//! arrive. Both files are written together every `flush_interval`
//! completions, on interrupt, and once more when the run ends. The cache is
//! written before the ledger: a crash between the two leaves cached items the
//! ledger does not know about yet, which the delta engine already treats as
//! handled.

use super::pool::{Completion, ItemOutcome};
use crate::resume::{ItemCache, LedgerClass, ProgressLedger, StoreError};
use crate::{ContentPolicy, Item};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Per-outcome counts for one run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutcomeTally {
    /// Items fetched and cached
    pub done: usize,
    /// Empty remote resources
    pub no_content: usize,
    /// Permanently skipped items
    pub skipped: usize,
    /// Failures left for the next run
    pub errors: usize,
}

impl OutcomeTally {
    /// Sum of all outcomes
    pub fn total(&self) -> usize {
        self.done + self.no_content + self.skipped + self.errors
    }
}

/// In-memory cache and ledger with amortized persistence
pub struct BatchFlush {
    cache: ItemCache,
    ledger: ProgressLedger,
    cache_path: PathBuf,
    ledger_path: PathBuf,
    policy: Arc<dyn ContentPolicy>,
    flush_interval: usize,
    since_flush: usize,
    dirty: bool,
    flushes: usize,
    tally: OutcomeTally,
}

impl BatchFlush {
    /// Take ownership of the loaded state
    pub fn new(
        cache: ItemCache,
        ledger: ProgressLedger,
        cache_path: PathBuf,
        ledger_path: PathBuf,
        policy: Arc<dyn ContentPolicy>,
        flush_interval: usize,
    ) -> Self {
        Self {
            cache,
            ledger,
            cache_path,
            ledger_path,
            policy,
            flush_interval: flush_interval.max(1),
            since_flush: 0,
            dirty: false,
            flushes: 0,
            tally: OutcomeTally::default(),
        }
    }

    /// Force the next flush to write even without new completions, e.g.
    /// after startup reconciliation changed the ledger
    pub fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    /// Fold one completion into memory. Returns whether a flush is due.
    ///
    /// An item the content policy rejects is stored as no-content so it is
    /// not refetched forever. Failures change no state.
    pub fn record(&mut self, completion: Completion) -> bool {
        let Completion {
            entry,
            outcome,
            elapsed,
        } = completion;
        crate::metrics::record_item_outcome(entry.doc_type.as_str(), outcome.kind(), elapsed);

        match outcome {
            ItemOutcome::Success(item) if self.policy.has_usable_content(&item) => {
                self.cache.insert(entry.id.clone(), item);
                self.ledger.record(entry.id, LedgerClass::Done);
                self.tally.done += 1;
                self.dirty = true;
            }
            ItemOutcome::Success(_) => {
                debug!(id = %entry.id, "Fetched item has no usable content");
                self.cache.insert(entry.id.clone(), Item::no_content_marker());
                self.ledger.record(entry.id, LedgerClass::NoContent);
                self.tally.no_content += 1;
                self.dirty = true;
            }
            ItemOutcome::NoContent => {
                self.cache.insert(entry.id.clone(), Item::no_content_marker());
                self.ledger.record(entry.id, LedgerClass::NoContent);
                self.tally.no_content += 1;
                self.dirty = true;
            }
            ItemOutcome::Skipped(reason) => {
                info!(id = %entry.id, reason = %reason, "Item skipped");
                self.cache
                    .insert(entry.id.clone(), Item::skipped_marker(reason.label()));
                self.ledger.record(entry.id, LedgerClass::SkippedTooLarge);
                self.tally.skipped += 1;
                self.dirty = true;
            }
            ItemOutcome::Failed(_) => {
                self.tally.errors += 1;
            }
        }

        self.since_flush += 1;
        self.since_flush >= self.flush_interval
    }

    /// Write cache then ledger if anything changed since the last write,
    /// and reset the completion counter.
    ///
    /// # Errors
    /// A write failure is fatal for the run.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        let batch = self.since_flush;
        self.since_flush = 0;
        if !self.dirty {
            debug!(batch, "Nothing changed since last flush");
            return Ok(());
        }

        let start = Instant::now();
        self.cache.save(&self.cache_path)?;
        self.ledger.save(&self.ledger_path)?;
        self.dirty = false;
        self.flushes += 1;

        crate::metrics::record_flush(batch, start.elapsed());
        info!(
            batch,
            cached = self.cache.len(),
            done = self.ledger.done().len(),
            no_content = self.ledger.no_content().len(),
            skipped_too_large = self.ledger.skipped_too_large().len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Flushed item cache and progress ledger"
        );
        Ok(())
    }

    /// Completions since the last flush
    pub fn pending(&self) -> usize {
        self.since_flush
    }

    /// Writes performed so far
    pub fn flushes(&self) -> usize {
        self.flushes
    }

    /// Outcome counts so far
    pub fn tally(&self) -> OutcomeTally {
        self.tally
    }

    /// In-memory ledger
    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    /// In-memory item cache
    pub fn cache(&self) -> &ItemCache {
        &self.cache
    }
}
