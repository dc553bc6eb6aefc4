//! Progress ledger: terminal outcomes per entry across runs
//!
//! The ledger and the item cache are separate files that are not written
//! transactionally, so every startup reconciles them (see
//! [`ProgressLedger::reconcile`]).

use super::atomic::{read_json, write_json_atomic};
use super::cache::ItemCache;
use super::{StoreError, MAX_STATE_FILE_SIZE};
use crate::{ContentPolicy, EntryId, Sentinel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// Current ledger schema version
const SCHEMA_VERSION: &str = "1.0.0";

/// Terminal classification of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerClass {
    /// Item fetched and cached
    Done,
    /// Remote resource had nothing to fetch
    NoContent,
    /// Over the configured byte ceiling
    SkippedTooLarge,
}

/// Durable record of which entries reached a terminal outcome
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressLedger {
    schema_version: String,
    done: BTreeSet<EntryId>,
    no_content: BTreeSet<EntryId>,
    skipped_too_large: BTreeSet<EntryId>,
    updated_at: DateTime<Utc>,
}

impl Default for ProgressLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for ProgressLedger {
    /// Set equality only; `updated_at` is bookkeeping
    fn eq(&self, other: &Self) -> bool {
        self.done == other.done
            && self.no_content == other.no_content
            && self.skipped_too_large == other.skipped_too_large
    }
}

impl ProgressLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            done: BTreeSet::new(),
            no_content: BTreeSet::new(),
            skipped_too_large: BTreeSet::new(),
            updated_at: Utc::now(),
        }
    }

    /// Entries with cached content
    pub fn done(&self) -> &BTreeSet<EntryId> {
        &self.done
    }

    /// Entries whose remote resource was empty
    pub fn no_content(&self) -> &BTreeSet<EntryId> {
        &self.no_content
    }

    /// Entries skipped for size
    pub fn skipped_too_large(&self) -> &BTreeSet<EntryId> {
        &self.skipped_too_large
    }

    /// Time of the last mutation
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Classification recorded for `id`
    pub fn class_of(&self, id: &EntryId) -> Option<LedgerClass> {
        if self.done.contains(id) {
            Some(LedgerClass::Done)
        } else if self.skipped_too_large.contains(id) {
            Some(LedgerClass::SkippedTooLarge)
        } else if self.no_content.contains(id) {
            Some(LedgerClass::NoContent)
        } else {
            None
        }
    }

    /// Whether `id` reached any terminal outcome
    pub fn is_handled(&self, id: &EntryId) -> bool {
        self.class_of(id).is_some()
    }

    /// Record `id` under `class`, removing it from the other sets
    pub fn record(&mut self, id: EntryId, class: LedgerClass) {
        self.done.remove(&id);
        self.no_content.remove(&id);
        self.skipped_too_large.remove(&id);
        match class {
            LedgerClass::Done => self.done.insert(id),
            LedgerClass::NoContent => self.no_content.insert(id),
            LedgerClass::SkippedTooLarge => self.skipped_too_large.insert(id),
        };
        self.updated_at = Utc::now();
    }

    /// Total entries across all three sets
    pub fn total(&self) -> usize {
        self.done.len() + self.no_content.len() + self.skipped_too_large.len()
    }

    /// Restore pairwise disjointness. Precedence: done, then skipped, then
    /// no-content. Returns the number of ids removed from a lower set.
    pub fn normalize(&mut self) -> usize {
        let mut fixed = 0;
        for id in &self.done {
            fixed += usize::from(self.skipped_too_large.remove(id));
            fixed += usize::from(self.no_content.remove(id));
        }
        for id in &self.skipped_too_large {
            fixed += usize::from(self.no_content.remove(id));
        }
        fixed
    }

    /// Demote every id the cache does not back to to-do. Returns the number
    /// of demotions.
    ///
    /// A `done` id needs usable content. A `no_content` or
    /// `skipped_too_large` id needs its marker (or usable content, which
    /// only a later fetch can have written).
    pub fn reconcile(&mut self, cache: &ItemCache, policy: &dyn ContentPolicy) -> usize {
        let backed = |id: &EntryId, marker: Option<Sentinel>| {
            cache.has_usable(id, policy)
                || (marker.is_some() && cache.sentinel(id) == marker)
        };

        let stale_done: Vec<EntryId> = self
            .done
            .iter()
            .filter(|&id| !backed(id, None))
            .cloned()
            .collect();
        let stale_no_content: Vec<EntryId> = self
            .no_content
            .iter()
            .filter(|&id| !backed(id, Some(Sentinel::NoContent)))
            .cloned()
            .collect();
        let stale_skipped: Vec<EntryId> = self
            .skipped_too_large
            .iter()
            .filter(|&id| !backed(id, Some(Sentinel::Skipped)))
            .cloned()
            .collect();

        for id in &stale_done {
            debug!(id = %id, "Ledger marks entry done but cache has no usable item");
            self.done.remove(id);
        }
        for id in &stale_no_content {
            debug!(id = %id, "Ledger marks entry empty but cache has no marker");
            self.no_content.remove(id);
        }
        for id in &stale_skipped {
            debug!(id = %id, "Ledger marks entry skipped but cache has no marker");
            self.skipped_too_large.remove(id);
        }

        let demoted = stale_done.len() + stale_no_content.len() + stale_skipped.len();
        if demoted > 0 {
            self.updated_at = Utc::now();
            warn!(
                demoted,
                done = stale_done.len(),
                no_content = stale_no_content.len(),
                skipped_too_large = stale_skipped.len(),
                "Demoted ledger entries the item cache does not back to to-do"
            );
        }
        demoted
    }

    /// Build a ledger from what the cache actually contains, ignoring any
    /// ledger file
    pub fn rebuild_from_cache(cache: &ItemCache, policy: &dyn ContentPolicy) -> Self {
        let mut ledger = Self::new();
        for (id, item) in cache.iter() {
            if policy.has_usable_content(item) {
                ledger.done.insert(id.clone());
            } else {
                match item.sentinel() {
                    Some(Sentinel::NoContent) => {
                        ledger.no_content.insert(id.clone());
                    }
                    Some(Sentinel::Skipped) => {
                        ledger.skipped_too_large.insert(id.clone());
                    }
                    None => {}
                }
            }
        }
        info!(
            done = ledger.done.len(),
            no_content = ledger.no_content.len(),
            skipped_too_large = ledger.skipped_too_large.len(),
            "Rebuilt progress ledger from item cache"
        );
        ledger
    }

    /// Atomically write the ledger to `path`
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }

    /// Load the ledger from `path`
    ///
    /// Missing, corrupt, oversized, or foreign-version files yield an empty
    /// ledger. Overlapping sets are normalized.
    pub fn load(path: &Path) -> Self {
        let mut ledger = match read_json::<ProgressLedger>(path, Some(MAX_STATE_FILE_SIZE)) {
            Ok(Some(ledger)) if ledger.schema_version == SCHEMA_VERSION => ledger,
            Ok(Some(ledger)) => {
                warn!(
                    found_version = %ledger.schema_version,
                    expected_version = SCHEMA_VERSION,
                    "Progress ledger schema version mismatch, starting empty"
                );
                return Self::new();
            }
            Ok(None) => {
                debug!(path = %path.display(), "No progress ledger found, starting empty");
                return Self::new();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unreadable progress ledger, starting empty");
                return Self::new();
            }
        };

        let fixed = ledger.normalize();
        if fixed > 0 {
            warn!(fixed, "Progress ledger had overlapping sets, normalized");
        }

        info!(
            done = ledger.done.len(),
            no_content = ledger.no_content.len(),
            skipped_too_large = ledger.skipped_too_large.len(),
            updated_at = %ledger.updated_at.to_rfc3339(),
            "Progress ledger loaded"
        );
        ledger
    }
}
