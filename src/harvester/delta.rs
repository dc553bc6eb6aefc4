//! Delta engine: which discovered entries still need fetching

use crate::resume::{ItemCache, ProgressLedger};
use crate::{ContentPolicy, DocumentType, EntryId, IndexEntry};
use std::collections::HashSet;
use tracing::debug;

/// Work set for one run plus how the index was narrowed down
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkSet {
    /// Entries to fetch, sorted by `(doc_type, id)`
    pub entries: Vec<IndexEntry>,
    /// Index entries already accounted for by the ledger or the cache
    pub already_handled: usize,
    /// Index entries of types not eligible for fetching
    pub ineligible: usize,
    /// Repeated ids dropped from the index
    pub duplicates: usize,
    /// Entries cut by the limit
    pub truncated: usize,
}

impl WorkSet {
    /// Number of entries to fetch
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there is nothing to fetch
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Compute the exact set of entries to fetch this run.
///
/// An entry is excluded when its type is not in `eligible_types` (an empty
/// list allows every type), or when its id is in any ledger set or has
/// usable content in `cache`. The rest is sorted by `(doc_type, id)` and
/// truncated to `limit` (0 = unlimited).
pub fn compute_work(
    index: &[IndexEntry],
    ledger: &ProgressLedger,
    cache: &ItemCache,
    policy: &dyn ContentPolicy,
    eligible_types: &[DocumentType],
    limit: usize,
) -> WorkSet {
    let mut handled: HashSet<&EntryId> = ledger
        .done()
        .iter()
        .chain(ledger.no_content())
        .chain(ledger.skipped_too_large())
        .collect();
    handled.extend(cache.usable_ids(policy));

    let mut work = WorkSet::default();
    let mut seen: HashSet<&EntryId> = HashSet::with_capacity(index.len());

    for entry in index {
        if !seen.insert(&entry.id) {
            work.duplicates += 1;
            continue;
        }
        if !eligible_types.is_empty() && !eligible_types.contains(&entry.doc_type) {
            work.ineligible += 1;
        } else if handled.contains(&entry.id) {
            work.already_handled += 1;
        } else {
            work.entries.push(entry.clone());
        }
    }

    work.entries
        .sort_by(|a, b| (&a.doc_type, &a.id).cmp(&(&b.doc_type, &b.id)));

    if limit > 0 && work.entries.len() > limit {
        work.truncated = work.entries.len() - limit;
        work.entries.truncate(limit);
    }

    debug!(
        index = index.len(),
        work = work.entries.len(),
        already_handled = work.already_handled,
        ineligible = work.ineligible,
        duplicates = work.duplicates,
        truncated = work.truncated,
        "Computed work set"
    );
    work
}
