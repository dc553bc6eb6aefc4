//! Pagination checkpoints for crash recovery
//!
//! A checkpoint only ever holds index state (cheap to re-derive), never
//! fetched item detail. It is rewritten after every page and removed once
//! discovery finishes for all types.

use super::atomic::{read_json_lenient, remove_if_exists, write_json_atomic};
use super::{StoreError, MAX_STATE_FILE_SIZE};
use crate::{DocumentType, IndexEntry};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Entries discovered for one document type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckpointSlot {
    /// Size of the first page pagination requested for the type; 0 when
    /// unknown
    #[serde(default)]
    pub first_page_size: usize,
    /// Entries in discovery order
    pub entries: Vec<IndexEntry>,
}

/// Snapshot of pagination progress, keyed by document type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint {
    per_type: BTreeMap<DocumentType, CheckpointSlot>,
}

impl Checkpoint {
    /// Create an empty checkpoint
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries recorded for `doc_type`
    pub fn entries(&self, doc_type: &DocumentType) -> Option<&[IndexEntry]> {
        self.per_type.get(doc_type).map(|slot| slot.entries.as_slice())
    }

    /// Number of entries recorded for `doc_type`
    pub fn entry_count(&self, doc_type: &DocumentType) -> usize {
        self.per_type.get(doc_type).map_or(0, |slot| slot.entries.len())
    }

    /// Page size the slot for `doc_type` was paginated with, if recorded
    pub fn first_page_size(&self, doc_type: &DocumentType) -> Option<usize> {
        self.per_type
            .get(doc_type)
            .map(|slot| slot.first_page_size)
            .filter(|&size| size > 0)
    }

    /// Replace `doc_type`'s slot with an empty one for a fresh pagination
    /// whose first page holds up to `first_page_size` entries
    pub fn restart(&mut self, doc_type: &DocumentType, first_page_size: usize) {
        self.per_type.insert(
            doc_type.clone(),
            CheckpointSlot {
                first_page_size,
                entries: Vec::new(),
            },
        );
    }

    /// Append a page worth of entries to `doc_type`'s slot
    pub fn extend(&mut self, doc_type: &DocumentType, entries: impl IntoIterator<Item = IndexEntry>) {
        self.per_type
            .entry(doc_type.clone())
            .or_default()
            .entries
            .extend(entries);
    }

    /// Keep at most `limit` entries for `doc_type`. Returns how many were
    /// dropped.
    pub fn truncate(&mut self, doc_type: &DocumentType, limit: usize) -> usize {
        match self.per_type.get_mut(doc_type) {
            Some(slot) if slot.entries.len() > limit => {
                let dropped = slot.entries.len() - limit;
                slot.entries.truncate(limit);
                dropped
            }
            _ => 0,
        }
    }

    /// Document types present in the checkpoint
    pub fn types(&self) -> impl Iterator<Item = &DocumentType> {
        self.per_type.keys()
    }

    /// Total entries across all types
    pub fn total_entries(&self) -> usize {
        self.per_type.values().map(|slot| slot.entries.len()).sum()
    }

    /// Whether nothing is recorded
    pub fn is_empty(&self) -> bool {
        self.per_type.is_empty()
    }
}

/// Decides whether a loaded checkpoint slot can stand in for re-paginating
#[derive(Debug, Clone, Copy)]
pub struct CheckpointPolicy {
    page_size: usize,
}

impl CheckpointPolicy {
    /// Create a policy for a slot whose first page held up to `page_size`
    /// entries
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
        }
    }

    /// Whether `entry_count` checkpointed entries for `doc_type` are complete
    /// enough to skip pagination.
    ///
    /// - bounded request (`limit > 0`): trusted once it holds `limit` entries
    /// - unbounded request (`limit == 0`): trusted only with more than one
    ///   page; exactly one page is indistinguishable from a run that died
    ///   after the first page
    ///
    /// "One page" is the page size the slot was paginated with, which for a
    /// source with known boundaries may differ from the configured size.
    pub fn is_checkpoint_trustworthy(
        &self,
        doc_type: &DocumentType,
        entry_count: usize,
        limit: usize,
    ) -> bool {
        let trusted = if entry_count == 0 {
            false
        } else if limit > 0 {
            entry_count >= limit
        } else {
            entry_count > self.page_size
        };

        debug!(
            doc_type = %doc_type,
            entry_count,
            limit,
            page_size = self.page_size,
            trusted,
            "Checkpoint completeness check"
        );
        trusted
    }
}

/// On-disk home of the checkpoint
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    /// Store backed by `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// File location
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the checkpoint; a missing or malformed file yields an empty one
    pub fn load(&self) -> Checkpoint {
        let checkpoint: Checkpoint =
            read_json_lenient(&self.path, Some(MAX_STATE_FILE_SIZE), "checkpoint");
        if !checkpoint.is_empty() {
            info!(
                types = checkpoint.per_type.len(),
                entries = checkpoint.total_entries(),
                "Loaded pagination checkpoint"
            );
        }
        checkpoint
    }

    /// Atomically write the full checkpoint
    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), StoreError> {
        write_json_atomic(&self.path, checkpoint)
    }

    /// Remove the checkpoint after discovery completed
    pub fn clear(&self) -> Result<(), StoreError> {
        remove_if_exists(&self.path)?;
        debug!(path = %self.path.display(), "Checkpoint cleared");
        Ok(())
    }
}
