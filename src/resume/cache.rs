//! Item cache: fetched detail records keyed by entry id

use super::atomic::{read_json_lenient, write_json_atomic};
use super::StoreError;
use crate::{ContentPolicy, EntryId, Item, Sentinel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

/// Persisted items, one JSON document keyed by id
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemCache {
    items: BTreeMap<EntryId, Item>,
}

impl ItemCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self::default()
    }

    /// Load from `path`; missing or corrupt files yield an empty cache
    pub fn load(path: &Path) -> Self {
        let cache: ItemCache = read_json_lenient(path, None, "item cache");
        info!(path = %path.display(), items = cache.len(), "Item cache loaded");
        cache
    }

    /// Atomically write the cache to `path`
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        write_json_atomic(path, self)
    }

    /// Insert or replace the item for `id`
    pub fn insert(&mut self, id: EntryId, item: Item) -> Option<Item> {
        self.items.insert(id, item)
    }

    /// Item stored for `id`
    pub fn get(&self, id: &EntryId) -> Option<&Item> {
        self.items.get(id)
    }

    /// Whether `id` has an item the policy accepts
    pub fn has_usable(&self, id: &EntryId, policy: &dyn ContentPolicy) -> bool {
        self.items
            .get(id)
            .is_some_and(|item| policy.has_usable_content(item))
    }

    /// Marker stored for `id`, if its entry is one
    pub fn sentinel(&self, id: &EntryId) -> Option<Sentinel> {
        self.items.get(id).and_then(Item::sentinel)
    }

    /// Ids whose items the policy accepts
    pub fn usable_ids<'a>(
        &'a self,
        policy: &'a dyn ContentPolicy,
    ) -> impl Iterator<Item = &'a EntryId> + 'a {
        self.items
            .iter()
            .filter(move |(_, item)| policy.has_usable_content(item))
            .map(|(id, _)| id)
    }

    /// All entries
    pub fn iter(&self) -> impl Iterator<Item = (&EntryId, &Item)> {
        self.items.iter()
    }

    /// Number of cached entries, sentinels included
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the cache holds nothing
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
