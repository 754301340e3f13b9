//! Process-local entry store
//!
//! Keeps the main index and one ordered index per tag in memory. Useful for
//! tests and for embedding the recorder without a database file.

use super::{ClearOutcome, EntryQuery, EntryStore, StoreStatistics};
use crate::error::Result;
use crate::recorder::entry::Entry;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// Position of an entry: creation time, then insertion sequence
type Position = (u64, u64);

#[derive(Default)]
struct Indices {
    next_seq: u64,
    main: BTreeMap<Position, Entry>,
    by_uuid: HashMap<String, Position>,
    tags: HashMap<String, BTreeMap<Position, String>>,
}

impl Indices {
    fn sweep_tag_orphans(&mut self) -> u64 {
        let main = &self.main;
        let mut removed = 0;
        for index in self.tags.values_mut() {
            let before = index.len();
            index.retain(|position, _| main.contains_key(position));
            removed += (before - index.len()) as u64;
        }
        self.tags.retain(|_, index| !index.is_empty());
        removed
    }
}

/// In-memory [`EntryStore`]
#[derive(Default)]
pub struct MemoryStore {
    indices: RwLock<Indices>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn append(&self, entries: &[Entry]) -> Result<()> {
        let mut indices = self.indices.write().await;

        for entry in entries {
            if indices.by_uuid.contains_key(entry.uuid()) {
                continue;
            }

            let position = (entry.created_at(), indices.next_seq);
            indices.next_seq += 1;

            for tag in entry.tags() {
                indices
                    .tags
                    .entry(tag.clone())
                    .or_default()
                    .insert(position, entry.uuid().to_string());
            }
            indices.by_uuid.insert(entry.uuid().to_string(), position);
            indices.main.insert(position, entry.clone());
        }

        Ok(())
    }

    async fn entries(&self, query: &EntryQuery) -> Result<Vec<Entry>> {
        let indices = self.indices.read().await;

        // A tag alone walks its own index; other filters scan the main index
        let entries = match (&query.tag, query.entry_type) {
            (Some(tag), None) => indices
                .tags
                .get(tag)
                .into_iter()
                .flat_map(|index| index.keys().rev())
                .filter_map(|position| indices.main.get(position))
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
            (tag, entry_type) => indices
                .main
                .values()
                .rev()
                .filter(|entry| entry_type.map_or(true, |t| entry.entry_type() == t))
                .filter(|entry| tag.as_deref().map_or(true, |t| entry.has_tag(t)))
                .skip(query.offset)
                .take(query.limit)
                .cloned()
                .collect(),
        };

        Ok(entries)
    }

    async fn entry(&self, uuid: &str) -> Result<Option<Entry>> {
        let indices = self.indices.read().await;
        Ok(indices
            .by_uuid
            .get(uuid)
            .and_then(|position| indices.main.get(position))
            .cloned())
    }

    async fn clear_before(&self, before: Option<u64>) -> Result<ClearOutcome> {
        let mut indices = self.indices.write().await;

        let removed = match before {
            Some(cutoff) => {
                let kept = indices.main.split_off(&(cutoff, 0));
                std::mem::replace(&mut indices.main, kept)
            }
            None => std::mem::take(&mut indices.main),
        };
        for entry in removed.values() {
            indices.by_uuid.remove(entry.uuid());
        }

        let tag_rows_deleted = indices.sweep_tag_orphans();

        Ok(ClearOutcome {
            entries_deleted: removed.len() as u64,
            tag_rows_deleted,
            tag_index_error: None,
        })
    }

    async fn statistics(&self) -> Result<StoreStatistics> {
        let indices = self.indices.read().await;

        let mut entries_by_type = BTreeMap::new();
        for entry in indices.main.values() {
            *entries_by_type
                .entry(entry.entry_type().as_str().to_string())
                .or_insert(0) += 1;
        }

        let entries_by_tag = indices
            .tags
            .iter()
            .map(|(tag, index)| (tag.clone(), index.len() as u64))
            .collect();

        Ok(StoreStatistics {
            total_entries: indices.main.len() as u64,
            entries_by_type,
            entries_by_tag,
        })
    }
}
