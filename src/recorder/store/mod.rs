//! Entry persistence
//!
//! Stores keep a main index ordered by creation time plus one secondary
//! index per tag. Entries are never updated, only appended and cleared.

mod memory;
mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use super::content::EntryType;
use super::entry::Entry;
use crate::error::{RecorderError, Result};
use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default page size for entry listings
pub const DEFAULT_LIMIT: usize = 50;

/// Filter for entry listings
///
/// Results are ordered newest first; entries created in the same millisecond
/// keep the order they were recorded in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryQuery {
    pub entry_type: Option<EntryType>,
    pub tag: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

impl Default for EntryQuery {
    fn default() -> Self {
        Self {
            entry_type: None,
            tag: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }
}

impl EntryQuery {
    pub fn of_type(mut self, entry_type: EntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// Counts kept by a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStatistics {
    pub total_entries: u64,
    pub entries_by_type: BTreeMap<String, u64>,
    pub entries_by_tag: BTreeMap<String, u64>,
}

/// Result of clearing entries
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ClearOutcome {
    /// Entries removed from the main index
    pub entries_deleted: u64,
    /// Tag index rows removed, including orphans from earlier passes
    pub tag_rows_deleted: u64,
    /// Set when the tag indices could not be cleaned this pass
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag_index_error: Option<String>,
}

/// Backend holding recorded entries
#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Short backend name for logs and statistics
    fn name(&self) -> &'static str;

    /// Persist entries as one logical write
    ///
    /// An entry whose uuid is already stored is left untouched.
    async fn append(&self, entries: &[Entry]) -> Result<()>;

    /// List entries matching `query`, newest first
    async fn entries(&self, query: &EntryQuery) -> Result<Vec<Entry>>;

    /// Fetch one entry by uuid
    async fn entry(&self, uuid: &str) -> Result<Option<Entry>>;

    /// Remove entries created strictly before `before` (all when `None`)
    ///
    /// The main index is cleaned first. A tag index failure is reported in
    /// the outcome rather than as an error; its orphans are swept on the
    /// next pass.
    async fn clear_before(&self, before: Option<u64>) -> Result<ClearOutcome>;

    async fn statistics(&self) -> Result<StoreStatistics>;
}

/// Open the store named by `url`
///
/// `sqlite:<path>` and `sqlite::memory:` open a SQLite store; `memory`
/// opens a process-local store.
pub async fn connect(url: &str) -> Result<Arc<dyn EntryStore>> {
    let url = url.trim();

    if url.eq_ignore_ascii_case("memory") || url.eq_ignore_ascii_case("memory:") {
        return Ok(Arc::new(MemoryStore::new()));
    }

    if url.starts_with("sqlite:") {
        return Ok(Arc::new(SqliteStore::connect(url).await?));
    }

    Err(RecorderError::Configuration(format!(
        "unsupported store url '{}' (expected 'sqlite:<path>' or 'memory')",
        url
    )))
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::recorder::content::{CacheAction, CacheContent, Extra, QueryContent};
    use crate::recorder::entry::Entry;

    pub fn cache_entry(key: &str, created_at: u64, tags: &[&str]) -> Entry {
        Entry::new(
            CacheContent {
                action: CacheAction::Hit,
                key: key.to_string(),
                value: None,
                ttl_secs: None,
                extra: Extra::new(),
            },
            tags.iter().copied(),
            None,
            true,
        )
        .with_batch_id("batch")
        .with_created_at(created_at)
    }

    pub fn query_entry(sql: &str, created_at: u64, tags: &[&str]) -> Entry {
        Entry::new(
            QueryContent {
                connection: "main".to_string(),
                sql: sql.to_string(),
                bindings: vec![],
                duration_ms: 1,
                slow: false,
                extra: Extra::new(),
            },
            tags.iter().copied(),
            None,
            true,
        )
        .with_batch_id("batch")
        .with_created_at(created_at)
    }
}
