//! Recorded entry and its wire form
//!
//! An [`Entry`] is immutable once built: the only transformation is stamping
//! the batch id, which consumes the entry and returns a new one.

use super::content::{EntryContent, EntryType};
use crate::error::RecorderError;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// A single recorded event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "EntryRecord")]
pub struct Entry {
    uuid: String,
    batch_id: String,
    family_hash: Option<String>,
    should_display_on_index: bool,
    content: EntryContent,
    tags: BTreeSet<String>,
    created_at: u64,
}

impl Entry {
    /// Build a new entry with a fresh uuid and the current time
    ///
    /// The batch id stays empty until the recorder stamps it.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let entry = Entry::new(
    ///     CacheContent { action: CacheAction::Hit, key: "user:1".into(), .. },
    ///     ["hit"],
    ///     Some(family_hash(&["cache", "user:1"])),
    ///     true,
    /// );
    /// ```
    pub fn new<C, I, T>(
        content: C,
        tags: I,
        family_hash: Option<String>,
        should_display_on_index: bool,
    ) -> Self
    where
        C: Into<EntryContent>,
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            uuid: Uuid::new_v4().to_string(),
            batch_id: String::new(),
            family_hash,
            should_display_on_index,
            content: content.into(),
            tags: tags
                .into_iter()
                .map(Into::<String>::into)
                .filter(|tag| !tag.is_empty())
                .collect(),
            created_at: current_millis(),
        }
    }

    /// Return this entry stamped with `batch_id`
    pub fn with_batch_id(self, batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            ..self
        }
    }

    /// Return this entry with a different creation time (Unix milliseconds)
    pub fn with_created_at(self, created_at: u64) -> Self {
        Self { created_at, ..self }
    }

    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    pub fn entry_type(&self) -> EntryType {
        self.content.entry_type()
    }

    pub fn family_hash(&self) -> Option<&str> {
        self.family_hash.as_deref()
    }

    pub fn should_display_on_index(&self) -> bool {
        self.should_display_on_index
    }

    pub fn content(&self) -> &EntryContent {
        &self.content
    }

    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Creation time in Unix milliseconds
    pub fn created_at(&self) -> u64 {
        self.created_at
    }
}

/// Borrowed view used for serialization
#[derive(Serialize)]
struct EntryView<'a> {
    uuid: &'a str,
    batch_id: &'a str,
    #[serde(rename = "type")]
    entry_type: EntryType,
    family_hash: Option<&'a str>,
    should_display_on_index: bool,
    content: &'a EntryContent,
    tags: &'a BTreeSet<String>,
    created_at: u64,
}

impl Serialize for Entry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        EntryView {
            uuid: &self.uuid,
            batch_id: &self.batch_id,
            entry_type: self.entry_type(),
            family_hash: self.family_hash.as_deref(),
            should_display_on_index: self.should_display_on_index,
            content: &self.content,
            tags: &self.tags,
            created_at: self.created_at,
        }
        .serialize(serializer)
    }
}

/// Owned wire form; `content` is decoded against `type`
#[derive(Deserialize)]
struct EntryRecord {
    uuid: String,
    #[serde(default)]
    batch_id: String,
    #[serde(rename = "type")]
    entry_type: EntryType,
    #[serde(default)]
    family_hash: Option<String>,
    #[serde(default)]
    should_display_on_index: bool,
    content: serde_json::Value,
    #[serde(default)]
    tags: BTreeSet<String>,
    created_at: u64,
}

impl TryFrom<EntryRecord> for Entry {
    type Error = RecorderError;

    fn try_from(record: EntryRecord) -> Result<Self, Self::Error> {
        let content = EntryContent::from_value(record.entry_type, record.content).map_err(|e| {
            RecorderError::InvalidEntry(format!(
                "{} content of entry {}: {}",
                record.entry_type, record.uuid, e
            ))
        })?;

        Ok(Self {
            uuid: record.uuid,
            batch_id: record.batch_id,
            family_hash: record.family_hash,
            should_display_on_index: record.should_display_on_index,
            content,
            tags: record.tags,
            created_at: record.created_at,
        })
    }
}

/// Current time in Unix milliseconds
pub fn current_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
