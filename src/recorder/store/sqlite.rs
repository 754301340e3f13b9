//! SQLite entry store
//!
//! - Connection pooling with WAL mode for concurrent reads during writes
//! - Automatic migrations
//! - One transaction per appended batch
//! - Tag indices in a separate table joined on uuid

use super::{ClearOutcome, EntryQuery, EntryStore, StoreStatistics};
use crate::error::Result;
use crate::recorder::entry::Entry;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::str::FromStr;
use std::time::Duration;

/// SQLite-backed [`EntryStore`]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (and create if missing) the database and run migrations
    ///
    /// # Example
    ///
    /// ```ignore
    /// let store = SqliteStore::connect("sqlite:./data/recorder.db").await?;
    /// ```
    pub async fn connect(database_url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(30))
            .pragma("temp_store", "memory")
            .pragma("synchronous", "NORMAL");

        // An in-memory database lives only as long as its connection
        let in_memory = database_url.contains(":memory:") || database_url.contains("mode=memory");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None::<Duration>)
                .max_lifetime(None::<Duration>)
        } else {
            SqlitePoolOptions::new().max_connections(5)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await?;

        sqlx::migrate!("./migrations").run(&pool).await?;
        tracing::info!(database_url = %database_url, "Recorder database migrations completed");

        Ok(Self { pool })
    }

    /// Underlying connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn clear_tag_index(&self, before: Option<u64>) -> Result<u64> {
        let by_range = match before {
            Some(cutoff) => {
                sqlx::query("DELETE FROM entry_tags WHERE created_at < ?")
                    .bind(cutoff as i64)
                    .execute(&self.pool)
                    .await?
            }
            None => sqlx::query("DELETE FROM entry_tags").execute(&self.pool).await?,
        };

        // Rows left behind by an earlier pass that failed half way
        let orphans = sqlx::query(
            "DELETE FROM entry_tags WHERE NOT EXISTS
             (SELECT 1 FROM entries e WHERE e.uuid = entry_tags.uuid)",
        )
        .execute(&self.pool)
        .await?;

        Ok(by_range.rows_affected() + orphans.rows_affected())
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    async fn append(&self, entries: &[Entry]) -> Result<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for entry in entries {
            let payload = serde_json::to_string(entry)?;

            sqlx::query(
                "INSERT OR IGNORE INTO entries (uuid, batch_id, entry_type, family_hash, created_at, payload)
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(entry.uuid())
            .bind(entry.batch_id())
            .bind(entry.entry_type().as_str())
            .bind(entry.family_hash())
            .bind(entry.created_at() as i64)
            .bind(&payload)
            .execute(&mut *tx)
            .await?;

            for tag in entry.tags() {
                sqlx::query("INSERT OR IGNORE INTO entry_tags (tag, uuid, created_at) VALUES (?, ?, ?)")
                    .bind(tag)
                    .bind(entry.uuid())
                    .bind(entry.created_at() as i64)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        tx.commit().await?;

        Ok(())
    }

    async fn entries(&self, query: &EntryQuery) -> Result<Vec<Entry>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT e.payload FROM entries e");

        if let Some(tag) = &query.tag {
            builder.push(" JOIN entry_tags t ON t.uuid = e.uuid AND t.tag = ");
            builder.push_bind(tag.as_str());
        }
        if let Some(entry_type) = query.entry_type {
            builder.push(" WHERE e.entry_type = ");
            builder.push_bind(entry_type.as_str());
        }

        builder.push(" ORDER BY e.created_at DESC, e.seq DESC LIMIT ");
        builder.push_bind(query.limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(query.offset as i64);

        let rows = builder.build().fetch_all(&self.pool).await?;

        let entries = rows
            .into_iter()
            .filter_map(|row| {
                let payload: String = row.get("payload");
                match serde_json::from_str::<Entry>(&payload) {
                    Ok(entry) => Some(entry),
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping undecodable entry row");
                        None
                    }
                }
            })
            .collect();

        Ok(entries)
    }

    async fn entry(&self, uuid: &str) -> Result<Option<Entry>> {
        let payload: Option<String> = sqlx::query_scalar("SELECT payload FROM entries WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;

        match payload {
            Some(payload) => Ok(Some(serde_json::from_str(&payload)?)),
            None => Ok(None),
        }
    }

    async fn clear_before(&self, before: Option<u64>) -> Result<ClearOutcome> {
        let entries_deleted = match before {
            Some(cutoff) => {
                sqlx::query("DELETE FROM entries WHERE created_at < ?")
                    .bind(cutoff as i64)
                    .execute(&self.pool)
                    .await?
            }
            None => sqlx::query("DELETE FROM entries").execute(&self.pool).await?,
        }
        .rows_affected();

        let outcome = match self.clear_tag_index(before).await {
            Ok(tag_rows_deleted) => ClearOutcome {
                entries_deleted,
                tag_rows_deleted,
                tag_index_error: None,
            },
            Err(e) => ClearOutcome {
                entries_deleted,
                tag_rows_deleted: 0,
                tag_index_error: Some(e.to_string()),
            },
        };

        Ok(outcome)
    }

    async fn statistics(&self) -> Result<StoreStatistics> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM entries")
            .fetch_one(&self.pool)
            .await?;

        let by_type: Vec<(String, i64)> =
            sqlx::query_as("SELECT entry_type, COUNT(*) FROM entries GROUP BY entry_type")
                .fetch_all(&self.pool)
                .await?;

        let by_tag: Vec<(String, i64)> =
            sqlx::query_as("SELECT tag, COUNT(*) FROM entry_tags GROUP BY tag")
                .fetch_all(&self.pool)
                .await?;

        Ok(StoreStatistics {
            total_entries: total as u64,
            entries_by_type: by_type.into_iter().map(|(t, n)| (t, n as u64)).collect(),
            entries_by_tag: by_tag.into_iter().map(|(t, n)| (t, n as u64)).collect(),
        })
    }
}
