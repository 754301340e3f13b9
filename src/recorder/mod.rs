//! Event recorder
//!
//! This module provides the recorder core:
//! - Entries and their per-family content
//! - Per-task batches so one unit of work is persisted together
//! - Family hashing of similar entries
//! - Stores (SQLite, in-memory) behind an async batch writer
//! - Retention cleanup

mod batch;
pub mod cleanup;
mod content;
mod entry;
mod family;
pub mod store;
mod writer;

pub use batch::BatchContext;
pub use cleanup::{run_cleanup_now, spawn_cleanup_task, CleanupConfig};
pub use content::{
    bounded_text, bounded_value, to_bounded_value, truncate, CacheAction, CacheContent,
    CommandContent, EntryContent, EntryType, ExceptionContent, Extra, JobContent, JobStatus,
    MailContent, NotificationContent, QueryContent, RedisContent, RequestContent,
};
pub use entry::{current_millis, Entry};
pub use family::{family_hash, DefaultNormalizer, FamilyNormalizer};
pub use store::{EntryQuery, EntryStore, MemoryStore, SqliteStore, StoreStatistics};
pub use writer::{AsyncWriter, WriterConfig};

use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::watchers::command::PendingCommands;
use crate::watchers::{
    CacheWatcher, CommandWatcher, ExceptionWatcher, JobWatcher, MailWatcher, NotificationWatcher,
    QueryWatcher, RedisWatcher, RequestWatcher, WatcherInfo, WatcherRegistry, WatcherScope,
    WatcherSettings, WatcherState,
};
use arc_swap::ArcSwapOption;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Store plus the writer feeding it, present once initialized
struct Backend {
    store: Arc<dyn EntryStore>,
    writer: AsyncWriter,
}

/// Recorder statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_entries: u64,
    pub entries_by_type: BTreeMap<String, u64>,
    pub entries_by_tag: BTreeMap<String, u64>,
    pub retention_hours: u64,
    pub watcher_names: Vec<String>,
    pub recording: bool,
    pub enabled: bool,
    pub store: String,
}

/// Builder for [`Recorder`]
#[derive(Default)]
pub struct RecorderBuilder {
    config: RecorderConfig,
    normalizer: Option<Arc<dyn FamilyNormalizer>>,
}

impl RecorderBuilder {
    pub fn config(mut self, config: &RecorderConfig) -> Self {
        self.config = config.clone();
        self
    }

    /// Replace the family normalization strategy
    pub fn normalizer(mut self, normalizer: Arc<dyn FamilyNormalizer>) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    /// Fails when a watcher ignore pattern is not a valid regex
    pub fn build(self) -> Result<Recorder> {
        let config = self.config;
        let registry = WatcherRegistry::from_config(&config)?;
        let normalizer = self
            .normalizer
            .unwrap_or_else(|| Arc::new(DefaultNormalizer::new(config.exception_hash_chars)));

        Ok(Recorder {
            enabled: AtomicBool::new(config.enabled),
            recording: AtomicBool::new(true),
            retention: config.retention(),
            settings: WatcherSettings::from_config(&config),
            writer_config: WriterConfig {
                batch_size: config.performance.batch_size,
                flush_interval: Duration::from_millis(config.performance.flush_interval_ms),
                max_buffer_size: config.performance.max_buffer_size,
            },
            registry,
            normalizer,
            backend: ArcSwapOption::empty(),
            init_lock: tokio::sync::Mutex::new(()),
            pending_commands: PendingCommands::default(),
        })
    }
}

/// Entry point for recording and reading entries
///
/// One recorder is shared (usually behind an `Arc`) by every watcher, the
/// ingestion adapters and the query API.
///
/// # Example
///
/// ```ignore
/// let recorder = Arc::new(Recorder::new(&config.recorder)?);
/// recorder.initialize(config.recorder.store_url.as_deref()).await?;
///
/// recorder.with_batch(async {
///     recorder.cache().record_cache_miss("user:1");
///     recorder.queries().record_query("main", "select * from users", &[], elapsed);
/// }).await;
/// ```
pub struct Recorder {
    enabled: AtomicBool,
    recording: AtomicBool,
    retention: Duration,
    settings: WatcherSettings,
    writer_config: WriterConfig,
    registry: WatcherRegistry,
    normalizer: Arc<dyn FamilyNormalizer>,
    backend: ArcSwapOption<Backend>,
    init_lock: tokio::sync::Mutex<()>,
    pending_commands: PendingCommands,
}

impl Recorder {
    pub fn builder() -> RecorderBuilder {
        RecorderBuilder::default()
    }

    pub fn new(config: &RecorderConfig) -> Result<Self> {
        Self::builder().config(config).build()
    }

    /// Connect the store named by `store_url` and start the writer
    ///
    /// Calling it again once initialized is a no-op. Without a store url the
    /// recorder stays uninitialized and drops everything it is given.
    pub async fn initialize(&self, store_url: Option<&str>) -> Result<()> {
        let url = store_url
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or_else(|| RecorderError::Configuration("no store url configured".to_string()))?;

        let _guard = self.init_lock.lock().await;
        if self.backend.load().is_some() {
            tracing::debug!("Recorder already initialized");
            return Ok(());
        }

        let store = store::connect(url).await?;
        self.install(store);

        Ok(())
    }

    /// Initialize with a caller-provided store
    pub async fn initialize_with_store(&self, store: Arc<dyn EntryStore>) {
        let _guard = self.init_lock.lock().await;
        if self.backend.load().is_some() {
            tracing::debug!("Recorder already initialized");
            return;
        }
        self.install(store);
    }

    fn install(&self, store: Arc<dyn EntryStore>) {
        let name = store.name();
        let writer = AsyncWriter::spawn(store.clone(), self.writer_config);
        self.backend.store(Some(Arc::new(Backend { store, writer })));

        tracing::info!(
            store = name,
            retention_hours = self.retention.as_secs() / 3600,
            batch_size = self.writer_config.batch_size,
            "Recorder initialized"
        );
    }

    pub fn is_initialized(&self) -> bool {
        self.backend.load().is_some()
    }

    fn backend(&self) -> Result<Arc<Backend>> {
        self.backend.load_full().ok_or(RecorderError::NotInitialized)
    }

    // ---- batches ----

    /// Open a batch for explicit threading with [`Recorder::record_in`]
    pub fn start_batch(&self) -> Arc<BatchContext> {
        BatchContext::new()
    }

    /// Close `ctx` and persist its entries as one write
    ///
    /// Returns how many entries were handed to the writer. Waits until the
    /// writer has tried to store them.
    pub async fn end_batch(&self, ctx: &BatchContext) -> usize {
        let entries = ctx.close();
        if entries.is_empty() {
            return 0;
        }

        let count = entries.len();
        match self.backend.load_full() {
            Some(backend) => {
                backend.writer.write_and_wait(entries).await;
                count
            }
            None => {
                tracing::debug!(count = count, "Recorder not initialized, dropping batch");
                crate::metrics::record_entries_dropped("uninitialized", count as u64);
                0
            }
        }
    }

    /// Run `fut` inside a batch bound to the current task
    ///
    /// Entries recorded by the future (and anything it awaits on this task)
    /// land in one batch that is written when it completes. An already open
    /// batch is reused. Dropping the future discards its buffered entries.
    pub async fn with_batch<F: Future>(&self, fut: F) -> F::Output {
        if BatchContext::current().is_some() {
            return fut.await;
        }

        let ctx = self.start_batch();
        let output = BatchContext::scope(ctx.clone(), fut).await;
        self.end_batch(&ctx).await;
        output
    }

    // ---- recording ----

    /// Record an entry into the current task's batch, or on its own
    pub fn record(&self, entry: Entry) {
        match BatchContext::current() {
            Some(ctx) => self.record_in(&ctx, entry),
            None => {
                if !self.accepting(&entry) {
                    return;
                }
                let entry = entry.with_batch_id(uuid::Uuid::new_v4().to_string());
                self.write_now(entry);
            }
        }
    }

    /// Record an entry into `ctx`
    ///
    /// A closed batch no longer buffers; the entry is written right away
    /// under the same batch id.
    pub fn record_in(&self, ctx: &BatchContext, entry: Entry) {
        if !self.accepting(&entry) {
            return;
        }

        let entry = entry.with_batch_id(ctx.batch_id());
        if let Err(entry) = ctx.push(entry) {
            self.write_now(entry);
        }
    }

    fn accepting(&self, entry: &Entry) -> bool {
        if !self.is_capturing() {
            return false;
        }
        if !self.is_initialized() {
            tracing::debug!(
                entry_type = %entry.entry_type(),
                "Recorder not initialized, dropping entry"
            );
            crate::metrics::record_entries_dropped("uninitialized", 1);
            return false;
        }

        crate::metrics::record_entry(entry.entry_type());
        true
    }

    fn write_now(&self, entry: Entry) {
        if let Some(backend) = self.backend.load_full() {
            backend.writer.write(vec![entry]);
        }
    }

    /// Wait until everything recorded so far has been written
    pub async fn flush(&self) {
        if let Some(backend) = self.backend.load_full() {
            backend.writer.flush().await;
        }
    }

    // ---- reading ----

    pub async fn get_entries(&self, query: &EntryQuery) -> Result<Vec<Entry>> {
        self.backend()?.store.entries(query).await
    }

    pub async fn get_entry(&self, uuid: &str) -> Result<Option<Entry>> {
        self.backend()?.store.entry(uuid).await
    }

    /// Remove entries created before `before` (Unix ms), or all of them
    ///
    /// Pending writes are flushed first. Returns the number of entries removed.
    pub async fn clear_entries(&self, before: Option<u64>) -> Result<u64> {
        let backend = self.backend()?;
        backend.writer.flush().await;

        let outcome = backend.store.clear_before(before).await?;
        if let Some(reason) = outcome.tag_index_error {
            let err = RecorderError::PartialCleanup(reason);
            tracing::warn!(
                error = %err,
                entries_deleted = outcome.entries_deleted,
                "Tag indices not fully cleaned, orphans are swept on the next pass"
            );
        }

        crate::metrics::record_cleared(outcome.entries_deleted);
        tracing::info!(
            before = ?before,
            entries_deleted = outcome.entries_deleted,
            tag_rows_deleted = outcome.tag_rows_deleted,
            "Cleared entries"
        );

        Ok(outcome.entries_deleted)
    }

    /// Remove entries older than the retention window
    pub async fn cleanup_old_entries(&self) -> Result<u64> {
        let cutoff = current_millis().saturating_sub(self.retention.as_millis() as u64);
        self.clear_entries(Some(cutoff)).await
    }

    pub async fn get_statistics(&self) -> Result<Statistics> {
        let backend = self.backend()?;
        let stats = backend.store.statistics().await?;

        Ok(Statistics {
            total_entries: stats.total_entries,
            entries_by_type: stats.entries_by_type,
            entries_by_tag: stats.entries_by_tag,
            retention_hours: self.retention.as_secs() / 3600,
            watcher_names: self.registry.iter().map(|w| w.name().to_string()).collect(),
            recording: self.is_recording(),
            enabled: self.is_enabled(),
            store: backend.store.name().to_string(),
        })
    }

    // ---- switches ----

    /// Returns false for an unknown watcher name
    pub fn enable_watcher(&self, name: &str) -> bool {
        self.set_watcher(name, true)
    }

    /// Returns false for an unknown watcher name
    pub fn disable_watcher(&self, name: &str) -> bool {
        self.set_watcher(name, false)
    }

    fn set_watcher(&self, name: &str, enabled: bool) -> bool {
        match self.registry.by_name(name) {
            Some(state) => {
                state.set_enabled(enabled);
                tracing::info!(watcher = state.name(), enabled = enabled, "Watcher toggled");
                true
            }
            None => false,
        }
    }

    pub fn get_watcher(&self, name: &str) -> Option<WatcherInfo> {
        self.registry.by_name(name).map(WatcherState::info)
    }

    pub fn watchers(&self) -> Vec<WatcherInfo> {
        self.registry.iter().map(WatcherState::info).collect()
    }

    pub fn start_recording(&self) {
        self.recording.store(true, Ordering::Relaxed);
        tracing::info!("Recording started");
    }

    pub fn stop_recording(&self) {
        self.recording.store(false, Ordering::Relaxed);
        tracing::info!("Recording stopped");
    }

    pub fn resume(&self) {
        self.start_recording();
    }

    pub fn pause(&self) {
        self.stop_recording();
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Enabled and not paused
    pub fn is_capturing(&self) -> bool {
        self.is_enabled() && self.is_recording()
    }

    pub fn retention(&self) -> Duration {
        self.retention
    }

    // ---- watchers ----

    pub fn requests(&self) -> RequestWatcher<'_> {
        RequestWatcher::new(WatcherScope::new(self, EntryType::Request))
    }

    pub fn queries(&self) -> QueryWatcher<'_> {
        QueryWatcher::new(WatcherScope::new(self, EntryType::Query))
    }

    pub fn exceptions(&self) -> ExceptionWatcher<'_> {
        ExceptionWatcher::new(WatcherScope::new(self, EntryType::Exception))
    }

    pub fn jobs(&self) -> JobWatcher<'_> {
        JobWatcher::new(WatcherScope::new(self, EntryType::Job))
    }

    pub fn cache(&self) -> CacheWatcher<'_> {
        CacheWatcher::new(WatcherScope::new(self, EntryType::Cache))
    }

    pub fn redis(&self) -> RedisWatcher<'_> {
        RedisWatcher::new(WatcherScope::new(self, EntryType::Redis))
    }

    pub fn mail(&self) -> MailWatcher<'_> {
        MailWatcher::new(WatcherScope::new(self, EntryType::Mail))
    }

    pub fn notifications(&self) -> NotificationWatcher<'_> {
        NotificationWatcher::new(WatcherScope::new(self, EntryType::Notification))
    }

    pub fn commands(&self) -> CommandWatcher<'_> {
        CommandWatcher::new(WatcherScope::new(self, EntryType::Command))
    }

    pub(crate) fn watcher_state(&self, kind: EntryType) -> &WatcherState {
        self.registry.state(kind)
    }

    pub(crate) fn watcher_settings(&self) -> &WatcherSettings {
        &self.settings
    }

    pub(crate) fn normalizer(&self) -> &dyn FamilyNormalizer {
        self.normalizer.as_ref()
    }

    pub(crate) fn pending_commands(&self) -> &PendingCommands {
        &self.pending_commands
    }
}
