//! Async batch writer for recorded entries
//!
//! This module keeps storage off the request path:
//! - Bounded channel, entries are dropped rather than blocking when full
//! - Batched appends (batch size or flush interval, whichever first)
//! - Acknowledged writes for callers that need read-your-writes

use super::entry::Entry;
use super::store::EntryStore;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};

/// Writer tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterConfig {
    /// Max entries per store append
    pub batch_size: usize,
    /// Max time an entry waits before being flushed
    pub flush_interval: Duration,
    /// Max queued messages before new writes are dropped
    pub max_buffer_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(100),
            max_buffer_size: 10_000,
        }
    }
}

enum WriterMessage {
    Append {
        entries: Vec<Entry>,
        ack: Option<oneshot::Sender<bool>>,
    },
    Flush(oneshot::Sender<bool>),
}

/// Handle to the background writer task
///
/// Cloning is cheap; the task stops once every handle is dropped, after
/// flushing what it still holds.
#[derive(Clone)]
pub struct AsyncWriter {
    sender: mpsc::Sender<WriterMessage>,
}

impl AsyncWriter {
    /// Spawn the writer task
    ///
    /// # Example
    ///
    /// ```ignore
    /// let writer = AsyncWriter::spawn(store, WriterConfig::default());
    /// writer.write(vec![entry]);  // Non-blocking
    /// ```
    pub fn spawn(store: Arc<dyn EntryStore>, config: WriterConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.max_buffer_size.max(1));

        tokio::spawn(async move {
            let task = AssertUnwindSafe(writer_task(store, rx, config));
            if let Err(panic) = task.catch_unwind().await {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                tracing::error!(panic = %message, "Recorder writer task panicked");
            }
        });

        Self { sender: tx }
    }

    /// Queue entries without waiting
    ///
    /// Returns false when the entries were dropped.
    pub fn write(&self, entries: Vec<Entry>) -> bool {
        if entries.is_empty() {
            return true;
        }
        let count = entries.len();
        self.try_queue(WriterMessage::Append { entries, ack: None }, count)
    }

    /// Queue entries and wait until the writer has tried to store them
    ///
    /// Returns false when the entries were dropped or the store rejected them.
    pub async fn write_and_wait(&self, entries: Vec<Entry>) -> bool {
        if entries.is_empty() {
            return true;
        }
        let count = entries.len();
        let (ack, done) = oneshot::channel();
        if !self.try_queue(WriterMessage::Append { entries, ack: Some(ack) }, count) {
            return false;
        }
        done.await.unwrap_or(false)
    }

    /// Wait until everything queued before this call has been written
    pub async fn flush(&self) -> bool {
        let (ack, done) = oneshot::channel();
        if self.sender.send(WriterMessage::Flush(ack)).await.is_err() {
            return false;
        }
        done.await.unwrap_or(false)
    }

    fn try_queue(&self, message: WriterMessage, count: usize) -> bool {
        match self.sender.try_send(message) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(dropped = count, "Recorder write buffer full, dropping entries");
                crate::metrics::record_entries_dropped("buffer_full", count as u64);
                false
            }
            Err(TrySendError::Closed(_)) => {
                tracing::warn!(dropped = count, "Recorder writer stopped, dropping entries");
                crate::metrics::record_entries_dropped("writer_stopped", count as u64);
                false
            }
        }
    }
}

/// Background writer task
async fn writer_task(
    store: Arc<dyn EntryStore>,
    mut rx: mpsc::Receiver<WriterMessage>,
    config: WriterConfig,
) {
    let batch_size = config.batch_size.max(1);
    let mut pending: Vec<Entry> = Vec::with_capacity(batch_size);
    let mut waiters: Vec<oneshot::Sender<bool>> = Vec::new();

    let mut flush_timer = tokio::time::interval(config.flush_interval);
    flush_timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(WriterMessage::Append { entries, ack }) => {
                    pending.extend(entries);
                    match ack {
                        // Someone is waiting: write now
                        Some(ack) => {
                            waiters.push(ack);
                            flush(store.as_ref(), &mut pending, &mut waiters).await;
                        }
                        None if pending.len() >= batch_size => {
                            flush(store.as_ref(), &mut pending, &mut waiters).await;
                        }
                        None => {}
                    }
                }
                Some(WriterMessage::Flush(ack)) => {
                    waiters.push(ack);
                    flush(store.as_ref(), &mut pending, &mut waiters).await;
                }
                // Every handle dropped, flush remaining and exit
                None => {
                    flush(store.as_ref(), &mut pending, &mut waiters).await;
                    break;
                }
            },

            _ = flush_timer.tick() => {
                if !pending.is_empty() {
                    flush(store.as_ref(), &mut pending, &mut waiters).await;
                }
            }
        }
    }

    tracing::info!("Recorder writer task shutting down");
}

/// Append pending entries and release waiters
async fn flush(
    store: &dyn EntryStore,
    pending: &mut Vec<Entry>,
    waiters: &mut Vec<oneshot::Sender<bool>>,
) {
    let ok = if pending.is_empty() {
        true
    } else {
        let count = pending.len();
        let start = Instant::now();

        match store.append(pending.as_slice()).await {
            Ok(()) => {
                let elapsed = start.elapsed();
                tracing::debug!(
                    count = count,
                    duration_ms = elapsed.as_millis() as u64,
                    store = store.name(),
                    "Flushed entry batch"
                );
                crate::metrics::record_flush(count, elapsed);
                true
            }
            Err(e) => {
                tracing::error!(error = %e, count = count, "Failed to flush entry batch");
                crate::metrics::record_entries_dropped("store_error", count as u64);
                false
            }
        }
    };

    pending.clear();
    for waiter in waiters.drain(..) {
        let _ = waiter.send(ok);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{RecorderError, Result};
    use crate::recorder::store::test_support::cache_entry;
    use crate::recorder::store::{ClearOutcome, EntryQuery, MemoryStore, StoreStatistics};
    use async_trait::async_trait;

    fn memory_store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::new())
    }

    async fn stored(store: &MemoryStore) -> usize {
        store.entries(&EntryQuery::default().limit(1000)).await.unwrap().len()
    }

    #[tokio::test]
    async fn test_interval_flush() {
        let store = memory_store();
        let config = WriterConfig {
            batch_size: 10,
            flush_interval: Duration::from_millis(50),
            max_buffer_size: 100,
        };
        let writer = AsyncWriter::spawn(store.clone(), config);

        for i in 0..5 {
            assert!(writer.write(vec![cache_entry(&format!("k{}", i), 1_000 + i, &[])]));
        }

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(stored(&store).await, 5);
    }

    #[tokio::test]
    async fn test_write_and_wait_is_visible() {
        let store = memory_store();
        let config = WriterConfig {
            flush_interval: Duration::from_secs(60),
            ..WriterConfig::default()
        };
        let writer = AsyncWriter::spawn(store.clone(), config);

        assert!(writer.write_and_wait(vec![cache_entry("a", 1, &[])]).await);
        assert_eq!(stored(&store).await, 1);
    }

    #[tokio::test]
    async fn test_flush_barrier() {
        let store = memory_store();
        let config = WriterConfig {
            flush_interval: Duration::from_secs(60),
            ..WriterConfig::default()
        };
        let writer = AsyncWriter::spawn(store.clone(), config);

        writer.write(vec![cache_entry("a", 1, &[]), cache_entry("b", 2, &[])]);
        assert!(writer.flush().await);
        assert_eq!(stored(&store).await, 2);
    }

    struct FailingStore;

    #[async_trait]
    impl EntryStore for FailingStore {
        fn name(&self) -> &'static str {
            "failing"
        }
        async fn append(&self, _entries: &[Entry]) -> Result<()> {
            Err(RecorderError::StoreUnavailable("disk full".to_string()))
        }
        async fn entries(&self, _query: &EntryQuery) -> Result<Vec<Entry>> {
            Ok(vec![])
        }
        async fn entry(&self, _uuid: &str) -> Result<Option<Entry>> {
            Ok(None)
        }
        async fn clear_before(&self, _before: Option<u64>) -> Result<ClearOutcome> {
            Ok(ClearOutcome::default())
        }
        async fn statistics(&self) -> Result<StoreStatistics> {
            Ok(StoreStatistics::default())
        }
    }

    #[tokio::test]
    async fn test_store_failure_still_acks() {
        let writer = AsyncWriter::spawn(Arc::new(FailingStore), WriterConfig::default());

        let written = tokio::time::timeout(
            Duration::from_secs(5),
            writer.write_and_wait(vec![cache_entry("a", 1, &[])]),
        )
        .await
        .unwrap();
        assert!(!written);

        // Writer keeps running after a failed append
        assert!(writer.flush().await);
    }

    #[tokio::test]
    async fn test_full_buffer_drops() {
        let store = memory_store();
        let config = WriterConfig {
            batch_size: 1_000,
            flush_interval: Duration::from_secs(60),
            max_buffer_size: 1,
        };
        let writer = AsyncWriter::spawn(store, config);

        // Without yielding, the task cannot drain the single slot
        let accepted = (0..10)
            .filter(|i| writer.write(vec![cache_entry(&format!("k{}", i), 1, &[])]))
            .count();
        assert!(accepted < 10);
    }
}
