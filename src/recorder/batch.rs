//! Per-task batch of entries
//!
//! A batch groups every entry recorded while one unit of work (a request, a
//! job, a command) runs. The current batch travels with the task through a
//! task-local, so concurrent units never see each other's entries.

use super::entry::Entry;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

tokio::task_local! {
    static CURRENT_BATCH: Arc<BatchContext>;
}

#[derive(Debug, Default)]
struct BatchBuffer {
    entries: Vec<Entry>,
    closed: bool,
}

/// Buffer of entries for one unit of work
#[derive(Debug)]
pub struct BatchContext {
    batch_id: String,
    buffer: Mutex<BatchBuffer>,
}

impl BatchContext {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            batch_id: Uuid::new_v4().to_string(),
            buffer: Mutex::new(BatchBuffer::default()),
        })
    }

    pub fn batch_id(&self) -> &str {
        &self.batch_id
    }

    /// Number of buffered entries
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the batch was already ended
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Batch bound to the running task, if any
    pub fn current() -> Option<Arc<BatchContext>> {
        CURRENT_BATCH.try_with(Arc::clone).ok()
    }

    /// Run `fut` with `ctx` as the task's current batch
    pub(crate) async fn scope<F: Future>(ctx: Arc<BatchContext>, fut: F) -> F::Output {
        CURRENT_BATCH.scope(ctx, fut).await
    }

    /// Buffer an entry, or hand it back when the batch is closed
    pub(crate) fn push(&self, entry: Entry) -> Result<(), Entry> {
        let mut buffer = self.lock();
        if buffer.closed {
            return Err(entry);
        }
        buffer.entries.push(entry);
        Ok(())
    }

    /// Close the batch and take its entries in recording order
    pub(crate) fn close(&self) -> Vec<Entry> {
        let mut buffer = self.lock();
        buffer.closed = true;
        std::mem::take(&mut buffer.entries)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BatchBuffer> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for BatchContext {
    fn drop(&mut self) {
        let buffer = self
            .buffer
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner);
        if !buffer.closed && !buffer.entries.is_empty() {
            tracing::debug!(
                batch_id = %self.batch_id,
                discarded = buffer.entries.len(),
                "Discarding entries of a batch that was never ended"
            );
        }
    }
}
