//! Background retention cleanup
//!
//! Periodically deletes entries older than the recorder's retention window.

use super::Recorder;
use crate::config::RecorderConfig;
use crate::error::Result;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, MissedTickBehavior};

/// Cleanup configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CleanupConfig {
    /// Time between cleanup passes
    pub interval: Duration,
}

impl CleanupConfig {
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.cleanup_interval_secs),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3600),
        }
    }
}

/// Spawn background cleanup task
///
/// The first pass runs one interval after spawning.
///
/// # Example
///
/// ```ignore
/// let handle = spawn_cleanup_task(recorder.clone(), CleanupConfig::from_config(&config.recorder));
/// ```
pub fn spawn_cleanup_task(recorder: Arc<Recorder>, config: CleanupConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        cleanup_loop(recorder, config).await;
    })
}

async fn cleanup_loop(recorder: Arc<Recorder>, config: CleanupConfig) {
    let mut interval = time::interval_at(time::Instant::now() + config.interval, config.interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        interval.tick().await;

        match recorder.cleanup_old_entries().await {
            Ok(deleted) => {
                let next_run = chrono::Local::now()
                    + chrono::Duration::from_std(config.interval).unwrap_or_else(|_| chrono::Duration::hours(1));
                tracing::info!(
                    entries_deleted = deleted,
                    next_run = %next_run.format("%Y-%m-%d %H:%M:%S"),
                    "Scheduled cleanup completed"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled cleanup failed");
            }
        }
    }
}

/// Run cleanup immediately (for manual triggering)
pub async fn run_cleanup_now(recorder: &Recorder) -> Result<u64> {
    tracing::info!(
        retention_hours = recorder.retention().as_secs() / 3600,
        "Running manual cleanup"
    );

    let deleted = recorder.cleanup_old_entries().await?;

    tracing::info!(entries_deleted = deleted, "Manual cleanup completed");

    Ok(deleted)
}
