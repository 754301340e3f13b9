//! Command implementations for the CLI
//!
//! - serve: Serve the query API
//! - stats: Entry counts and settings
//! - entries: List and show entries
//! - maintenance: Clear and prune entries
//! - config: Configuration display and validation

pub mod config;
pub mod entries;
pub mod maintenance;
pub mod serve;
pub mod stats;

use anyhow::{Context, Result};
use event_recorder::config::Config;
use event_recorder::recorder::Recorder;

/// Open the configured store for an offline command
pub async fn open_recorder(cfg: &Config) -> Result<Recorder> {
    let recorder = Recorder::new(&cfg.recorder)?;
    recorder
        .initialize(cfg.recorder.store_url.as_deref())
        .await
        .context("failed to open the entry store")?;
    Ok(recorder)
}
