pub mod config;
pub mod error;
pub mod handlers;
pub mod ingest;
pub mod metrics;
pub mod recorder;
pub mod redact;
pub mod server;
pub mod signals;
pub mod watchers;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing/logging
///
/// `RUST_LOG` overrides `level`. `format` is `text` or `json`.
/// Can only be called once per process.
pub fn init_tracing(level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);

    if format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_current_span(false))
            .init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}
