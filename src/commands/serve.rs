use anyhow::Result;
use colored::Colorize;
use event_recorder::{config::Config, server};
use tracing::info;

/// Execute the serve command
///
/// Blocks until SIGINT/SIGTERM.
pub async fn execute(cfg: Config) -> Result<()> {
    println!("{}", "Starting recorder...".green());
    info!(
        host = %cfg.server.host,
        port = cfg.server.port,
        store = cfg.recorder.store_url.as_deref().unwrap_or("<none>"),
        "Starting recorder"
    );

    server::start_server(cfg).await
}
