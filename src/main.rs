use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use event_recorder::{config, init_tracing};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();
    let command = args.get_command();

    if let cli::Commands::Version = command {
        println!("Event Recorder v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = config::load_config(&args.config)?;
    init_tracing(&cfg.server.log_level, &cfg.server.log_format);

    match command {
        cli::Commands::Serve => commands::serve::execute(cfg).await?,
        cli::Commands::Stats { format } => commands::stats::execute(&cfg, format).await?,
        cli::Commands::Entries(entries_args) => commands::entries::execute(&cfg, entries_args).await?,
        cli::Commands::Show { uuid } => commands::entries::show(&cfg, &uuid).await?,
        cli::Commands::Clear {
            older_than_hours,
            yes,
        } => commands::maintenance::clear(&cfg, older_than_hours, yes).await?,
        cli::Commands::Prune => commands::maintenance::prune(&cfg).await?,
        cli::Commands::Config { action } => match action {
            cli::ConfigCommands::Show => commands::config::show(&cfg)?,
            cli::ConfigCommands::Validate => commands::config::validate(&cfg)?,
        },
        cli::Commands::Version => {}
    }

    Ok(())
}
