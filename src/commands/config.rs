use anyhow::Result;
use colored::Colorize;
use event_recorder::config::Config;
use tracing::info;

/// Execute the config show command
pub fn show(cfg: &Config) -> Result<()> {
    println!("{}", "Current Configuration:".green().bold());
    println!();

    let toml_string = toml::to_string_pretty(cfg)?;
    println!("{}", toml_string);

    info!("Configuration displayed successfully");
    Ok(())
}

/// Execute the config validate command
///
/// Loading already validated the file; this prints a summary.
pub fn validate(cfg: &Config) -> Result<()> {
    println!("{}", "✓ Configuration is valid".green());
    println!();
    println!("{}", "Summary:".bold());
    println!("  Listen: {}:{}", cfg.server.host, cfg.server.port);
    println!(
        "  Store: {}",
        cfg.recorder.store_url.as_deref().unwrap_or("(none)")
    );
    println!("  Retention: {}h", cfg.recorder.retention_hours);
    println!("  Disabled watchers: {}", disabled_watchers(cfg).join(", "));

    info!("Configuration validation successful");
    Ok(())
}

fn disabled_watchers(cfg: &Config) -> Vec<String> {
    let disabled: Vec<String> = cfg
        .recorder
        .watchers
        .iter()
        .filter(|(_, watcher)| !watcher.enabled)
        .map(|(name, _)| name.clone())
        .collect();

    if disabled.is_empty() {
        vec!["(none)".to_string()]
    } else {
        disabled
    }
}
