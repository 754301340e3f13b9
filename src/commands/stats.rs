use super::open_recorder;
use crate::cli::OutputFormat;
use anyhow::Result;
use colored::Colorize;
use event_recorder::config::Config;
use event_recorder::recorder::Statistics;

/// Execute the stats command
pub async fn execute(cfg: &Config, format: OutputFormat) -> Result<()> {
    let recorder = open_recorder(cfg).await?;
    let stats = recorder.get_statistics().await?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&stats)?),
        OutputFormat::Text => print_stats(&stats),
    }

    Ok(())
}

fn print_stats(stats: &Statistics) {
    println!("{}", "Recorder Statistics".bold().underline());
    println!();
    println!("  Store:           {}", stats.store);
    println!("  Total entries:   {}", stats.total_entries.to_string().cyan());
    println!("  Retention:       {}h", stats.retention_hours);
    println!(
        "  Enabled:         {}",
        if stats.enabled { "yes".green() } else { "no".red() }
    );
    println!();

    println!("{}", "By type:".bold());
    if stats.entries_by_type.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (entry_type, count) in &stats.entries_by_type {
        println!("  {:<14} {:>8}", entry_type, count);
    }
    println!();

    println!("{}", "Top tags:".bold());
    let mut tags: Vec<_> = stats.entries_by_tag.iter().collect();
    tags.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
    if tags.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for (tag, count) in tags.into_iter().take(20) {
        println!("  {:<32} {:>8}", tag, count);
    }
}
