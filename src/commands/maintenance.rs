use super::open_recorder;
use anyhow::Result;
use colored::Colorize;
use event_recorder::config::Config;
use event_recorder::recorder::{current_millis, run_cleanup_now};
use std::io::{self, BufRead, Write};

/// Execute the clear command
pub async fn clear(cfg: &Config, older_than_hours: Option<u64>, yes: bool) -> Result<()> {
    let before = cutoff(current_millis(), older_than_hours);

    let target = match older_than_hours {
        Some(hours) => format!("entries older than {}h", hours),
        None => "ALL entries".to_string(),
    };

    if !yes && !confirm(&format!("Delete {}?", target))? {
        println!("{}", "Aborted".yellow());
        return Ok(());
    }

    let recorder = open_recorder(cfg).await?;
    let deleted = recorder.clear_entries(before).await?;

    println!("{} {} entries deleted", "✓".green(), deleted);
    Ok(())
}

/// Unix milliseconds `older_than_hours` before `now`, floored at zero
fn cutoff(now: u64, older_than_hours: Option<u64>) -> Option<u64> {
    older_than_hours.map(|hours| now.saturating_sub(hours.saturating_mul(3_600_000)))
}

/// Execute the prune command
pub async fn prune(cfg: &Config) -> Result<()> {
    println!("{}", "Running retention cleanup...".yellow());

    let recorder = open_recorder(cfg).await?;
    let deleted = run_cleanup_now(&recorder).await?;

    println!(
        "{} {} entries older than {}h deleted",
        "✓".green(),
        deleted,
        cfg.recorder.retention_hours
    );
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} [y/N] ", prompt);
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;

    Ok(matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes"))
}
