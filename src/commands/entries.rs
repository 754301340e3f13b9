//! Entry listing commands
//!
//! Read entries straight from the configured store.

use super::open_recorder;
use crate::cli::OutputFormat;
use anyhow::{bail, Result};
use clap::Parser;
use colored::{ColoredString, Colorize};
use event_recorder::config::Config;
use event_recorder::recorder::{Entry, EntryContent, EntryQuery, EntryType};

/// List recorded entries
#[derive(Debug, Clone, Parser)]
pub struct EntriesArgs {
    /// Filter by entry type (request, query, exception, job, cache, redis, mail, notification, command)
    #[arg(short = 't', long = "type")]
    pub entry_type: Option<String>,

    /// Filter by tag (e.g. slow, failed, method:GET)
    #[arg(long)]
    pub tag: Option<String>,

    /// Maximum number of results
    #[arg(short, long, default_value = "50")]
    pub limit: usize,

    /// Skip this many results
    #[arg(long, default_value = "0")]
    pub offset: usize,

    /// Output format
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
}

/// Execute the entries command
pub async fn execute(cfg: &Config, args: EntriesArgs) -> Result<()> {
    let mut query = EntryQuery::default().limit(args.limit).offset(args.offset);
    if let Some(name) = &args.entry_type {
        query = query.of_type(name.parse::<EntryType>()?);
    }
    if let Some(tag) = args.tag {
        query = query.tagged(tag);
    }

    let recorder = open_recorder(cfg).await?;
    let entries = recorder.get_entries(&query).await?;

    match args.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&entries)?),
        OutputFormat::Text => {
            if entries.is_empty() {
                println!("{}", "No entries found".yellow());
                return Ok(());
            }
            for entry in &entries {
                print_entry_line(entry);
            }
            println!();
            println!("{}", format!("{} entries", entries.len()).dimmed());
        }
    }

    Ok(())
}

/// Execute the show command
pub async fn show(cfg: &Config, uuid: &str) -> Result<()> {
    let recorder = open_recorder(cfg).await?;

    match recorder.get_entry(uuid).await? {
        Some(entry) => {
            println!("{}", serde_json::to_string_pretty(&entry)?);
            Ok(())
        }
        None => bail!("entry '{}' not found", uuid),
    }
}

fn print_entry_line(entry: &Entry) {
    let time = chrono::DateTime::from_timestamp_millis(entry.created_at() as i64)
        .map(|dt| {
            dt.with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M:%S%.3f")
                .to_string()
        })
        .unwrap_or_else(|| entry.created_at().to_string());

    let tags: Vec<&str> = entry.tags().iter().map(String::as_str).collect();

    println!(
        "{} {:<13} {} {} {}",
        time.dimmed(),
        type_label(entry.entry_type()),
        summary(entry.content()),
        format!("[{}]", tags.join(", ")).blue(),
        entry.uuid().dimmed(),
    );
}

fn type_label(entry_type: EntryType) -> ColoredString {
    let label = entry_type.as_str();
    match entry_type {
        EntryType::Exception => label.red().bold(),
        EntryType::Request => label.green(),
        EntryType::Query => label.cyan(),
        EntryType::Job | EntryType::Command => label.magenta(),
        _ => label.normal(),
    }
}

/// One-line description of an entry
fn summary(content: &EntryContent) -> String {
    match content {
        EntryContent::Request(c) => format!("{} {} {} {}ms", c.method, c.path, c.response_status, c.duration_ms),
        EntryContent::Query(c) => format!("{} ({}ms)", one_line(&c.sql, 80), c.duration_ms),
        EntryContent::Exception(c) => format!("{}: {}", c.class, one_line(&c.message, 80)),
        EntryContent::Job(c) => format!("{} {} on {}", c.name, c.status.as_str(), c.queue),
        EntryContent::Cache(c) => format!("{} {}", c.action.as_str(), c.key),
        EntryContent::Redis(c) => format!("{} ({}ms)", one_line(&c.command, 80), c.duration_ms),
        EntryContent::Mail(c) => format!("{} to {}", c.subject, c.recipients.join(", ")),
        EntryContent::Notification(c) => format!("{} via {}", c.notification, c.channel),
        EntryContent::Command(c) => format!("{} exited {}", c.command, c.exit_code),
    }
}

fn one_line(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > max_chars {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{}...", cut)
    } else {
        flat
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_line_flattens_and_cuts() {
        assert_eq!(one_line("select *\n  from users", 80), "select * from users");
        assert_eq!(one_line("abcdef", 3), "abc...");
    }
}
