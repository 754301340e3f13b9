use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "recorder", version, about = "Application event recorder")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true, env = "RECORDER_CONFIG")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Serve the query API (default)
    Serve,

    /// Show entry counts and recorder settings
    Stats {
        /// Output format
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// List recorded entries, newest first
    Entries(crate::commands::entries::EntriesArgs),

    /// Show one entry as JSON
    Show {
        /// Entry uuid
        uuid: String,
    },

    /// Delete entries
    Clear {
        /// Only delete entries older than this many hours
        #[arg(long)]
        older_than_hours: Option<u64>,

        /// Skip the confirmation prompt
        #[arg(short, long)]
        yes: bool,
    },

    /// Run retention cleanup now
    Prune,

    /// Configuration management commands
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },

    /// Show version information
    Version,
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigCommands {
    /// Display the effective configuration
    Show,

    /// Validate configuration file
    Validate,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

impl Cli {
    /// Get the command to execute, defaulting to Serve if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command_is_serve() {
        let cli = Cli {
            config: PathBuf::from("config.toml"),
            command: None,
        };
        assert!(matches!(cli.get_command(), Commands::Serve));
    }

    #[test]
    fn test_cli_parsing_entries() {
        let args = vec!["recorder", "entries", "--type", "query", "--tag", "slow", "--limit", "5"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Entries(args) => {
                assert_eq!(args.entry_type.as_deref(), Some("query"));
                assert_eq!(args.tag.as_deref(), Some("slow"));
                assert_eq!(args.limit, 5);
                assert_eq!(args.format, OutputFormat::Text);
            }
            _ => panic!("Expected Entries command"),
        }
    }

    #[test]
    fn test_cli_parsing_clear() {
        let args = vec!["recorder", "clear", "--older-than-hours", "48", "-y"];
        let cli = Cli::try_parse_from(args).unwrap();

        match cli.get_command() {
            Commands::Clear { older_than_hours, yes } => {
                assert_eq!(older_than_hours, Some(48));
                assert!(yes);
            }
            _ => panic!("Expected Clear command"),
        }
    }

    #[test]
    fn test_cli_parsing_stats_json() {
        let cli = Cli::try_parse_from(vec!["recorder", "stats", "--format", "json"]).unwrap();
        assert!(matches!(
            cli.get_command(),
            Commands::Stats {
                format: OutputFormat::Json
            }
        ));
    }
}
