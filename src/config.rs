use crate::recorder::EntryType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Global switch; a disabled recorder drops everything
    pub enabled: bool,
    /// `sqlite:<path>`, `sqlite::memory:` or `memory`
    pub store_url: Option<String>,
    pub retention_hours: u64,
    pub slow_query_ms: u64,
    pub slow_request_ms: u64,
    pub slow_redis_ms: u64,
    /// Ceiling for any single payload, header value or message
    pub payload_limit_bytes: usize,
    pub trace_frame_limit: usize,
    /// Message prefix length used for exception families
    pub exception_hash_chars: usize,
    pub cleanup_interval_secs: u64,
    /// Per-watcher overrides keyed by entry type name
    pub watchers: BTreeMap<String, WatcherConfig>,
    pub performance: PerformanceConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_url: Some("sqlite:./data/recorder.db".to_string()),
            retention_hours: 24,
            slow_query_ms: 1000,
            slow_request_ms: 1000,
            slow_redis_ms: 1000,
            payload_limit_bytes: 10_000,
            trace_frame_limit: 50,
            exception_hash_chars: 200,
            cleanup_interval_secs: 3600,
            watchers: BTreeMap::new(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl RecorderConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours * 3600)
    }

    /// Settings for one watcher, defaulting to enabled with no ignores
    pub fn watcher(&self, entry_type: EntryType) -> WatcherConfig {
        self.watchers
            .get(entry_type.as_str())
            .cloned()
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct WatcherConfig {
    pub enabled: bool,
    /// Regular expressions matched against the watcher's identifier
    pub ignore: Vec<String>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ignore: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub batch_size: usize,
    pub flush_interval_ms: u64,
    pub max_buffer_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval_ms: 100,
            max_buffer_size: 10_000,
        }
    }
}

/// Load configuration from `path` (optional) and `RECORDER_*` environment
pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let config = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(config::Environment::with_prefix("RECORDER").separator("__"))
        .build()?;

    let cfg: Config = config.try_deserialize()?;
    validate_config(&cfg)?;

    Ok(cfg)
}

pub fn validate_config(cfg: &Config) -> anyhow::Result<()> {
    if !matches!(cfg.server.log_format.as_str(), "text" | "json") {
        anyhow::bail!(
            "Invalid log format '{}' (expected 'text' or 'json')",
            cfg.server.log_format
        );
    }

    let recorder = &cfg.recorder;

    if recorder.retention_hours == 0 {
        anyhow::bail!("retention_hours must be at least 1");
    }

    if recorder.payload_limit_bytes == 0 {
        anyhow::bail!("payload_limit_bytes must be greater than 0");
    }

    if recorder.performance.batch_size == 0 || recorder.performance.max_buffer_size == 0 {
        anyhow::bail!("performance.batch_size and performance.max_buffer_size must be greater than 0");
    }

    if recorder.performance.flush_interval_ms == 0 {
        anyhow::bail!("performance.flush_interval_ms must be greater than 0");
    }

    if recorder.cleanup_interval_secs == 0 {
        anyhow::bail!("cleanup_interval_secs must be greater than 0");
    }

    // Watcher overrides must name a known watcher and carry valid patterns
    for (name, watcher) in &recorder.watchers {
        if name.parse::<EntryType>().is_err() {
            anyhow::bail!("Unknown watcher '{}' in recorder.watchers", name);
        }
        for pattern in &watcher.ignore {
            if let Err(e) = regex::Regex::new(pattern) {
                anyhow::bail!("Invalid ignore pattern '{}' for watcher '{}': {}", pattern, name, e);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let cfg = Config::default();
        assert!(validate_config(&cfg).is_ok());
        assert_eq!(cfg.recorder.retention(), Duration::from_secs(24 * 3600));
        assert!(cfg.recorder.watcher(EntryType::Cache).enabled);
    }

    #[test]
    fn test_validate_config_rejects_unknown_watcher() {
        let mut cfg = Config::default();
        cfg.recorder
            .watchers
            .insert("telemetry".to_string(), WatcherConfig::default());

        let result = validate_config(&cfg);
        assert!(result.unwrap_err().to_string().contains("Unknown watcher"));
    }

    #[test]
    fn test_validate_config_rejects_bad_pattern() {
        let mut cfg = Config::default();
        cfg.recorder.watchers.insert(
            "query".to_string(),
            WatcherConfig {
                enabled: true,
                ignore: vec!["(unclosed".to_string()],
            },
        );

        let result = validate_config(&cfg);
        assert!(result.unwrap_err().to_string().contains("Invalid ignore pattern"));
    }

    #[test]
    fn test_validate_config_rejects_zero_retention() {
        let mut cfg = Config::default();
        cfg.recorder.retention_hours = 0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[server]
port = 9000

[recorder]
store_url = "memory"
retention_hours = 48

[recorder.watchers.cache]
enabled = false
ignore = ["^session:"]
"#
        )
        .unwrap();

        let cfg = load_config(file.path()).unwrap();
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.recorder.store_url.as_deref(), Some("memory"));
        assert_eq!(cfg.recorder.retention_hours, 48);
        assert_eq!(cfg.recorder.slow_query_ms, 1000);

        let cache = cfg.recorder.watcher(EntryType::Cache);
        assert!(!cache.enabled);
        assert_eq!(cache.ignore, vec!["^session:".to_string()]);
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg.recorder.performance.batch_size, 100);
    }
}
