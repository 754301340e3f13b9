//! Watchers turn framework events into entries
//!
//! Each watcher is a short-lived view over the recorder (`recorder.cache()`,
//! `recorder.queries()`, ...) sharing one [`WatcherState`] per family. Every
//! watcher follows the same path: gate on the switches and ignore patterns,
//! build bounded content, tag it, hash its family and hand it to the recorder.

pub mod cache;
pub mod command;
pub mod exception;
pub mod job;
pub mod mail;
pub mod notification;
pub mod query;
pub mod redis;
pub mod request;

pub use cache::CacheWatcher;
pub use command::{CommandToken, CommandWatcher};
pub use exception::{ExceptionReport, ExceptionWatcher};
pub use job::{JobFailure, JobMeta, JobWatcher};
pub use mail::{MailMeta, MailWatcher};
pub use notification::NotificationWatcher;
pub use query::QueryWatcher;
pub use redis::RedisWatcher;
pub use request::{RequestMeta, RequestWatcher, ResponseMeta};

use crate::config::RecorderConfig;
use crate::error::{RecorderError, Result};
use crate::recorder::{Entry, EntryContent, EntryType, FamilyNormalizer, Recorder};
use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Thresholds and limits shared by all watchers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatcherSettings {
    pub slow_query: Duration,
    pub slow_request: Duration,
    pub slow_redis: Duration,
    pub payload_limit: usize,
    pub trace_frame_limit: usize,
}

impl WatcherSettings {
    pub fn from_config(config: &RecorderConfig) -> Self {
        Self {
            slow_query: Duration::from_millis(config.slow_query_ms),
            slow_request: Duration::from_millis(config.slow_request_ms),
            slow_redis: Duration::from_millis(config.slow_redis_ms),
            payload_limit: config.payload_limit_bytes,
            trace_frame_limit: config.trace_frame_limit,
        }
    }
}

impl Default for WatcherSettings {
    fn default() -> Self {
        Self::from_config(&RecorderConfig::default())
    }
}

/// Switch and ignore patterns of one watcher
#[derive(Debug)]
pub struct WatcherState {
    kind: EntryType,
    enabled: AtomicBool,
    ignore: Vec<Regex>,
}

impl WatcherState {
    fn new(kind: EntryType, enabled: bool, patterns: &[String]) -> Result<Self> {
        let ignore = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| {
                    RecorderError::Configuration(format!(
                        "invalid ignore pattern '{}' for watcher '{}': {}",
                        pattern, kind, e
                    ))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            kind,
            enabled: AtomicBool::new(enabled),
            ignore,
        })
    }

    pub fn name(&self) -> &'static str {
        self.kind.as_str()
    }

    pub fn kind(&self) -> EntryType {
        self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    pub(crate) fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether `identifier` matches one of the ignore patterns
    pub fn ignores(&self, identifier: &str) -> bool {
        self.ignore.iter().any(|pattern| pattern.is_match(identifier))
    }

    pub fn info(&self) -> WatcherInfo {
        WatcherInfo {
            name: self.name().to_string(),
            enabled: self.is_enabled(),
            ignore_patterns: self.ignore.iter().map(|p| p.as_str().to_string()).collect(),
        }
    }
}

/// Public snapshot of a watcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WatcherInfo {
    pub name: String,
    pub enabled: bool,
    pub ignore_patterns: Vec<String>,
}

/// One state per entry family, in [`EntryType::ALL`] order
#[derive(Debug)]
pub(crate) struct WatcherRegistry {
    states: Vec<WatcherState>,
}

impl WatcherRegistry {
    pub(crate) fn from_config(config: &RecorderConfig) -> Result<Self> {
        let states = EntryType::ALL
            .into_iter()
            .map(|kind| {
                let watcher = config.watcher(kind);
                WatcherState::new(kind, watcher.enabled, &watcher.ignore)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { states })
    }

    pub(crate) fn state(&self, kind: EntryType) -> &WatcherState {
        &self.states[kind.index()]
    }

    pub(crate) fn by_name(&self, name: &str) -> Option<&WatcherState> {
        name.parse::<EntryType>().ok().map(|kind| self.state(kind))
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &WatcherState> {
        self.states.iter()
    }
}

/// Recorder plus the state of the watcher acting on it
#[derive(Clone, Copy)]
pub(crate) struct WatcherScope<'a> {
    recorder: &'a Recorder,
    state: &'a WatcherState,
}

impl<'a> WatcherScope<'a> {
    pub(crate) fn new(recorder: &'a Recorder, kind: EntryType) -> Self {
        Self {
            recorder,
            state: recorder.watcher_state(kind),
        }
    }

    pub(crate) fn recorder(&self) -> &'a Recorder {
        self.recorder
    }

    pub(crate) fn settings(&self) -> &'a WatcherSettings {
        self.recorder.watcher_settings()
    }

    pub(crate) fn normalizer(&self) -> &'a dyn FamilyNormalizer {
        self.recorder.normalizer()
    }

    /// Watcher enabled and recorder capturing
    pub(crate) fn is_active(&self) -> bool {
        self.state.is_enabled() && self.recorder.is_capturing()
    }

    /// Active and `identifier` not ignored
    pub(crate) fn accepts(&self, identifier: &str) -> bool {
        self.is_active() && !self.state.ignores(identifier)
    }

    /// Build and record an entry if the watcher accepts `identifier`
    ///
    /// `build` runs only after the gate. A panic inside it records a summary
    /// entry of the same family in place of the real one.
    pub(crate) fn capture<F>(&self, identifier: &str, build: F)
    where
        F: FnOnce() -> Entry,
    {
        if !self.accepts(identifier) {
            return;
        }

        match catch_unwind(AssertUnwindSafe(build)) {
            Ok(entry) => self.recorder.record(entry),
            Err(_) => {
                tracing::warn!(
                    watcher = self.state.name(),
                    identifier = %identifier,
                    "Failed to build entry, recording a summary"
                );
                let content = EntryContent::summary(self.state.kind(), identifier, "build_failed");
                self.recorder
                    .record(Entry::new(content, ["build-failed"], None, true));
            }
        }
    }
}

/// Result of handing a message to a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Failed(String),
}

impl DeliveryOutcome {
    pub fn from_result<T, E: fmt::Display>(result: &std::result::Result<T, E>) -> Self {
        match result {
            Ok(_) => Self::Delivered,
            Err(e) => Self::Failed(e.to_string()),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered)
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Delivered => None,
            Self::Failed(e) => Some(e),
        }
    }
}

/// `key:value` tag
pub(crate) fn keyed(key: &str, value: impl fmt::Display) -> String {
    format!("{}:{}", key, value)
}

pub(crate) fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WatcherConfig;

    #[test]
    fn test_registry_covers_every_family() {
        let registry = WatcherRegistry::from_config(&RecorderConfig::default()).unwrap();
        let names: Vec<_> = registry.iter().map(|w| w.name()).collect();
        assert_eq!(names.len(), EntryType::ALL.len());
        assert_eq!(registry.by_name("redis").unwrap().kind(), EntryType::Redis);
        assert!(registry.by_name("nope").is_none());
    }

    #[test]
    fn test_registry_applies_overrides() {
        let mut config = RecorderConfig::default();
        config.watchers.insert(
            "cache".to_string(),
            WatcherConfig {
                enabled: false,
                ignore: vec!["^session:".to_string()],
            },
        );

        let registry = WatcherRegistry::from_config(&config).unwrap();
        let cache = registry.state(EntryType::Cache);
        assert!(!cache.is_enabled());
        assert!(cache.ignores("session:42"));
        assert!(!cache.ignores("user:session:42"));
        assert_eq!(cache.info().ignore_patterns, vec!["^session:".to_string()]);
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let mut config = RecorderConfig::default();
        config.watchers.insert(
            "query".to_string(),
            WatcherConfig {
                enabled: true,
                ignore: vec!["[".to_string()],
            },
        );

        let err = WatcherRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, RecorderError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_failed_build_records_summary_entry() {
        let recorder = Recorder::new(&RecorderConfig::default()).unwrap();
        recorder.initialize(Some("memory")).await.unwrap();

        WatcherScope::new(&recorder, EntryType::Cache).capture("user:1", || {
            panic!("content builder failed");
        });

        recorder.flush().await;
        let entries = recorder
            .get_entries(&crate::recorder::EntryQuery::default())
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].entry_type(), EntryType::Cache);
        assert!(entries[0].has_tag("build-failed"));
        assert_eq!(entries[0].content().extra()["_summary"], "build_failed");
        assert_eq!(entries[0].content().extra()["identifier"], "user:1");
    }

    #[test]
    fn test_delivery_outcome_from_result() {
        let ok: std::result::Result<(), String> = Ok(());
        assert!(DeliveryOutcome::from_result(&ok).is_delivered());

        let failed: std::result::Result<(), String> = Err("smtp timeout".to_string());
        let outcome = DeliveryOutcome::from_result(&failed);
        assert_eq!(outcome.error(), Some("smtp timeout"));
    }
}
