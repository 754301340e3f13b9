//! Typed content for each entry family
//!
//! Every watcher produces one of the structs below. They share an `extra` map
//! that is only kept so newer producers can attach fields older readers ignore.

use crate::error::RecorderError;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Forward-compatible bag of additional fields
pub type Extra = serde_json::Map<String, Value>;

/// Event family of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Request,
    Query,
    Exception,
    Job,
    Cache,
    Redis,
    Mail,
    Notification,
    Command,
}

impl EntryType {
    /// All families, in registry order
    pub const ALL: [EntryType; 9] = [
        EntryType::Request,
        EntryType::Query,
        EntryType::Exception,
        EntryType::Job,
        EntryType::Cache,
        EntryType::Redis,
        EntryType::Mail,
        EntryType::Notification,
        EntryType::Command,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Request => "request",
            Self::Query => "query",
            Self::Exception => "exception",
            Self::Job => "job",
            Self::Cache => "cache",
            Self::Redis => "redis",
            Self::Mail => "mail",
            Self::Notification => "notification",
            Self::Command => "command",
        }
    }

    /// Position in [`EntryType::ALL`]
    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryType {
    type Err = RecorderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RecorderError::InvalidEntry(format!("unknown entry type '{}'", s)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestContent {
    pub method: String,
    pub uri: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub payload: Value,
    pub response_status: u16,
    #[serde(default)]
    pub response_headers: BTreeMap<String, String>,
    #[serde(default)]
    pub response: Value,
    pub duration_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryContent {
    pub connection: String,
    pub sql: String,
    #[serde(default)]
    pub bindings: Vec<Value>,
    pub duration_ms: u64,
    #[serde(default)]
    pub slow: bool,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExceptionContent {
    pub class: String,
    pub message: String,
    #[serde(default)]
    pub trace: Vec<String>,
    #[serde(default)]
    pub context: Value,
    pub handled: bool,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

/// Lifecycle point a job entry was recorded at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Dispatched,
    Started,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dispatched => "dispatched",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobContent {
    pub job_id: String,
    pub name: String,
    pub queue: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    pub status: JobStatus,
    #[serde(default)]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub will_retry: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheAction {
    Hit,
    Miss,
    Set,
    Forget,
}

impl CacheAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "hit",
            Self::Miss => "miss",
            Self::Set => "set",
            Self::Forget => "forget",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheContent {
    pub action: CacheAction,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedisContent {
    pub connection: String,
    pub command: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub slow: bool,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MailContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mailable: Option<String>,
    pub subject: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default)]
    pub recipients: Vec<String>,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub notification: String,
    pub channel: String,
    #[serde(default)]
    pub notifiables: Vec<String>,
    pub delivered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandContent {
    pub correlation_id: String,
    pub command: String,
    #[serde(default)]
    pub arguments: Vec<String>,
    pub exit_code: i32,
    pub duration_ms: u64,
    #[serde(default)]
    pub output: String,
    #[serde(default, skip_serializing_if = "Extra::is_empty")]
    pub extra: Extra,
}

/// Family-specific payload of an entry
///
/// Serializes as the bare inner object; the family travels next to it as the
/// entry's `type` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EntryContent {
    Request(RequestContent),
    Query(QueryContent),
    Exception(ExceptionContent),
    Job(JobContent),
    Cache(CacheContent),
    Redis(RedisContent),
    Mail(MailContent),
    Notification(NotificationContent),
    Command(CommandContent),
}

macro_rules! content_variants {
    ($($variant:ident => $ty:ident),* $(,)?) => {
        impl EntryContent {
            pub fn entry_type(&self) -> EntryType {
                match self {
                    $(Self::$variant(_) => EntryType::$variant,)*
                }
            }

            /// Decode `content` for an entry of the given family
            pub fn from_value(entry_type: EntryType, content: Value) -> Result<Self, serde_json::Error> {
                Ok(match entry_type {
                    $(EntryType::$variant => Self::$variant(serde_json::from_value::<$ty>(content)?),)*
                })
            }
        }

        $(
            impl From<$ty> for EntryContent {
                fn from(content: $ty) -> Self {
                    Self::$variant(content)
                }
            }
        )*
    };
}

content_variants! {
    Request => RequestContent,
    Query => QueryContent,
    Exception => ExceptionContent,
    Job => JobContent,
    Cache => CacheContent,
    Redis => RedisContent,
    Mail => MailContent,
    Notification => NotificationContent,
    Command => CommandContent,
}

impl EntryContent {
    /// Placeholder content for an entry whose real content could not be built
    ///
    /// Required fields are left empty; `extra` carries `_summary` with the
    /// reason and the identifier the watcher was recording.
    pub fn summary(entry_type: EntryType, identifier: &str, reason: &str) -> Self {
        let mut extra = Extra::new();
        extra.insert("_summary".to_string(), Value::String(reason.to_string()));
        extra.insert(
            "identifier".to_string(),
            Value::String(bounded_text(identifier, 1024)),
        );

        match entry_type {
            EntryType::Request => Self::Request(RequestContent {
                method: String::new(),
                uri: identifier.to_string(),
                path: String::new(),
                ip: None,
                headers: BTreeMap::new(),
                payload: Value::Null,
                response_status: 0,
                response_headers: BTreeMap::new(),
                response: Value::Null,
                duration_ms: 0,
                memory_bytes: None,
                extra,
            }),
            EntryType::Query => Self::Query(QueryContent {
                connection: String::new(),
                sql: String::new(),
                bindings: Vec::new(),
                duration_ms: 0,
                slow: false,
                extra,
            }),
            EntryType::Exception => Self::Exception(ExceptionContent {
                class: String::new(),
                message: String::new(),
                trace: Vec::new(),
                context: Value::Null,
                handled: false,
                extra,
            }),
            EntryType::Job => Self::Job(JobContent {
                job_id: String::new(),
                name: String::new(),
                queue: String::new(),
                connection: None,
                status: JobStatus::Dispatched,
                payload: Value::Null,
                error: None,
                retries: None,
                will_retry: None,
                duration_ms: None,
                extra,
            }),
            EntryType::Cache => Self::Cache(CacheContent {
                action: CacheAction::Hit,
                key: String::new(),
                value: None,
                ttl_secs: None,
                extra,
            }),
            EntryType::Redis => Self::Redis(RedisContent {
                connection: String::new(),
                command: String::new(),
                duration_ms: 0,
                slow: false,
                extra,
            }),
            EntryType::Mail => Self::Mail(MailContent {
                mailable: None,
                subject: String::new(),
                from: None,
                recipients: Vec::new(),
                delivered: false,
                error: None,
                extra,
            }),
            EntryType::Notification => Self::Notification(NotificationContent {
                notification: String::new(),
                channel: String::new(),
                notifiables: Vec::new(),
                delivered: false,
                error: None,
                extra,
            }),
            EntryType::Command => Self::Command(CommandContent {
                correlation_id: String::new(),
                command: String::new(),
                arguments: Vec::new(),
                exit_code: 0,
                duration_ms: 0,
                output: String::new(),
                extra,
            }),
        }
    }

    /// `extra` map of the inner content
    pub fn extra(&self) -> &Extra {
        match self {
            Self::Request(c) => &c.extra,
            Self::Query(c) => &c.extra,
            Self::Exception(c) => &c.extra,
            Self::Job(c) => &c.extra,
            Self::Cache(c) => &c.extra,
            Self::Redis(c) => &c.extra,
            Self::Mail(c) => &c.extra,
            Self::Notification(c) => &c.extra,
            Self::Command(c) => &c.extra,
        }
    }
}

const TRUNCATION_MARKER: &str = " [truncated]";

/// Cut `text` to at most `max_bytes`, on a char boundary
///
/// Returns the kept prefix and whether anything was cut.
pub fn truncate(text: &str, max_bytes: usize) -> (String, bool) {
    if text.len() <= max_bytes {
        return (text.to_string(), false);
    }

    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }

    (text[..end].to_string(), true)
}

/// Like [`truncate`], appending a marker when text was cut
pub fn bounded_text(text: &str, max_bytes: usize) -> String {
    match truncate(text, max_bytes) {
        (kept, true) => kept + TRUNCATION_MARKER,
        (kept, false) => kept,
    }
}

/// Keep `value` if its serialized form fits in `max_bytes`
///
/// Oversized strings are truncated; any other oversized value degrades to a
/// `{"_summary": <kind>, "size": <bytes>}` object.
pub fn bounded_value(value: Value, max_bytes: usize) -> Value {
    if let Value::String(text) = &value {
        return Value::String(bounded_text(text, max_bytes));
    }

    let size = match serde_json::to_string(&value) {
        Ok(serialized) => serialized.len(),
        Err(_) => return json!({ "_summary": value_kind(&value), "error": "unserializable" }),
    };

    if size <= max_bytes {
        value
    } else {
        json!({ "_summary": value_kind(&value), "size": size })
    }
}

/// Serialize any value into a bounded JSON value without failing
pub fn to_bounded_value<T: Serialize + ?Sized>(value: &T, max_bytes: usize) -> Value {
    match serde_json::to_value(value) {
        Ok(value) => bounded_value(value, max_bytes),
        Err(e) => json!({
            "_summary": std::any::type_name::<T>(),
            "error": bounded_text(&e.to_string(), 200),
        }),
    }
}

fn value_kind(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "bool".to_string(),
        Value::Number(_) => "number".to_string(),
        Value::String(_) => "string".to_string(),
        Value::Array(items) => format!("array[{}]", items.len()),
        Value::Object(map) => format!("object{{{}}}", map.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_summary_content_keeps_family_and_reason() {
        for kind in EntryType::ALL {
            let content = EntryContent::summary(kind, "user:1", "build_failed");
            assert_eq!(content.entry_type(), kind);
            assert_eq!(content.extra()["_summary"], "build_failed");
            assert_eq!(content.extra()["identifier"], "user:1");

            // Decodes back into the same family
            let value = serde_json::to_value(&content).unwrap();
            assert_eq!(EntryContent::from_value(kind, value).unwrap(), content);
        }
    }

    #[test]
    fn test_entry_type_parse_and_display() {
        assert_eq!("cache".parse::<EntryType>().unwrap(), EntryType::Cache);
        assert_eq!("Redis".parse::<EntryType>().unwrap(), EntryType::Redis);
        assert_eq!(EntryType::Notification.to_string(), "notification");
        assert!("telemetry".parse::<EntryType>().is_err());
    }

    #[test]
    fn test_entry_type_index_matches_all() {
        for (i, t) in EntryType::ALL.iter().enumerate() {
            assert_eq!(t.index(), i);
        }
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let (kept, cut) = truncate("héllo", 2);
        assert_eq!(kept, "h");
        assert!(cut);

        let (kept, cut) = truncate("short", 100);
        assert_eq!(kept, "short");
        assert!(!cut);
    }

    #[test]
    fn test_bounded_text_marks_truncation() {
        let text = "x".repeat(50);
        let bounded = bounded_text(&text, 10);
        assert!(bounded.starts_with("xxxxxxxxxx"));
        assert!(bounded.ends_with("[truncated]"));
    }

    #[test]
    fn test_bounded_value_summarizes_large_objects() {
        let big = json!({ "items": vec![1; 500] });
        let bounded = bounded_value(big, 64);
        assert_eq!(bounded["_summary"], "object{1}");
        assert!(bounded["size"].as_u64().unwrap() > 64);

        let small = json!({ "a": 1 });
        assert_eq!(bounded_value(small.clone(), 64), small);
    }

    #[test]
    fn test_to_bounded_value_degrades_unserializable() {
        // Non-string map keys cannot become JSON object keys
        let mut map = HashMap::new();
        map.insert(vec![1u8], "v");

        let value = to_bounded_value(&map, 1024);
        assert!(value["_summary"].as_str().unwrap().contains("HashMap"));
        assert!(value.get("error").is_some());
    }

    #[test]
    fn test_content_from_value_checks_family() {
        let cache = json!({ "action": "hit", "key": "k", "value": "v" });
        let content = EntryContent::from_value(EntryType::Cache, cache.clone()).unwrap();
        assert_eq!(content.entry_type(), EntryType::Cache);

        assert!(EntryContent::from_value(EntryType::Query, cache).is_err());
    }
}
