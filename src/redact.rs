//! Masking of secrets before they are recorded
//!
//! Header values, payload fields and bindings pass through here so recorded
//! entries never carry credentials in the clear.

use crate::recorder::bounded_text;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Replacement for values that are hidden entirely
pub const MASK: &str = "********";

/// Headers whose values are always hidden
pub const SENSITIVE_HEADERS: [&str; 5] = [
    "authorization",
    "cookie",
    "set-cookie",
    "proxy-authorization",
    "x-api-key",
];

/// Object keys whose values are always hidden
const SENSITIVE_FIELDS: [&str; 7] = [
    "password",
    "password_confirmation",
    "secret",
    "token",
    "api_key",
    "apikey",
    "access_token",
];

/// Secret shown as its first 8 characters followed by `***`
///
/// # Example
///
/// ```ignore
/// let masked = MaskedSecret::new("sk-live-abcdef123456");
/// assert_eq!(masked.to_string(), "sk-live-***");
/// ```
#[derive(Clone, Debug)]
pub struct MaskedSecret<'a> {
    inner: &'a str,
}

impl<'a> MaskedSecret<'a> {
    pub fn new(secret: &'a str) -> Self {
        Self { inner: secret }
    }
}

impl fmt::Display for MaskedSecret<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.char_indices().nth(8) {
            // Short secrets are hidden entirely
            None => write!(f, "***"),
            Some((end, _)) => write!(f, "{}***", &self.inner[..end]),
        }
    }
}

/// Whether `value` looks like an API key or bearer credential
pub fn looks_like_secret(value: &str) -> bool {
    const PREFIXES: [&str; 7] = ["sk-", "pk-", "sess-", "acct-", "rk_", "Bearer ", "Basic "];

    let value = value.trim();
    PREFIXES.iter().any(|prefix| value.starts_with(prefix))
}

/// Mask `value` if it looks like a secret
pub fn mask_value(value: &str) -> String {
    if looks_like_secret(value) {
        MaskedSecret::new(value.trim()).to_string()
    } else {
        value.to_string()
    }
}

fn is_sensitive_field(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    SENSITIVE_FIELDS.contains(&name.as_str())
}

/// Normalize, mask and bound a header list
///
/// Names are lowercased; repeated names are joined with `, `.
pub fn redact_headers<'a, I>(headers: I, max_value_bytes: usize) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut redacted: BTreeMap<String, String> = BTreeMap::new();

    for (name, value) in headers {
        let name = name.to_ascii_lowercase();
        let value = if SENSITIVE_HEADERS.contains(&name.as_str()) {
            MASK.to_string()
        } else {
            bounded_text(&mask_value(value), max_value_bytes)
        };

        redacted
            .entry(name)
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }

    redacted
}

/// Mask sensitive fields and secret-looking strings inside a JSON value
pub fn redact_json(value: Value) -> Value {
    match value {
        Value::String(s) => Value::String(mask_value(&s)),
        Value::Array(items) => Value::Array(items.into_iter().map(redact_json).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| {
                    if is_sensitive_field(&key) {
                        (key, Value::String(MASK.to_string()))
                    } else {
                        (key, redact_json(value))
                    }
                })
                .collect(),
        ),
        other => other,
    }
}

/// Mask credentials in key-value store command arguments
///
/// Every argument of `AUTH` is masked, as is everything after an `AUTH` or
/// `AUTH2` option (`HELLO`, `MIGRATE`). Other arguments go through
/// [`mask_value`].
pub fn redact_command_args(verb: &str, args: &[&str]) -> Vec<String> {
    let mut masking = verb.eq_ignore_ascii_case("AUTH");

    args.iter()
        .map(|arg| {
            if masking {
                return MASK.to_string();
            }
            if arg.eq_ignore_ascii_case("AUTH") || arg.eq_ignore_ascii_case("AUTH2") {
                masking = true;
                return arg.to_string();
            }
            mask_value(arg)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_redact_command_args() {
        assert_eq!(redact_command_args("AUTH", &["hunter2"]), vec![MASK]);
        assert_eq!(redact_command_args("auth", &["admin", "hunter2"]), vec![MASK, MASK]);
        assert_eq!(
            redact_command_args("HELLO", &["3", "auth", "admin", "hunter2"]),
            vec!["3", "auth", MASK, MASK]
        );
        assert_eq!(
            redact_command_args("SET", &["token", "sk-live-1234567890"]),
            vec!["token", "sk-live-***"]
        );
        assert_eq!(redact_command_args("GET", &["user:1"]), vec!["user:1"]);
    }

    #[test]
    fn test_masked_secret_display() {
        assert_eq!(MaskedSecret::new("sk-live-abcdef123456").to_string(), "sk-live-***");
        assert_eq!(MaskedSecret::new("sk-abc").to_string(), "***");
    }

    #[test]
    fn test_looks_like_secret() {
        assert!(looks_like_secret("sk-openai123"));
        assert!(looks_like_secret("Bearer abc.def.ghi"));
        assert!(looks_like_secret("pk-test123"));

        assert!(!looks_like_secret("my-app-name"));
        assert!(!looks_like_secret("application/json"));
    }

    #[test]
    fn test_redact_headers() {
        let headers = vec![
            ("Authorization", "Bearer secret-token"),
            ("Cookie", "session=abc"),
            ("Accept", "text/html"),
            ("Accept", "application/json"),
            ("X-Forwarded-Key", "sk-live-abcdef123456"),
        ];

        let redacted = redact_headers(headers, 100);
        assert_eq!(redacted["authorization"], MASK);
        assert_eq!(redacted["cookie"], MASK);
        assert_eq!(redacted["accept"], "text/html, application/json");
        assert_eq!(redacted["x-forwarded-key"], "sk-live-***");
    }

    #[test]
    fn test_redact_headers_bounds_values() {
        let long = "v".repeat(500);
        let redacted = redact_headers([("x-trace", long.as_str())], 32);
        assert!(redacted["x-trace"].len() < 64);
        assert!(redacted["x-trace"].ends_with("[truncated]"));
    }

    #[test]
    fn test_redact_json() {
        let payload = json!({
            "email": "ada@example.com",
            "password": "hunter2",
            "nested": { "Token": "abc", "key": "sk-live-abcdef123456" },
            "list": ["plain", "Bearer xyz-123456789"]
        });

        let redacted = redact_json(payload);
        assert_eq!(redacted["email"], "ada@example.com");
        assert_eq!(redacted["password"], MASK);
        assert_eq!(redacted["nested"]["Token"], MASK);
        assert_eq!(redacted["nested"]["key"], "sk-live-***");
        assert_eq!(redacted["list"][0], "plain");
        assert_eq!(redacted["list"][1], "Bearer x***");
    }
}
