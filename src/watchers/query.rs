use super::{keyed, millis, WatcherScope};
use crate::recorder::{bounded_text, bounded_value, family_hash, Entry, Extra, QueryContent};
use crate::redact::redact_json;
use serde_json::Value;
use std::time::Duration;

/// Bindings kept per query
const MAX_BINDINGS: usize = 100;

/// Statement kinds that get their own tag
const STATEMENT_KINDS: [&str; 8] = [
    "select", "insert", "update", "delete", "create", "alter", "drop", "with",
];

/// Records executed database statements
pub struct QueryWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> QueryWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    /// Record one executed statement
    ///
    /// # Example
    ///
    /// ```ignore
    /// recorder.queries().record_query(
    ///     "main",
    ///     "SELECT * FROM users WHERE id = ?",
    ///     &[json!(42)],
    ///     Duration::from_millis(3),
    /// );
    /// ```
    pub fn record_query(&self, connection: &str, sql: &str, bindings: &[Value], duration: Duration) {
        self.scope.capture(sql, || {
            let settings = self.scope.settings();
            let limit = settings.payload_limit;
            let slow = duration > settings.slow_query;

            let mut tags = vec![keyed("connection", connection)];
            if let Some(kind) = statement_kind(sql) {
                tags.push(kind.to_string());
            }
            if slow {
                tags.push("slow".to_string());
            }

            let content = QueryContent {
                connection: connection.to_string(),
                sql: bounded_text(sql, limit),
                bindings: bindings
                    .iter()
                    .take(MAX_BINDINGS)
                    .map(|b| bounded_value(redact_json(b.clone()), limit))
                    .collect(),
                duration_ms: millis(duration),
                slow,
                extra: Extra::new(),
            };

            let shape = self.scope.normalizer().normalize_sql(sql);

            Entry::new(content, tags, Some(family_hash(&["query", &shape])), true)
        });
    }
}

fn statement_kind(sql: &str) -> Option<&'static str> {
    let first = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()?
        .to_ascii_lowercase();

    STATEMENT_KINDS.iter().copied().find(|kind| *kind == first)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statement_kind() {
        assert_eq!(statement_kind("SELECT 1"), Some("select"));
        assert_eq!(statement_kind("  (select 1) union (select 2)"), Some("select"));
        assert_eq!(statement_kind("insert into t values (1)"), Some("insert"));
        assert_eq!(statement_kind("PRAGMA journal_mode"), None);
        assert_eq!(statement_kind(""), None);
    }
}
