use super::{keyed, millis, WatcherScope};
use crate::recorder::{bounded_text, family_hash, Entry, Extra, RedisContent};
use crate::redact::redact_command_args;
use std::time::Duration;

/// Records key-value store commands
pub struct RedisWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> RedisWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    /// Record one command with its arguments
    ///
    /// Only slow commands are listed on the index. Credentials in the
    /// arguments are masked before anything is stored.
    pub fn record_command(&self, connection: &str, command: &str, args: &[&str], duration: Duration) {
        let verb = command.trim().to_ascii_uppercase();
        let command_line = std::iter::once(verb.clone())
            .chain(redact_command_args(&verb, args))
            .collect::<Vec<_>>()
            .join(" ");

        self.scope.capture(&command_line, || {
            let settings = self.scope.settings();
            let slow = duration > settings.slow_redis;

            let mut tags = vec![keyed("connection", connection), keyed("command", &verb)];
            if slow {
                tags.push("slow".to_string());
            }

            let content = RedisContent {
                connection: connection.to_string(),
                command: bounded_text(&command_line, settings.payload_limit),
                duration_ms: millis(duration),
                slow,
                extra: Extra::new(),
            };

            let arity = args.len().to_string();

            Entry::new(content, tags, Some(family_hash(&["redis", &verb, &arity])), slow)
        });
    }
}
