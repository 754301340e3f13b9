use super::{keyed, millis, WatcherScope};
use crate::recorder::{bounded_text, family_hash, Entry, CommandContent, Extra};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Commands that may be pending at once
const MAX_PENDING: usize = 1024;

/// Correlates the start and finish of one command run
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CommandToken(String);

impl CommandToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug)]
struct PendingCommand {
    name: String,
    arguments: Vec<String>,
    started: Instant,
    seq: u64,
}

/// Commands started but not finished yet
#[derive(Debug, Default)]
pub(crate) struct PendingCommands {
    commands: DashMap<String, PendingCommand>,
    next_seq: AtomicU64,
}

impl PendingCommands {
    pub(crate) fn len(&self) -> usize {
        self.commands.len()
    }

    /// Drop the longest-running pending command
    fn evict_oldest(&self) -> Option<String> {
        let oldest = self
            .commands
            .iter()
            .min_by_key(|pending| pending.seq)
            .map(|pending| pending.key().clone())?;

        self.commands.remove(&oldest).map(|(_, command)| command.name)
    }
}

/// Records command-line runs
pub struct CommandWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> CommandWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    /// Register a starting command
    ///
    /// Always returns a token; when the watcher is off or the command is
    /// ignored nothing is registered and `finish` becomes a no-op. When too
    /// many commands are pending the oldest one is forgotten.
    pub fn start(&self, name: &str, args: &[String]) -> CommandToken {
        let token = CommandToken(Uuid::new_v4().to_string());

        if !self.scope.accepts(name) {
            return token;
        }

        let pending = self.scope.recorder().pending_commands();
        while pending.len() >= MAX_PENDING {
            let Some(evicted) = pending.evict_oldest() else {
                break;
            };
            tracing::warn!(command = %evicted, "Too many unfinished commands, forgetting the oldest");
        }

        pending.commands.insert(
            token.0.clone(),
            PendingCommand {
                name: name.to_string(),
                arguments: args.to_vec(),
                started: Instant::now(),
                seq: pending.next_seq.fetch_add(1, Ordering::Relaxed),
            },
        );

        token
    }

    /// Forget a command that will never finish
    ///
    /// Nothing is recorded. Unknown tokens are ignored.
    pub fn cancel(&self, token: &CommandToken) {
        if let Some((_, command)) = self.scope.recorder().pending_commands().commands.remove(&token.0) {
            tracing::debug!(command = %command.name, token = %token.0, "Command cancelled before finishing");
        }
    }

    /// Record a finished command
    ///
    /// `duration` defaults to the time since `start`. Unknown tokens are ignored.
    pub fn finish(&self, token: &CommandToken, exit_code: i32, duration: Option<Duration>, output: &str) {
        let Some((_, command)) = self.scope.recorder().pending_commands().commands.remove(&token.0)
        else {
            tracing::debug!(token = %token.0, "Finish for unknown command token");
            return;
        };

        self.scope.capture(&command.name, || {
            let limit = self.scope.settings().payload_limit;
            let duration = duration.unwrap_or_else(|| command.started.elapsed());

            let mut tags = vec![keyed("command", &command.name)];
            if exit_code != 0 {
                tags.push("failed".to_string());
            }

            let content = CommandContent {
                correlation_id: token.0.clone(),
                command: command.name.clone(),
                arguments: command.arguments.iter().map(|a| bounded_text(a, limit)).collect(),
                exit_code,
                duration_ms: millis(duration),
                output: bounded_text(output, limit),
                extra: Extra::new(),
            };

            Entry::new(
                content,
                tags,
                Some(family_hash(&["command", &command.name])),
                true,
            )
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RecorderConfig;
    use crate::recorder::{EntryQuery, EntryType, Recorder};

    async fn recorder() -> Recorder {
        let recorder = Recorder::new(&RecorderConfig::default()).unwrap();
        recorder.initialize(Some("memory")).await.unwrap();
        recorder
    }

    #[tokio::test]
    async fn test_cancel_forgets_pending_command() {
        let recorder = recorder().await;

        let token = recorder.commands().start("queue:work", &[]);
        assert_eq!(recorder.pending_commands().len(), 1);

        recorder.commands().cancel(&token);
        assert_eq!(recorder.pending_commands().len(), 0);

        // A late finish is ignored
        recorder.commands().finish(&token, 0, None, "");
        recorder.flush().await;
        assert!(recorder.get_entries(&EntryQuery::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_full_registry_forgets_oldest() {
        let recorder = recorder().await;

        let first = recorder.commands().start("stuck:0", &[]);
        for i in 1..MAX_PENDING {
            recorder.commands().start(&format!("stuck:{}", i), &[]);
        }
        assert_eq!(recorder.pending_commands().len(), MAX_PENDING);

        let token = recorder.commands().start("migrate", &[]);
        assert_eq!(recorder.pending_commands().len(), MAX_PENDING);

        recorder.commands().finish(&first, 0, None, "");
        recorder.commands().finish(&token, 0, None, "done");
        recorder.flush().await;

        let entries = recorder
            .get_entries(&EntryQuery::default().of_type(EntryType::Command))
            .await
            .unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].has_tag("command:migrate"));
    }
}
