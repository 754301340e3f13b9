use crate::recorder::Recorder;
use crate::watchers::CommandToken;
use std::future::Future;

/// How a command run ended
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutcome {
    pub exit_code: i32,
    pub output: String,
}

impl CommandOutcome {
    pub fn success(output: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            output: output.into(),
        }
    }

    pub fn failure(exit_code: i32, output: impl Into<String>) -> Self {
        Self {
            exit_code,
            output: output.into(),
        }
    }
}

/// Cancels a started command unless it was finished
struct PendingGuard<'a> {
    recorder: &'a Recorder,
    token: Option<CommandToken>,
}

impl PendingGuard<'_> {
    fn finish(mut self, outcome: &CommandOutcome) {
        if let Some(token) = self.token.take() {
            self.recorder
                .commands()
                .finish(&token, outcome.exit_code, None, &outcome.output);
        }
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        if let Some(token) = self.token.take() {
            self.recorder.commands().cancel(&token);
        }
    }
}

/// Run a command future between start and finish, inside one batch
///
/// Dropping the returned future before the command ends cancels the run.
pub async fn observe_command<F>(recorder: &Recorder, name: &str, args: &[String], fut: F) -> CommandOutcome
where
    F: Future<Output = CommandOutcome>,
{
    recorder
        .with_batch(async {
            let guard = PendingGuard {
                recorder,
                token: Some(recorder.commands().start(name, args)),
            };
            let outcome = fut.await;
            guard.finish(&outcome);
            outcome
        })
        .await
}
