use super::{keyed, millis, WatcherScope};
use crate::recorder::{bounded_text, bounded_value, family_hash, Entry, Extra, JobContent, JobStatus};
use crate::redact::redact_json;
use serde_json::Value;
use std::time::Duration;

/// Queued job as seen by the queue adapter
#[derive(Debug, Clone, Default)]
pub struct JobMeta {
    pub id: String,
    pub job_type: String,
    pub queue: String,
    pub connection: Option<String>,
    pub payload: Option<Value>,
    /// 1-based attempt number
    pub attempt: u32,
    /// Attempts allowed before the job is given up
    pub max_attempts: u32,
}

impl JobMeta {
    pub fn new(id: impl Into<String>, job_type: impl Into<String>, queue: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            job_type: job_type.into(),
            queue: queue.into(),
            attempt: 1,
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_attempts(mut self, attempt: u32, max_attempts: u32) -> Self {
        self.attempt = attempt;
        self.max_attempts = max_attempts;
        self
    }
}

/// Why a job attempt failed and what happens next
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    pub error: String,
    pub retries: u32,
    pub will_retry: bool,
}

impl JobFailure {
    /// Failure of the attempt described by `meta`
    pub fn for_attempt(meta: &JobMeta, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            retries: meta.attempt.saturating_sub(1),
            will_retry: meta.attempt < meta.max_attempts,
        }
    }
}

/// Records job lifecycle points
pub struct JobWatcher<'a> {
    scope: WatcherScope<'a>,
}

impl<'a> JobWatcher<'a> {
    pub(crate) fn new(scope: WatcherScope<'a>) -> Self {
        Self { scope }
    }

    pub fn record_dispatched(&self, job: &JobMeta) {
        self.record(job, JobStatus::Dispatched, None, None);
    }

    pub fn record_started(&self, job: &JobMeta) {
        self.record(job, JobStatus::Started, None, None);
    }

    pub fn record_completed(&self, job: &JobMeta, duration: Option<Duration>) {
        self.record(job, JobStatus::Completed, None, duration);
    }

    pub fn record_failed(&self, job: &JobMeta, failure: &JobFailure, duration: Option<Duration>) {
        self.record(job, JobStatus::Failed, Some(failure), duration);
    }

    fn record(
        &self,
        job: &JobMeta,
        status: JobStatus,
        failure: Option<&JobFailure>,
        duration: Option<Duration>,
    ) {
        self.scope.capture(&job.job_type, || {
            let limit = self.scope.settings().payload_limit;

            let mut tags = vec![
                keyed("queue", &job.queue),
                keyed("job", &job.job_type),
                status.as_str().to_string(),
            ];
            if failure.is_some_and(|f| f.will_retry) {
                tags.push("will-retry".to_string());
            }

            let content = JobContent {
                job_id: job.id.clone(),
                name: job.job_type.clone(),
                queue: job.queue.clone(),
                connection: job.connection.clone(),
                status,
                payload: job
                    .payload
                    .as_ref()
                    .map(|p| bounded_value(redact_json(p.clone()), limit))
                    .unwrap_or(Value::Null),
                error: failure.map(|f| bounded_text(&f.error, limit)),
                retries: failure.map(|f| f.retries),
                will_retry: failure.map(|f| f.will_retry),
                duration_ms: duration.map(millis),
                extra: Extra::new(),
            };

            // Dispatches and failures are listed; intermediate steps are not
            let display = matches!(status, JobStatus::Dispatched | JobStatus::Failed);

            Entry::new(content, tags, Some(family_hash(&["job", &job.id])), display)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_for_attempt() {
        let meta = JobMeta::new("j1", "SendInvoice", "mail").with_attempts(2, 3);
        let failure = JobFailure::for_attempt(&meta, "smtp down");
        assert_eq!(failure.retries, 1);
        assert!(failure.will_retry);

        let last = JobMeta::new("j1", "SendInvoice", "mail").with_attempts(3, 3);
        assert!(!JobFailure::for_attempt(&last, "smtp down").will_retry);
    }
}
