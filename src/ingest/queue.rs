use crate::recorder::Recorder;
use crate::watchers::{JobFailure, JobMeta};
use std::fmt::Display;
use std::future::Future;
use std::time::Instant;

/// Record that `job` was pushed onto its queue
pub fn dispatch_job(recorder: &Recorder, job: &JobMeta) {
    recorder.jobs().record_dispatched(job);
}

/// Run one attempt of `job`, recording start and outcome in one batch
///
/// Retry information on failure comes from the attempt counters in `job`.
///
/// # Example
///
/// ```ignore
/// let meta = JobMeta::new(id, "SendInvoice", "mail").with_attempts(attempt, 3);
/// observe_job(&recorder, &meta, send_invoice(order)).await?;
/// ```
pub async fn observe_job<F, T, E>(recorder: &Recorder, job: &JobMeta, fut: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
    E: Display,
{
    recorder
        .with_batch(async {
            recorder.jobs().record_started(job);
            let started = Instant::now();

            let result = fut.await;
            let elapsed = Some(started.elapsed());

            match &result {
                Ok(_) => recorder.jobs().record_completed(job, elapsed),
                Err(e) => {
                    let failure = JobFailure::for_attempt(job, e.to_string());
                    if !failure.will_retry {
                        tracing::debug!(job_id = %job.id, job = %job.job_type, "Job out of attempts");
                    }
                    recorder.jobs().record_failed(job, &failure, elapsed);
                }
            }

            result
        })
        .await
}
