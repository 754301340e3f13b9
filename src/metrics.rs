use crate::recorder::EntryType;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

/// Install the Prometheus metrics exporter
///
/// Fails if a global metrics recorder is already installed.
pub fn init_metrics() -> anyhow::Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    init_metric_descriptions();

    Ok(handle)
}

/// Initialize metric descriptions (can be called multiple times safely)
fn init_metric_descriptions() {
    describe_counter!(
        "recorder_entries_recorded_total",
        "Entries accepted by the recorder, by entry type"
    );
    describe_counter!(
        "recorder_entries_dropped_total",
        "Entries dropped before reaching the store, by reason"
    );
    describe_counter!(
        "recorder_entries_written_total",
        "Entries appended to the store"
    );
    describe_histogram!(
        "recorder_flush_duration_seconds",
        "Duration of one store append"
    );
    describe_counter!(
        "recorder_entries_cleared_total",
        "Entries removed by clear or retention cleanup"
    );
    describe_gauge!("recorder_info", "Recorder version information");
    describe_gauge!(
        "recorder_capturing",
        "Whether the recorder is enabled and recording (1) or not (0)"
    );

    gauge!("recorder_info", "version" => env!("CARGO_PKG_VERSION")).set(1.0);
}

/// Record an accepted entry
pub fn record_entry(entry_type: EntryType) {
    counter!("recorder_entries_recorded_total", "type" => entry_type.as_str()).increment(1);
}

/// Record dropped entries
pub fn record_entries_dropped(reason: &'static str, count: u64) {
    counter!("recorder_entries_dropped_total", "reason" => reason).increment(count);
}

/// Record a successful store append
pub fn record_flush(count: usize, duration: Duration) {
    counter!("recorder_entries_written_total").increment(count as u64);
    histogram!("recorder_flush_duration_seconds").record(duration.as_secs_f64());
}

/// Publish the recorder switches
pub fn record_capturing(capturing: bool) {
    gauge!("recorder_capturing").set(if capturing { 1.0 } else { 0.0 });
}

/// Record cleared entries
pub fn record_cleared(count: u64) {
    counter!("recorder_entries_cleared_total").increment(count);
}
