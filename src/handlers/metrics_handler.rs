use crate::recorder::Recorder;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// State for the /metrics endpoint
#[derive(Clone)]
pub struct MetricsState {
    pub handle: Arc<PrometheusHandle>,
    pub recorder: Arc<Recorder>,
}

/// Handle /metrics endpoint
pub async fn metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    crate::metrics::record_capturing(state.recorder.is_capturing());
    (StatusCode::OK, state.handle.render())
}
