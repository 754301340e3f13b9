pub mod metrics_handler;
pub mod recorder_api;
