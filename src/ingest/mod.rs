//! Ingestion adapters
//!
//! Glue between host frameworks and the watchers. Each adapter wraps one unit
//! of work in a batch and never turns a recorder problem into an error for the
//! code it observes.

pub mod cli;
pub mod db;
pub mod http;
pub mod queue;

pub use cli::{observe_command, CommandOutcome};
pub use db::observe_query;
pub use http::record_requests;
pub use queue::{dispatch_job, observe_job};
