//! # gantry-runner
//!
//! Durable subprocess supervisor: long-lived children tracked by
//! machine-identified records, with tag-based group operations,
//! crash/restart recovery, and capped log spooling.

#![deny(unsafe_code)]

pub mod errors;
pub mod state;
pub mod supervisor;
pub mod types;

pub use errors::RunnerError;
pub use supervisor::Supervisor;
pub use types::{LogSlice, LogsRequest, RunStatus, RunnerConfig, StartRequest, StateFile, TaskRecord};

/// Current UTC timestamp as ISO 8601.
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}
