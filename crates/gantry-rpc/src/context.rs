//! Dispatcher dependency-injection context.

use std::sync::Arc;

use gantry_runner::Supervisor;
use gantry_workflow::WorkflowService;

/// Shared context passed to every action handler.
pub struct ActionContext {
    /// The workflow engine.
    pub workflow: Arc<WorkflowService>,
    /// The process supervisor; optional so engine-only deployments (and
    /// tests) can run without one.
    pub runner: Option<Arc<Supervisor>>,
}
