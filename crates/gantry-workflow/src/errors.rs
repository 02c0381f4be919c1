//! Workflow error taxonomy.
//!
//! Display strings are part of the wire contract: the dispatcher forwards
//! them into envelope errors without rewording.

use crate::types::{ProjectState, TaskStatus};

/// Errors surfaced by the workflow engine.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(i64),

    #[error("Command not found: {0}")]
    CommandNotFound(String),

    /// Missing or blank required field.
    #[error("{0}")]
    Validation(String),

    /// The conditional status update matched no row: either the task is
    /// gone or its current status is outside the allowed-from set.
    #[error("Task status transition failed for {task_id}: {from} -> {to}")]
    Transition {
        task_id: i64,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Invalid project state transition: {from} -> {to}")]
    ProjectTransition {
        from: ProjectState,
        to: ProjectState,
    },

    #[error("Command {0} is locked")]
    Locked(i64),

    #[error("force reason required when mutating locked command")]
    LockReasonRequired,

    /// A required precondition on the row is not satisfied (missing
    /// workspace path, missing branch, missing build step).
    #[error("{0}")]
    Precondition(String),

    /// Git merge failed for a reason other than a conflict.
    #[error("Merge failed: {0}")]
    MergeFailed(String),

    /// Git invocation failure (spawn error, worktree creation failure).
    #[error("Git error: {0}")]
    Git(String),

    /// Stored-command execution failure (spawn error or timeout).
    #[error("Command execution failed: {0}")]
    Exec(String),

    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Connection pool error: {0}")]
    Pool(#[from] r2d2::Error),
}

impl From<gantry_store::StoreError> for WorkflowError {
    fn from(err: gantry_store::StoreError) -> Self {
        match err {
            gantry_store::StoreError::Sqlite(e) => Self::Sqlite(e),
            gantry_store::StoreError::Pool(e) => Self::Pool(e),
        }
    }
}

/// Result alias for workflow operations.
pub type Result<T> = std::result::Result<T, WorkflowError>;
