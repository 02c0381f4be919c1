//! Dispatcher error codes and error type.
//!
//! Engine errors map onto stable envelope codes; their display strings are
//! forwarded without reinterpretation.

use gantry_runner::RunnerError;
use gantry_workflow::WorkflowError;

// ── Error code constants ────────────────────────────────────────────

/// Invalid or missing parameters.
pub const INVALID_PARAMS: &str = "INVALID_PARAMS";
/// Target row does not exist.
pub const NOT_FOUND: &str = "NOT_FOUND";
/// Disallowed task or project state transition.
pub const INVALID_TRANSITION: &str = "INVALID_TRANSITION";
/// Mutation of a locked command without force/reason.
pub const LOCKED: &str = "LOCKED";
/// Row-level precondition not satisfied (missing workspace path, branch,
/// build step).
pub const PRECONDITION_FAILED: &str = "PRECONDITION_FAILED";
/// Git invocation or merge failure.
pub const GIT_ERROR: &str = "GIT_ERROR";
/// Stored-command execution failure.
pub const EXEC_ERROR: &str = "EXEC_ERROR";
/// Process supervisor failure.
pub const RUNNER_ERROR: &str = "RUNNER_ERROR";
/// Action name not in the table.
pub const UNKNOWN_ACTION: &str = "UNKNOWN_ACTION";
/// Unexpected internal error.
pub const INTERNAL_ERROR: &str = "INTERNAL_ERROR";

/// Error type returned by action handlers.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// Required parameter missing or wrong type.
    #[error("{message}")]
    InvalidParams {
        /// What is wrong (`"{field} required"` style).
        message: String,
    },

    /// Domain error with a stable code and pass-through message.
    #[error("{message}")]
    Domain {
        code: &'static str,
        message: String,
    },

    /// Internal error.
    #[error("{message}")]
    Internal { message: String },
}

impl ActionError {
    /// `"{field} required"`.
    pub fn required(field: &str) -> Self {
        Self::InvalidParams {
            message: format!("{field} required"),
        }
    }

    /// `"{a} and {b} required"`.
    pub fn required_pair(a: &str, b: &str) -> Self {
        Self::InvalidParams {
            message: format!("{a} and {b} required"),
        }
    }

    /// Machine-readable code for this error.
    pub fn code(&self) -> &str {
        match self {
            Self::InvalidParams { .. } => INVALID_PARAMS,
            Self::Domain { code, .. } => code,
            Self::Internal { .. } => INTERNAL_ERROR,
        }
    }
}

impl From<WorkflowError> for ActionError {
    fn from(err: WorkflowError) -> Self {
        let code = match &err {
            WorkflowError::ProjectNotFound(_)
            | WorkflowError::TaskNotFound(_)
            | WorkflowError::CommandNotFound(_) => NOT_FOUND,
            WorkflowError::Validation(_) => INVALID_PARAMS,
            WorkflowError::Transition { .. } | WorkflowError::ProjectTransition { .. } => {
                INVALID_TRANSITION
            }
            WorkflowError::Locked(_) | WorkflowError::LockReasonRequired => LOCKED,
            WorkflowError::Precondition(_) => PRECONDITION_FAILED,
            WorkflowError::MergeFailed(_) | WorkflowError::Git(_) => GIT_ERROR,
            WorkflowError::Exec(_) => EXEC_ERROR,
            WorkflowError::Sqlite(_) | WorkflowError::Pool(_) => INTERNAL_ERROR,
        };
        Self::Domain {
            code,
            message: err.to_string(),
        }
    }
}

impl From<RunnerError> for ActionError {
    fn from(err: RunnerError) -> Self {
        let code = match &err {
            RunnerError::NotFound(_) => NOT_FOUND,
            RunnerError::CwdNotAllowed(_) => INVALID_PARAMS,
            _ => RUNNER_ERROR,
        };
        Self::Domain {
            code,
            message: err.to_string(),
        }
    }
}
