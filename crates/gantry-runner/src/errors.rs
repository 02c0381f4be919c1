//! Supervisor error type.

/// Errors surfaced by the process supervisor.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    #[error("Task already exists: {0}")]
    AlreadyExists(String),

    #[error("Task {0} is still running")]
    StillRunning(String),

    #[error("Task not found: {0}")]
    NotFound(String),

    #[error("cwd {0} is outside the allowed directories")]
    CwdNotAllowed(String),

    #[error("stdin is not attached for task {0}")]
    StdinNotAttached(String),

    #[error("Spawn failed: {0}")]
    Spawn(String),

    #[error("timed out waiting for task {0}")]
    WaitTimeout(String),

    #[error("State file error: {0}")]
    State(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias for supervisor operations.
pub type Result<T> = std::result::Result<T, RunnerError>;
