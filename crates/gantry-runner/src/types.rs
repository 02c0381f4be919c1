//! Durable record types for supervised tasks.
//!
//! Serialized camelCase into `state.json`; the wire shape is the persisted
//! shape.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Lifecycle status of a supervised task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Running,
    Stopped,
    Failed,
    Killed,
    Timeout,
    /// Assigned during recovery when a tracked PID is no longer alive and
    /// the end state is unknown.
    Lost,
}

impl RunStatus {
    /// Everything but `pending` and `running` is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending | Self::Running)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
            Self::Killed => "killed",
            Self::Timeout => "timeout",
            Self::Lost => "lost",
        };
        f.write_str(s)
    }
}

/// Durable record of one supervised task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskRecord {
    pub id: String,
    pub status: RunStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    pub command: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Explicit environment overrides only; the inherited environment is
    /// re-derived (and re-filtered) on every spawn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_signal: Option<String>,
    pub log_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pid_path: Option<String>,
    #[serde(default)]
    pub stdin_attached: bool,
}

impl TaskRecord {
    /// Whether this record shares at least one tag with `tags`.
    #[must_use]
    pub fn shares_tag(&self, tags: &[String]) -> bool {
        match &self.tags {
            Some(own) => own.iter().any(|t| tags.contains(t)),
            None => false,
        }
    }
}

/// The persisted supervisor state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile {
    pub version: u32,
    pub updated_at: String,
    pub tasks: BTreeMap<String, TaskRecord>,
}

impl StateFile {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            version: 1,
            updated_at: crate::now_iso(),
            tasks: BTreeMap::new(),
        }
    }
}

/// Request to start (or restart) a supervised task.
#[derive(Debug, Clone, Default)]
pub struct StartRequest {
    /// Caller-supplied id; a short random id is generated if omitted.
    pub id: Option<String>,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: Option<String>,
    pub env: Option<HashMap<String, String>>,
    pub tags: Option<Vec<String>>,
    pub project_id: Option<String>,
    /// Replace an existing terminal record with the same id.
    pub replace: bool,
    /// With `replace`, stop a still-running task first.
    pub force: bool,
    /// Stop all running tasks sharing a tag with `tags` before starting.
    pub force_by_tags: bool,
    /// Timeout for any stop performed on our behalf.
    pub stop_timeout_ms: Option<u64>,
    /// Kill the task and mark it `timeout` if it runs longer than this.
    pub run_timeout_ms: Option<u64>,
}

/// Request for a slice of a task's spooled log.
#[derive(Debug, Clone, Default)]
pub struct LogsRequest {
    pub id: String,
    /// Read the last N bytes.
    pub tail_bytes: Option<u64>,
    /// Read from this byte offset (wins over `tail_bytes`).
    pub since_bytes: Option<u64>,
    /// Cap on returned bytes.
    pub max_bytes: Option<u64>,
}

/// A slice of a task's log.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LogSlice {
    pub id: String,
    pub path: String,
    pub size: u64,
    pub offset: u64,
    pub content: String,
}

/// Supervisor configuration. Plain struct with defaults; not flags.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Root for `state.json`, `logs/`, and `pids/`.
    pub base_dir: PathBuf,
    /// Prefixes a task cwd must live under.
    pub allowed_cwds: Vec<PathBuf>,
    /// Hard cap on a task's log file; the file is truncated and restarted
    /// when appending would exceed it.
    pub max_log_size_bytes: u64,
    /// Default SIGTERM→SIGKILL grace period.
    pub stop_timeout_ms: u64,
    /// Environment variables stripped from the inherited environment.
    pub blocked_env: Vec<String>,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        Self {
            base_dir: PathBuf::from(&home).join(".gantry").join("runner"),
            allowed_cwds: vec![PathBuf::from(home)],
            max_log_size_bytes: 10 * 1024 * 1024,
            stop_timeout_ms: 5000,
            blocked_env: ["NODE_OPTIONS", "LD_PRELOAD", "BASH_ENV"]
                .iter()
                .map(ToString::to_string)
                .collect(),
        }
    }
}

impl RunnerConfig {
    #[must_use]
    pub fn state_path(&self) -> PathBuf {
        self.base_dir.join("state.json")
    }

    #[must_use]
    pub fn log_path(&self, id: &str) -> PathBuf {
        self.base_dir.join("logs").join(format!("{id}.log"))
    }

    #[must_use]
    pub fn pid_path(&self, id: &str) -> PathBuf {
        self.base_dir.join("pids").join(format!("{id}.pid"))
    }

    /// Whether `cwd` falls under one of the allowed prefixes.
    #[must_use]
    pub fn cwd_allowed(&self, cwd: &Path) -> bool {
        self.allowed_cwds.iter().any(|p| cwd.starts_with(p))
    }
}
