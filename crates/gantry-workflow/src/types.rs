//! Core types for the workflow engine.
//!
//! All serializable types use `camelCase` for wire compatibility. Enum
//! values match the `SQLite` CHECK constraints via `as_sql`/`from_sql`.

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// Project lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectState {
    Planning,
    Active,
    Paused,
    Complete,
    Archived,
}

impl ProjectState {
    /// SQL string representation (matches the CHECK constraint values).
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Archived => "archived",
        }
    }

    /// Parse from the SQL string representation.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "planning" => Some(Self::Planning),
            "active" => Some(Self::Active),
            "paused" => Some(Self::Paused),
            "complete" => Some(Self::Complete),
            "archived" => Some(Self::Archived),
            _ => None,
        }
    }
}

impl std::fmt::Display for ProjectState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Task status in the workflow lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Requirements,
    Implementing,
    ReviewRequested,
    ChangesRequested,
    Approved,
    Merging,
    MergeConflict,
    Building,
    Deploying,
    Done,
    Blocked,
    Cancelled,
}

impl TaskStatus {
    /// Whether this status is terminal.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }

    /// SQL string representation (matches the CHECK constraint values).
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Implementing => "implementing",
            Self::ReviewRequested => "review_requested",
            Self::ChangesRequested => "changes_requested",
            Self::Approved => "approved",
            Self::Merging => "merging",
            Self::MergeConflict => "merge_conflict",
            Self::Building => "building",
            Self::Deploying => "deploying",
            Self::Done => "done",
            Self::Blocked => "blocked",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse from the SQL string representation.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "requirements" => Some(Self::Requirements),
            "implementing" => Some(Self::Implementing),
            "review_requested" => Some(Self::ReviewRequested),
            "changes_requested" => Some(Self::ChangesRequested),
            "approved" => Some(Self::Approved),
            "merging" => Some(Self::Merging),
            "merge_conflict" => Some(Self::MergeConflict),
            "building" => Some(Self::Building),
            "deploying" => Some(Self::Deploying),
            "done" => Some(Self::Done),
            "blocked" => Some(Self::Blocked),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Task classification, controlling branching/review defaults at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskType {
    Feature,
    Bugfix,
    Iteration,
    Hotfix,
    Chore,
}

impl TaskType {
    /// SQL string representation.
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Feature => "feature",
            Self::Bugfix => "bugfix",
            Self::Iteration => "iteration",
            Self::Hotfix => "hotfix",
            Self::Chore => "chore",
        }
    }

    /// Parse from the SQL string representation.
    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "feature" => Some(Self::Feature),
            "bugfix" => Some(Self::Bugfix),
            "iteration" => Some(Self::Iteration),
            "hotfix" => Some(Self::Hotfix),
            "chore" => Some(Self::Chore),
            _ => None,
        }
    }

    /// Default `(requires_branching, requires_human_review)` for this type.
    ///
    /// Applied only at creation; callers may override either flag.
    #[must_use]
    pub fn default_flags(self) -> (bool, bool) {
        match self {
            Self::Feature => (true, true),
            Self::Bugfix => (true, false),
            Self::Iteration => (false, true),
            Self::Hotfix => (false, false),
            Self::Chore => (true, false),
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Category of a project link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkCategory {
    Dev,
    Prod,
    Docs,
    Admin,
    Api,
    Other,
}

impl LinkCategory {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Prod => "prod",
            Self::Docs => "docs",
            Self::Admin => "admin",
            Self::Api => "api",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "dev" => Some(Self::Dev),
            "prod" => Some(Self::Prod),
            "docs" => Some(Self::Docs),
            "admin" => Some(Self::Admin),
            "api" => Some(Self::Api),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// Category of a stored command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandCategory {
    Dev,
    Build,
    Test,
    Deploy,
    Lint,
    Db,
    Other,
}

impl CommandCategory {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Dev => "dev",
            Self::Build => "build",
            Self::Test => "test",
            Self::Deploy => "deploy",
            Self::Lint => "lint",
            Self::Db => "db",
            Self::Other => "other",
        }
    }

    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "dev" => Some(Self::Dev),
            "build" => Some(Self::Build),
            "test" => Some(Self::Test),
            "deploy" => Some(Self::Deploy),
            "lint" => Some(Self::Lint),
            "db" => Some(Self::Db),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

/// How a stored command runs: synchronously or handed to the task runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Exec,
    Task,
}

impl RunMode {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Exec => "exec",
            Self::Task => "task",
        }
    }

    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "exec" => Some(Self::Exec),
            "task" => Some(Self::Task),
            _ => None,
        }
    }
}

/// Category of a project memory note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Mistake,
    Learning,
    Convention,
    Gotcha,
    Decision,
}

impl MemoryCategory {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Mistake => "mistake",
            Self::Learning => "learning",
            Self::Convention => "convention",
            Self::Gotcha => "gotcha",
            Self::Decision => "decision",
        }
    }

    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "mistake" => Some(Self::Mistake),
            "learning" => Some(Self::Learning),
            "convention" => Some(Self::Convention),
            "gotcha" => Some(Self::Gotcha),
            "decision" => Some(Self::Decision),
            _ => None,
        }
    }
}

/// Outcome of an agent run against a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Partial,
    Failed,
    Abandoned,
}

impl AttemptOutcome {
    #[must_use]
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Failed => "failed",
            Self::Abandoned => "abandoned",
        }
    }

    #[must_use]
    pub fn from_sql(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row structs
// ─────────────────────────────────────────────────────────────────────────────

/// A project row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub workspace_path: Option<String>,
    pub remote_url: Option<String>,
    pub telegram_topic_id: Option<i64>,
    pub has_build_step: bool,
    pub has_deploy_step: bool,
    pub state: ProjectState,
    pub created_at: String,
    pub updated_at: String,
}

/// A workflow task row.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowTask {
    pub id: i64,
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub status_before_blocked: Option<TaskStatus>,
    pub requires_branching: bool,
    pub requires_human_review: bool,
    pub priority: i64,
    pub phase: Option<String>,
    pub assigned_model: Option<String>,
    pub git_branch: Option<String>,
    pub worktree_path: Option<String>,
    pub dev_server_url: Option<String>,
    pub review_notes: Option<String>,
    pub review_feedback: Option<String>,
    pub block_reason: Option<String>,
    pub completed_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A dependency edge: `task_id` depends on `depends_on_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDependency {
    pub task_id: i64,
    pub depends_on_id: i64,
    pub created_at: String,
}

/// One row of the append-only status history.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusHistoryEntry {
    pub id: i64,
    pub task_id: i64,
    pub from_status: Option<TaskStatus>,
    pub to_status: TaskStatus,
    pub actor: Option<String>,
    pub reason: Option<String>,
    pub created_at: String,
}

/// One recorded agent run against a task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskAttempt {
    pub id: i64,
    pub task_id: i64,
    pub session_key: Option<String>,
    pub model: Option<String>,
    pub summary: Option<String>,
    pub outcome: AttemptOutcome,
    pub created_at: String,
}

/// A labelled project link.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectLink {
    pub id: i64,
    pub project_id: String,
    pub label: String,
    pub url: String,
    pub category: LinkCategory,
    pub created_at: String,
}

/// A named, project-scoped shell command template.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredCommand {
    pub id: i64,
    pub project_id: String,
    pub label: String,
    pub command: String,
    pub category: CommandCategory,
    pub run_mode: RunMode,
    pub task_runner_id: Option<String>,
    pub locked: bool,
    pub locked_by: Option<String>,
    pub locked_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A typed project memory note.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNote {
    pub id: i64,
    pub project_id: String,
    pub category: MemoryCategory,
    pub content: String,
    pub created_at: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter structs
// ─────────────────────────────────────────────────────────────────────────────

/// Parameters for creating a project.
#[derive(Debug, Clone, Default)]
pub struct ProjectCreateParams {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub workspace_path: Option<String>,
    pub remote_url: Option<String>,
    pub telegram_topic_id: Option<i64>,
    pub has_build_step: Option<bool>,
    pub has_deploy_step: Option<bool>,
}

/// Parameters for updating a project. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdateParams {
    pub name: Option<String>,
    pub description: Option<String>,
    pub workspace_path: Option<String>,
    pub remote_url: Option<String>,
    pub telegram_topic_id: Option<i64>,
    pub has_build_step: Option<bool>,
    pub has_deploy_step: Option<bool>,
    pub state: Option<ProjectState>,
}

/// Parameters for creating a task.
#[derive(Debug, Clone, Default)]
pub struct TaskCreateParams {
    pub project_id: String,
    pub title: String,
    pub description: Option<String>,
    pub task_type: Option<TaskType>,
    pub priority: Option<i64>,
    pub requires_branching: Option<bool>,
    pub requires_human_review: Option<bool>,
    pub phase: Option<String>,
    pub assigned_model: Option<String>,
}

/// Parameters for updating non-lifecycle task fields.
#[derive(Debug, Clone, Default)]
pub struct TaskUpdateParams {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<i64>,
    pub phase: Option<String>,
    pub assigned_model: Option<String>,
    pub dev_server_url: Option<String>,
    pub review_notes: Option<String>,
    pub review_feedback: Option<String>,
}

/// Parameters for creating a stored command.
#[derive(Debug, Clone, Default)]
pub struct CommandCreateParams {
    pub project_id: String,
    pub label: String,
    pub command: String,
    pub category: Option<CommandCategory>,
    pub run_mode: Option<RunMode>,
    pub task_runner_id: Option<String>,
}

/// Parameters for updating a stored command. `None` fields are left
/// untouched.
#[derive(Debug, Clone, Default)]
pub struct CommandUpdateParams {
    pub label: Option<String>,
    pub command: Option<String>,
    pub category: Option<CommandCategory>,
    pub run_mode: Option<RunMode>,
    pub task_runner_id: Option<String>,
}

/// Parameters for recording an agent attempt.
#[derive(Debug, Clone)]
pub struct AttemptParams {
    pub session_key: Option<String>,
    pub model: Option<String>,
    pub summary: Option<String>,
    pub outcome: AttemptOutcome,
}

// ─────────────────────────────────────────────────────────────────────────────
// Bundles
// ─────────────────────────────────────────────────────────────────────────────

/// Everything a caller needs to work on a project, in one payload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectContext {
    pub project: Project,
    pub links: Vec<ProjectLink>,
    pub commands: Vec<StoredCommand>,
    pub tasks: Vec<WorkflowTask>,
    pub task_dependencies: Vec<TaskDependency>,
    pub recent_memory: Vec<MemoryNote>,
    /// Supervisor records tagged with this project; attached by the
    /// dispatcher when a runner is wired in.
    pub running_processes: Vec<serde_json::Value>,
}

/// A task with its related rows.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDetails {
    pub task: WorkflowTask,
    pub dependencies: Vec<TaskDependency>,
    pub attempts: Vec<TaskAttempt>,
    pub status_history: Vec<StatusHistoryEntry>,
}
