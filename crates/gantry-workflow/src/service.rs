//! Business logic for the workflow engine.
//!
//! Every mutating task action follows the same discipline: load the target
//! row, run the race-safe conditional status update from the declarative
//! rule, require exactly one affected row, append a status-history entry,
//! and return the reloaded row. Git side effects (worktrees, merges) run
//! through the injected [`GitBackend`] after the transition commits.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gantry_store::{ConnectionPool, PooledConnection};
use rusqlite::Connection;
use tracing::warn;

use crate::errors::{Result, WorkflowError};
use crate::git::GitBackend;
use crate::repository;
use crate::transitions::{self, TransitionRule};
use crate::types::{
    AttemptParams, CommandCreateParams, CommandUpdateParams, LinkCategory, MemoryCategory,
    MemoryNote, Project, ProjectContext, ProjectCreateParams, ProjectLink, ProjectUpdateParams,
    RunMode, StoredCommand, TaskAttempt, TaskCreateParams, TaskDependency, TaskDetails,
    TaskStatus, TaskUpdateParams, WorkflowTask,
};

/// How many memory notes ride along in a [`ProjectContext`].
const RECENT_MEMORY_LIMIT: u32 = 50;

/// Output cap for synchronous stored-command execution (20 MiB).
const EXEC_OUTPUT_CAP: usize = 20 * 1024 * 1024;

/// Reference to a stored command: numeric id, or `(project, label)`.
#[derive(Debug, Clone)]
pub enum CommandRef {
    Id(i64),
    Labelled { project_id: String, label: String },
}

/// A stored command resolved and token-substituted, ready to run.
#[derive(Debug, Clone)]
pub struct PreparedRun {
    pub command: StoredCommand,
    pub rendered_command: String,
    pub rendered_runner_id: Option<String>,
}

/// Result of running a stored command in `exec` mode.
#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecResult {
    pub mode: &'static str,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

/// The workflow engine.
///
/// Explicitly constructed with its collaborators (storage pool, git
/// backend) so tests can swap in fakes.
pub struct WorkflowService {
    pool: ConnectionPool,
    git: Arc<dyn GitBackend>,
    migrated: std::sync::OnceLock<()>,
}

impl WorkflowService {
    pub fn new(pool: ConnectionPool, git: Arc<dyn GitBackend>) -> Self {
        Self {
            pool,
            git,
            migrated: std::sync::OnceLock::new(),
        }
    }

    /// Checkout with lazy schema creation: the first public operation on a
    /// fresh database runs the (idempotent) migrations.
    fn conn(&self) -> Result<PooledConnection> {
        let conn = self.pool.get()?;
        if self.migrated.get().is_none() {
            gantry_store::run_migrations(&conn)?;
            let _ = self.migrated.set(());
        }
        Ok(conn)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Shared row loading
    // ─────────────────────────────────────────────────────────────────────

    fn ensure_project(conn: &Connection, id: &str) -> Result<Project> {
        repository::get_project(conn, id)?
            .ok_or_else(|| WorkflowError::ProjectNotFound(id.to_string()))
    }

    fn ensure_task(conn: &Connection, id: i64) -> Result<WorkflowTask> {
        repository::get_task(conn, id)?.ok_or(WorkflowError::TaskNotFound(id))
    }

    fn resolve_command(conn: &Connection, command: &CommandRef) -> Result<StoredCommand> {
        match command {
            CommandRef::Id(id) => repository::get_command(conn, *id)?
                .ok_or_else(|| WorkflowError::CommandNotFound(id.to_string())),
            CommandRef::Labelled { project_id, label } => {
                repository::find_command(conn, project_id, label)?.ok_or_else(|| {
                    WorkflowError::CommandNotFound(format!("{project_id}/{label}"))
                })
            }
        }
    }

    /// Run the conditional update for `rule`, append history, reload.
    ///
    /// Also keeps the derived columns honest: `completed_at` exists iff the
    /// task is `done`, and the blocked bookkeeping is wiped on any exit
    /// from `blocked`.
    fn apply_transition(
        conn: &Connection,
        task: &WorkflowTask,
        rule: &TransitionRule,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> Result<WorkflowTask> {
        let changed = repository::transition_task(conn, task.id, rule.to, rule.allowed_from)?;
        if changed != 1 {
            return Err(WorkflowError::Transition {
                task_id: task.id,
                from: task.status,
                to: rule.to,
            });
        }
        if rule.to == TaskStatus::Done {
            repository::set_completed_at(conn, task.id)?;
        } else if task.status == TaskStatus::Done {
            repository::clear_completed_at(conn, task.id)?;
        }
        if task.status == TaskStatus::Blocked && rule.to != TaskStatus::Blocked {
            repository::clear_blocked_bookkeeping(conn, task.id, true)?;
        }
        repository::append_history(conn, task.id, Some(task.status), rule.to, actor, reason)?;
        Self::ensure_task(conn, task.id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────────────────────

    pub fn project_create(&self, params: &ProjectCreateParams) -> Result<Project> {
        if params.id.trim().is_empty() || params.name.trim().is_empty() {
            return Err(WorkflowError::Validation("id and name required".into()));
        }
        if params.id.len() > 64 {
            return Err(WorkflowError::Validation(
                "id must be at most 64 characters".into(),
            ));
        }
        let conn = self.conn()?;
        repository::create_project(&conn, params)
    }

    /// The full working context for a project. `running_processes` is left
    /// empty here; the dispatcher attaches supervisor records when a
    /// runner is wired in.
    pub fn project_get(&self, id: &str) -> Result<ProjectContext> {
        let conn = self.conn()?;
        let project = Self::ensure_project(&conn, id)?;
        Ok(ProjectContext {
            links: repository::list_links(&conn, id)?,
            commands: repository::list_commands(&conn, id)?,
            tasks: repository::list_tasks(&conn, id, None)?,
            task_dependencies: repository::list_project_dependencies(&conn, id)?,
            recent_memory: repository::list_memory(&conn, id, Some(RECENT_MEMORY_LIMIT))?,
            running_processes: Vec::new(),
            project,
        })
    }

    pub fn project_list(&self) -> Result<Vec<Project>> {
        let conn = self.conn()?;
        repository::list_projects(&conn)
    }

    pub fn project_update(&self, id: &str, updates: &ProjectUpdateParams) -> Result<Project> {
        let conn = self.conn()?;
        let current = Self::ensure_project(&conn, id)?;
        if let Some(new_state) = updates.state {
            if new_state != current.state
                && !transitions::project_transition_allowed(current.state, new_state)
            {
                return Err(WorkflowError::ProjectTransition {
                    from: current.state,
                    to: new_state,
                });
            }
        }
        repository::update_project(&conn, id, updates)?
            .ok_or_else(|| WorkflowError::ProjectNotFound(id.to_string()))
    }

    pub fn project_delete(&self, id: &str) -> Result<()> {
        let conn = self.conn()?;
        let _ = Self::ensure_project(&conn, id)?;
        let _ = repository::delete_project(&conn, id)?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Links
    // ─────────────────────────────────────────────────────────────────────

    pub fn link_add(
        &self,
        project_id: &str,
        label: &str,
        url: &str,
        category: Option<LinkCategory>,
    ) -> Result<ProjectLink> {
        if label.trim().is_empty() || url.trim().is_empty() {
            return Err(WorkflowError::Validation("label and url required".into()));
        }
        let conn = self.conn()?;
        let _ = Self::ensure_project(&conn, project_id)?;
        repository::add_link(
            &conn,
            project_id,
            label,
            url,
            category.unwrap_or(LinkCategory::Other),
        )
    }

    pub fn link_remove(&self, project_id: &str, label: &str) -> Result<bool> {
        let conn = self.conn()?;
        repository::remove_link(&conn, project_id, label)
    }

    pub fn link_list(&self, project_id: &str) -> Result<Vec<ProjectLink>> {
        let conn = self.conn()?;
        repository::list_links(&conn, project_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Stored commands
    // ─────────────────────────────────────────────────────────────────────

    pub fn cmd_add(&self, params: &CommandCreateParams) -> Result<StoredCommand> {
        if params.label.trim().is_empty() || params.command.trim().is_empty() {
            return Err(WorkflowError::Validation("label and command required".into()));
        }
        let conn = self.conn()?;
        let _ = Self::ensure_project(&conn, &params.project_id)?;
        repository::create_command(&conn, params)
    }

    pub fn cmd_list(&self, project_id: &str) -> Result<Vec<StoredCommand>> {
        let conn = self.conn()?;
        repository::list_commands(&conn, project_id)
    }

    /// Destructive edits to a locked command need `force` plus a reason.
    fn check_lock(cmd: &StoredCommand, force: bool, reason: Option<&str>) -> Result<()> {
        if !cmd.locked {
            return Ok(());
        }
        if !force {
            return Err(WorkflowError::Locked(cmd.id));
        }
        if reason.map_or(true, |r| r.trim().is_empty()) {
            return Err(WorkflowError::LockReasonRequired);
        }
        Ok(())
    }

    pub fn cmd_update(
        &self,
        command: &CommandRef,
        updates: &CommandUpdateParams,
        force: bool,
        reason: Option<&str>,
    ) -> Result<StoredCommand> {
        let conn = self.conn()?;
        let cmd = Self::resolve_command(&conn, command)?;
        Self::check_lock(&cmd, force, reason)?;
        repository::update_command(&conn, cmd.id, updates)?
            .ok_or_else(|| WorkflowError::CommandNotFound(cmd.id.to_string()))
    }

    pub fn cmd_remove(&self, command: &CommandRef, force: bool, reason: Option<&str>) -> Result<()> {
        let conn = self.conn()?;
        let cmd = Self::resolve_command(&conn, command)?;
        Self::check_lock(&cmd, force, reason)?;
        let _ = repository::delete_command(&conn, cmd.id)?;
        Ok(())
    }

    pub fn cmd_lock(&self, command: &CommandRef, locked_by: Option<&str>) -> Result<StoredCommand> {
        let conn = self.conn()?;
        let cmd = Self::resolve_command(&conn, command)?;
        repository::set_command_lock(&conn, cmd.id, true, locked_by)?
            .ok_or_else(|| WorkflowError::CommandNotFound(cmd.id.to_string()))
    }

    pub fn cmd_unlock(&self, command: &CommandRef) -> Result<StoredCommand> {
        let conn = self.conn()?;
        let cmd = Self::resolve_command(&conn, command)?;
        repository::set_command_lock(&conn, cmd.id, false, None)?
            .ok_or_else(|| WorkflowError::CommandNotFound(cmd.id.to_string()))
    }

    /// Resolve a stored command and substitute `{project_id}`, `{task_id}`,
    /// and `{label}` in both the command template and the runner-id
    /// template.
    pub fn cmd_prepare(&self, command: &CommandRef, task_id: Option<i64>) -> Result<PreparedRun> {
        let conn = self.conn()?;
        let cmd = Self::resolve_command(&conn, command)?;
        let rendered_command = substitute_tokens(&cmd.command, &cmd.project_id, task_id, &cmd.label);
        let rendered_runner_id = cmd
            .task_runner_id
            .as_deref()
            .map(|t| substitute_tokens(t, &cmd.project_id, task_id, &cmd.label));
        Ok(PreparedRun {
            rendered_command,
            rendered_runner_id,
            command: cmd,
        })
    }

    /// Run a prepared `exec`-mode command synchronously through the shell.
    pub async fn cmd_exec(
        &self,
        prepared: &PreparedRun,
        timeout_ms: Option<u64>,
    ) -> Result<ExecResult> {
        if prepared.command.run_mode != RunMode::Exec {
            return Err(WorkflowError::Exec(format!(
                "command {} is not exec-mode",
                prepared.command.id
            )));
        }
        let cwd = {
            let conn = self.conn()?;
            Self::ensure_project(&conn, &prepared.command.project_id)?.workspace_path
        };

        let mut cmd = tokio::process::Command::new("bash");
        let _ = cmd
            .arg("-lc")
            .arg(&prepared.rendered_command)
            .kill_on_drop(true)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }

        let child = cmd
            .spawn()
            .map_err(|e| WorkflowError::Exec(format!("failed to spawn: {e}")))?;

        let output = match timeout_ms {
            Some(ms) => tokio::time::timeout(Duration::from_millis(ms), child.wait_with_output())
                .await
                .map_err(|_| WorkflowError::Exec(format!("timed out after {ms} ms")))?,
            None => child.wait_with_output().await,
        }
        .map_err(|e| WorkflowError::Exec(e.to_string()))?;

        Ok(ExecResult {
            mode: "exec",
            stdout: truncate_lossy(&output.stdout, EXEC_OUTPUT_CAP),
            stderr: truncate_lossy(&output.stderr, EXEC_OUTPUT_CAP),
            exit_code: output.status.code(),
        })
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tasks: CRUD and selection
    // ─────────────────────────────────────────────────────────────────────

    pub fn task_add(&self, params: &TaskCreateParams, actor: Option<&str>) -> Result<WorkflowTask> {
        if params.title.trim().is_empty() {
            return Err(WorkflowError::Validation("title required".into()));
        }
        let conn = self.conn()?;
        let _ = Self::ensure_project(&conn, &params.project_id)?;
        let task = repository::create_task(&conn, params)?;
        repository::append_history(&conn, task.id, None, TaskStatus::Requirements, actor, None)?;
        Ok(task)
    }

    pub fn task_get(&self, id: i64) -> Result<TaskDetails> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        Ok(TaskDetails {
            dependencies: repository::list_dependencies(&conn, id)?,
            attempts: repository::list_attempts(&conn, id)?,
            status_history: repository::list_history(&conn, id)?,
            task,
        })
    }

    pub fn task_list(
        &self,
        project_id: &str,
        status: Option<TaskStatus>,
    ) -> Result<Vec<WorkflowTask>> {
        let conn = self.conn()?;
        repository::list_tasks(&conn, project_id, status)
    }

    pub fn task_update(&self, id: i64, updates: &TaskUpdateParams) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        repository::update_task(&conn, id, updates)?.ok_or(WorkflowError::TaskNotFound(id))
    }

    /// Highest-priority ready task, or `None` when nothing is eligible.
    pub fn task_next(&self, project_id: &str) -> Result<Option<WorkflowTask>> {
        let conn = self.conn()?;
        let _ = Self::ensure_project(&conn, project_id)?;
        repository::next_task(&conn, project_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Tasks: lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Begin implementation. For branching tasks this provisions the git
    /// worktree and branch after the status transition commits; a git
    /// failure therefore leaves the task in `implementing` and the retry
    /// burden on the caller.
    pub async fn task_start(
        &self,
        id: i64,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> Result<WorkflowTask> {
        let (task, workspace) = {
            let conn = self.conn()?;
            let task = Self::ensure_task(&conn, id)?;
            let project = Self::ensure_project(&conn, &task.project_id)?;
            if task.requires_branching && project.workspace_path.is_none() {
                return Err(WorkflowError::Precondition(
                    "Project workspace_path required for branching tasks".into(),
                ));
            }
            let task = Self::apply_transition(&conn, &task, &transitions::START, actor, reason)?;
            (task, project.workspace_path)
        };

        if !task.requires_branching {
            return Ok(task);
        }
        if task.git_branch.is_some() && task.worktree_path.is_some() {
            // Resuming after changes_requested: the worktree is already
            // provisioned.
            return Ok(task);
        }
        let Some(workspace) = workspace else {
            return Err(WorkflowError::Precondition(
                "Project workspace_path required for branching tasks".into(),
            ));
        };

        let workspace = PathBuf::from(workspace);
        let repo = workspace.join("main");
        let worktree = workspace.join("worktrees").join(format!("task-{}", task.id));
        let branch = format!("task/{}", task.id);
        self.git.create_worktree(&repo, &worktree, &branch).await?;

        let conn = self.conn()?;
        repository::set_task_branch(&conn, task.id, &branch, &worktree.to_string_lossy())?;
        Self::ensure_task(&conn, task.id)
    }

    /// Request review; tasks without a human-review gate promote straight
    /// to `approved`.
    pub fn task_request_review(&self, id: i64, actor: Option<&str>) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        if task.requires_human_review {
            Self::apply_transition(&conn, &task, &transitions::REQUEST_REVIEW, actor, None)
        } else {
            Self::apply_transition(
                &conn,
                &task,
                &transitions::AUTO_APPROVE,
                actor,
                Some("auto-approved"),
            )
        }
    }

    pub fn task_approve(
        &self,
        id: i64,
        actor: Option<&str>,
        notes: Option<&str>,
    ) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        let rule = if task.requires_human_review {
            &transitions::APPROVE
        } else {
            &transitions::APPROVE_UNREVIEWED
        };
        let task = Self::apply_transition(&conn, &task, rule, actor, None)?;
        if let Some(notes) = notes {
            return repository::update_task(
                &conn,
                task.id,
                &TaskUpdateParams {
                    review_notes: Some(notes.to_string()),
                    ..Default::default()
                },
            )?
            .ok_or(WorkflowError::TaskNotFound(task.id));
        }
        Ok(task)
    }

    pub fn task_request_changes(
        &self,
        id: i64,
        actor: Option<&str>,
        feedback: Option<&str>,
    ) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        let task =
            Self::apply_transition(&conn, &task, &transitions::REQUEST_CHANGES, actor, feedback)?;
        if let Some(feedback) = feedback {
            return repository::update_task(
                &conn,
                task.id,
                &TaskUpdateParams {
                    review_feedback: Some(feedback.to_string()),
                    ..Default::default()
                },
            )?
            .ok_or(WorkflowError::TaskNotFound(task.id));
        }
        Ok(task)
    }

    /// Which status follows a successful merge for this project.
    fn pick_post_merge_rule(project: &Project) -> &'static TransitionRule {
        if project.has_build_step {
            &transitions::ADVANCE_TO_BUILD
        } else if project.has_deploy_step {
            &transitions::ADVANCE_TO_DEPLOY
        } else {
            &transitions::ADVANCE_TO_DONE
        }
    }

    /// Merge the task's branch. Non-branching tasks skip git entirely and
    /// advance straight into the next configured pipeline step (or finish).
    pub async fn task_merge(&self, id: i64, actor: Option<&str>) -> Result<WorkflowTask> {
        let (task, project) = {
            let conn = self.conn()?;
            let task = Self::ensure_task(&conn, id)?;
            let project = Self::ensure_project(&conn, &task.project_id)?;
            (task, project)
        };

        if !task.requires_branching {
            let conn = self.conn()?;
            if project.has_build_step {
                return Self::apply_transition(
                    &conn,
                    &task,
                    &transitions::SKIP_MERGE_TO_BUILD,
                    actor,
                    None,
                );
            }
            if project.has_deploy_step {
                return Self::apply_transition(
                    &conn,
                    &task,
                    &transitions::SKIP_MERGE_TO_DEPLOY,
                    actor,
                    None,
                );
            }
            return self.task_complete(id, actor, None);
        }

        let workspace = project.workspace_path.clone().ok_or_else(|| {
            WorkflowError::Precondition("workspace_path and git_branch required for merge".into())
        })?;
        let branch = task.git_branch.clone().ok_or_else(|| {
            WorkflowError::Precondition("workspace_path and git_branch required for merge".into())
        })?;

        let task = {
            let conn = self.conn()?;
            Self::apply_transition(&conn, &task, &transitions::BEGIN_MERGE, actor, None)?
        };

        let repo = Path::new(&workspace).join("main");
        let outcome = self.git.merge_branch(&repo, &branch).await?;

        let conn = self.conn()?;
        if outcome.conflict {
            return Self::apply_transition(
                &conn,
                &task,
                &transitions::MARK_CONFLICT,
                actor,
                Some("merge conflict"),
            );
        }
        if !outcome.success {
            return Err(WorkflowError::MergeFailed(outcome.output));
        }
        Self::apply_transition(&conn, &task, Self::pick_post_merge_rule(&project), actor, None)
    }

    /// Mark a conflicted merge as resolved; the caller re-runs `task_merge`
    /// to retry the actual git merge.
    pub fn task_resolve_conflict(&self, id: i64, actor: Option<&str>) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        Self::apply_transition(&conn, &task, &transitions::RESOLVE_CONFLICT, actor, None)
    }

    pub fn task_build(&self, id: i64, actor: Option<&str>) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        let project = Self::ensure_project(&conn, &task.project_id)?;
        if !project.has_build_step {
            return Err(WorkflowError::Precondition(format!(
                "Project {} has no build step",
                project.id
            )));
        }
        let rule = if project.has_deploy_step {
            &transitions::BUILD_TO_DEPLOY
        } else {
            &transitions::BUILD_TO_DONE
        };
        Self::apply_transition(&conn, &task, rule, actor, None)
    }

    pub fn task_deploy(&self, id: i64, actor: Option<&str>) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        Self::apply_transition(&conn, &task, &transitions::DEPLOY, actor, None)
    }

    /// Force-finish a task from any live state.
    pub fn task_complete(
        &self,
        id: i64,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        Self::apply_transition(&conn, &task, &transitions::COMPLETE, actor, reason)
    }

    /// Cancel a task. Worktree removal is best-effort; stale directories
    /// are acceptable.
    pub async fn task_cancel(
        &self,
        id: i64,
        actor: Option<&str>,
        reason: Option<&str>,
    ) -> Result<WorkflowTask> {
        let (task, workspace) = {
            let conn = self.conn()?;
            let task = Self::ensure_task(&conn, id)?;
            let project = Self::ensure_project(&conn, &task.project_id)?;
            let cancelled =
                Self::apply_transition(&conn, &task, &transitions::CANCEL, actor, reason)?;
            (cancelled, project.workspace_path)
        };

        if let (Some(workspace), Some(worktree), Some(branch)) =
            (workspace, task.worktree_path.as_deref(), task.git_branch.as_deref())
        {
            let repo = Path::new(&workspace).join("main");
            if let Err(e) = self
                .git
                .remove_worktree(&repo, Path::new(worktree), branch)
                .await
            {
                warn!(task_id = task.id, error = %e, "worktree removal failed during cancel");
            }
        }
        Ok(task)
    }

    /// Park a task, remembering where it was.
    pub fn task_block(
        &self,
        id: i64,
        reason: Option<&str>,
        actor: Option<&str>,
    ) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        let prior = task.status;
        let _ = Self::apply_transition(&conn, &task, &transitions::BLOCK, actor, reason)?;
        repository::set_blocked_bookkeeping(&conn, id, prior, reason)?;
        Self::ensure_task(&conn, id)
    }

    /// Resume a blocked task at its pre-block status (defaulting to
    /// `requirements` if the record predates the bookkeeping column).
    pub fn task_unblock(&self, id: i64, actor: Option<&str>) -> Result<WorkflowTask> {
        let conn = self.conn()?;
        let task = Self::ensure_task(&conn, id)?;
        let restored = task.status_before_blocked.unwrap_or(TaskStatus::Requirements);
        let rule = TransitionRule {
            to: restored,
            allowed_from: &[TaskStatus::Blocked],
        };
        Self::apply_transition(&conn, &task, &rule, actor, None)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Dependencies
    // ─────────────────────────────────────────────────────────────────────

    pub fn task_dep_add(&self, task_id: i64, depends_on_id: i64) -> Result<Vec<TaskDependency>> {
        let conn = self.conn()?;
        let _ = Self::ensure_task(&conn, task_id)?;
        let _ = Self::ensure_task(&conn, depends_on_id)?;
        if task_id == depends_on_id {
            return Err(WorkflowError::Validation(
                "task cannot depend on itself".into(),
            ));
        }
        if repository::creates_cycle(&conn, task_id, depends_on_id)? {
            return Err(WorkflowError::Validation(format!(
                "dependency cycle detected: {task_id} -> {depends_on_id}"
            )));
        }
        repository::add_dependency(&conn, task_id, depends_on_id)?;
        repository::list_dependencies(&conn, task_id)
    }

    pub fn task_dep_remove(&self, task_id: i64, depends_on_id: i64) -> Result<bool> {
        let conn = self.conn()?;
        repository::remove_dependency(&conn, task_id, depends_on_id)
    }

    pub fn task_dep_list(&self, task_id: i64) -> Result<Vec<TaskDependency>> {
        let conn = self.conn()?;
        let _ = Self::ensure_task(&conn, task_id)?;
        repository::list_dependencies(&conn, task_id)
    }

    // ─────────────────────────────────────────────────────────────────────
    // Attempts and memory
    // ─────────────────────────────────────────────────────────────────────

    /// Session hooks record their runs here; the action surface stays at
    /// the fixed 38 names.
    pub fn record_attempt(&self, task_id: i64, params: &AttemptParams) -> Result<TaskAttempt> {
        let conn = self.conn()?;
        let _ = Self::ensure_task(&conn, task_id)?;
        repository::add_attempt(&conn, task_id, params)
    }

    pub fn memory_add(
        &self,
        project_id: &str,
        category: MemoryCategory,
        content: &str,
    ) -> Result<MemoryNote> {
        if content.trim().is_empty() {
            return Err(WorkflowError::Validation("content required".into()));
        }
        let conn = self.conn()?;
        let _ = Self::ensure_project(&conn, project_id)?;
        repository::add_memory(&conn, project_id, category, content)
    }

    pub fn memory_list(&self, project_id: &str, limit: Option<u32>) -> Result<Vec<MemoryNote>> {
        let conn = self.conn()?;
        repository::list_memory(&conn, project_id, limit)
    }

    pub fn memory_remove(&self, id: i64) -> Result<bool> {
        let conn = self.conn()?;
        repository::remove_memory(&conn, id)
    }
}

/// Substitute `{project_id}`, `{task_id}`, and `{label}` in a template.
fn substitute_tokens(template: &str, project_id: &str, task_id: Option<i64>, label: &str) -> String {
    let mut out = template.replace("{project_id}", project_id);
    out = out.replace("{label}", label);
    if let Some(task_id) = task_id {
        out = out.replace("{task_id}", &task_id.to_string());
    }
    out
}

fn truncate_lossy(bytes: &[u8], cap: usize) -> String {
    let slice = if bytes.len() > cap { &bytes[..cap] } else { bytes };
    String::from_utf8_lossy(slice).into_owned()
}
