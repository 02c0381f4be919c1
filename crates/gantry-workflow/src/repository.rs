//! SQL data access layer for projects, tasks, and their satellite tables.
//!
//! All functions take a `&Connection` and are stateless — pure translation
//! between Rust types and SQL. Transition safety lives here too: the
//! conditional `UPDATE … WHERE status IN (…)` builder is the only way task
//! status is ever written.

use std::collections::{HashSet, VecDeque};

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::errors::{Result, WorkflowError};
use crate::types::{
    AttemptOutcome, AttemptParams, CommandCategory, CommandCreateParams, CommandUpdateParams,
    LinkCategory, MemoryCategory, MemoryNote, Project, ProjectCreateParams, ProjectLink,
    ProjectState, ProjectUpdateParams, RunMode, StatusHistoryEntry, StoredCommand, TaskAttempt,
    TaskCreateParams, TaskDependency, TaskStatus, TaskType, TaskUpdateParams, WorkflowTask,
};

/// Current UTC timestamp as ISO 8601.
pub(crate) fn now_iso() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

// ─────────────────────────────────────────────────────────────────────────────
// Row mappers
// ─────────────────────────────────────────────────────────────────────────────

fn project_from_row(row: &Row<'_>) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get("id")?,
        name: row.get("name")?,
        description: row.get("description")?,
        workspace_path: row.get("workspace_path")?,
        remote_url: row.get("remote_url")?,
        telegram_topic_id: row.get("telegram_topic_id")?,
        has_build_step: row.get("has_build_step")?,
        has_deploy_step: row.get("has_deploy_step")?,
        state: ProjectState::from_sql(&row.get::<_, String>("state")?)
            .unwrap_or(ProjectState::Planning),
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<WorkflowTask> {
    Ok(WorkflowTask {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        title: row.get("title")?,
        description: row.get("description")?,
        task_type: TaskType::from_sql(&row.get::<_, String>("task_type")?)
            .unwrap_or(TaskType::Feature),
        status: TaskStatus::from_sql(&row.get::<_, String>("status")?)
            .unwrap_or(TaskStatus::Requirements),
        status_before_blocked: row
            .get::<_, Option<String>>("status_before_blocked")?
            .as_deref()
            .and_then(TaskStatus::from_sql),
        requires_branching: row.get("requires_branching")?,
        requires_human_review: row.get("requires_human_review")?,
        priority: row.get("priority")?,
        phase: row.get("phase")?,
        assigned_model: row.get("assigned_model")?,
        git_branch: row.get("git_branch")?,
        worktree_path: row.get("worktree_path")?,
        dev_server_url: row.get("dev_server_url")?,
        review_notes: row.get("review_notes")?,
        review_feedback: row.get("review_feedback")?,
        block_reason: row.get("block_reason")?,
        completed_at: row.get("completed_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn link_from_row(row: &Row<'_>) -> rusqlite::Result<ProjectLink> {
    Ok(ProjectLink {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        label: row.get("label")?,
        url: row.get("url")?,
        category: LinkCategory::from_sql(&row.get::<_, String>("category")?)
            .unwrap_or(LinkCategory::Other),
        created_at: row.get("created_at")?,
    })
}

fn command_from_row(row: &Row<'_>) -> rusqlite::Result<StoredCommand> {
    Ok(StoredCommand {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        label: row.get("label")?,
        command: row.get("command")?,
        category: CommandCategory::from_sql(&row.get::<_, String>("category")?)
            .unwrap_or(CommandCategory::Other),
        run_mode: RunMode::from_sql(&row.get::<_, String>("run_mode")?).unwrap_or(RunMode::Exec),
        task_runner_id: row.get("task_runner_id")?,
        locked: row.get("locked")?,
        locked_by: row.get("locked_by")?,
        locked_at: row.get("locked_at")?,
        created_at: row.get("created_at")?,
        updated_at: row.get("updated_at")?,
    })
}

fn memory_from_row(row: &Row<'_>) -> rusqlite::Result<MemoryNote> {
    Ok(MemoryNote {
        id: row.get("id")?,
        project_id: row.get("project_id")?,
        category: MemoryCategory::from_sql(&row.get::<_, String>("category")?)
            .unwrap_or(MemoryCategory::Learning),
        content: row.get("content")?,
        created_at: row.get("created_at")?,
    })
}

fn history_from_row(row: &Row<'_>) -> rusqlite::Result<StatusHistoryEntry> {
    Ok(StatusHistoryEntry {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        from_status: row
            .get::<_, Option<String>>("from_status")?
            .as_deref()
            .and_then(TaskStatus::from_sql),
        to_status: TaskStatus::from_sql(&row.get::<_, String>("to_status")?)
            .unwrap_or(TaskStatus::Requirements),
        actor: row.get("actor")?,
        reason: row.get("reason")?,
        created_at: row.get("created_at")?,
    })
}

fn attempt_from_row(row: &Row<'_>) -> rusqlite::Result<TaskAttempt> {
    Ok(TaskAttempt {
        id: row.get("id")?,
        task_id: row.get("task_id")?,
        session_key: row.get("session_key")?,
        model: row.get("model")?,
        summary: row.get("summary")?,
        outcome: AttemptOutcome::from_sql(&row.get::<_, String>("outcome")?)
            .unwrap_or(AttemptOutcome::Failed),
        created_at: row.get("created_at")?,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Projects
// ─────────────────────────────────────────────────────────────────────────────

pub fn create_project(conn: &Connection, params: &ProjectCreateParams) -> Result<Project> {
    let now = now_iso();
    conn.execute(
        "INSERT INTO projects (id, name, description, workspace_path, remote_url,
         telegram_topic_id, has_build_step, has_deploy_step, state, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, 'planning', ?9, ?9)",
        params![
            params.id,
            params.name,
            params.description,
            params.workspace_path,
            params.remote_url,
            params.telegram_topic_id,
            params.has_build_step.unwrap_or(true),
            params.has_deploy_step.unwrap_or(true),
            now,
        ],
    )?;
    get_project(conn, &params.id)?
        .ok_or_else(|| WorkflowError::ProjectNotFound(params.id.clone()))
}

pub fn get_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    let project = conn
        .query_row("SELECT * FROM projects WHERE id = ?1", params![id], |row| {
            project_from_row(row)
        })
        .optional()?;
    Ok(project)
}

pub fn list_projects(conn: &Connection) -> Result<Vec<Project>> {
    let mut stmt = conn.prepare("SELECT * FROM projects ORDER BY created_at, id")?;
    let projects = stmt
        .query_map([], |row| project_from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(projects)
}

/// Update a project. Returns the updated row, or `None` if not found.
pub fn update_project(
    conn: &Connection,
    id: &str,
    updates: &ProjectUpdateParams,
) -> Result<Option<Project>> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref name) = updates.name {
        sets.push("name = ?".to_string());
        values.push(Box::new(name.clone()));
    }
    if let Some(ref desc) = updates.description {
        sets.push("description = ?".to_string());
        values.push(Box::new(desc.clone()));
    }
    if let Some(ref ws) = updates.workspace_path {
        sets.push("workspace_path = ?".to_string());
        values.push(Box::new(ws.clone()));
    }
    if let Some(ref url) = updates.remote_url {
        sets.push("remote_url = ?".to_string());
        values.push(Box::new(url.clone()));
    }
    if let Some(topic) = updates.telegram_topic_id {
        sets.push("telegram_topic_id = ?".to_string());
        values.push(Box::new(topic));
    }
    if let Some(build) = updates.has_build_step {
        sets.push("has_build_step = ?".to_string());
        values.push(Box::new(build));
    }
    if let Some(deploy) = updates.has_deploy_step {
        sets.push("has_deploy_step = ?".to_string());
        values.push(Box::new(deploy));
    }
    if let Some(state) = updates.state {
        sets.push("state = ?".to_string());
        values.push(Box::new(state.as_sql().to_string()));
    }

    if sets.is_empty() {
        return get_project(conn, id);
    }

    sets.push("updated_at = ?".to_string());
    values.push(Box::new(now_iso()));
    values.push(Box::new(id.to_string()));

    let sql = format!("UPDATE projects SET {} WHERE id = ?", sets.join(", "));
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(AsRef::as_ref).collect();
    let changed = conn.execute(&sql, params_refs.as_slice())?;
    if changed == 0 {
        return Ok(None);
    }
    get_project(conn, id)
}

/// Delete a project. Owned rows go with it via `ON DELETE CASCADE`.
pub fn delete_project(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM projects WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Links
// ─────────────────────────────────────────────────────────────────────────────

pub fn add_link(
    conn: &Connection,
    project_id: &str,
    label: &str,
    url: &str,
    category: LinkCategory,
) -> Result<ProjectLink> {
    conn.execute(
        "INSERT INTO project_links (project_id, label, url, category, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![project_id, label, url, category.as_sql(), now_iso()],
    )?;
    let id = conn.last_insert_rowid();
    let link = conn.query_row(
        "SELECT * FROM project_links WHERE id = ?1",
        params![id],
        |row| link_from_row(row),
    )?;
    Ok(link)
}

pub fn remove_link(conn: &Connection, project_id: &str, label: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM project_links WHERE project_id = ?1 AND label = ?2",
        params![project_id, label],
    )?;
    Ok(changed > 0)
}

pub fn list_links(conn: &Connection, project_id: &str) -> Result<Vec<ProjectLink>> {
    let mut stmt =
        conn.prepare("SELECT * FROM project_links WHERE project_id = ?1 ORDER BY label")?;
    let links = stmt
        .query_map(params![project_id], |row| link_from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(links)
}

// ─────────────────────────────────────────────────────────────────────────────
// Stored commands
// ─────────────────────────────────────────────────────────────────────────────

pub fn create_command(conn: &Connection, params: &CommandCreateParams) -> Result<StoredCommand> {
    let now = now_iso();
    conn.execute(
        "INSERT INTO project_commands (project_id, label, command, category, run_mode,
         task_runner_id, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)",
        params![
            params.project_id,
            params.label,
            params.command,
            params.category.unwrap_or(CommandCategory::Other).as_sql(),
            params.run_mode.unwrap_or(RunMode::Exec).as_sql(),
            params.task_runner_id,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_command(conn, id)?.ok_or_else(|| WorkflowError::CommandNotFound(id.to_string()))
}

pub fn get_command(conn: &Connection, id: i64) -> Result<Option<StoredCommand>> {
    let command = conn
        .query_row(
            "SELECT * FROM project_commands WHERE id = ?1",
            params![id],
            |row| command_from_row(row),
        )
        .optional()?;
    Ok(command)
}

pub fn find_command(
    conn: &Connection,
    project_id: &str,
    label: &str,
) -> Result<Option<StoredCommand>> {
    let command = conn
        .query_row(
            "SELECT * FROM project_commands WHERE project_id = ?1 AND label = ?2",
            params![project_id, label],
            |row| command_from_row(row),
        )
        .optional()?;
    Ok(command)
}

pub fn list_commands(conn: &Connection, project_id: &str) -> Result<Vec<StoredCommand>> {
    let mut stmt =
        conn.prepare("SELECT * FROM project_commands WHERE project_id = ?1 ORDER BY label")?;
    let commands = stmt
        .query_map(params![project_id], |row| command_from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(commands)
}

/// Update a stored command. Returns the updated row, or `None` if not found.
pub fn update_command(
    conn: &Connection,
    id: i64,
    updates: &CommandUpdateParams,
) -> Result<Option<StoredCommand>> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref label) = updates.label {
        sets.push("label = ?".to_string());
        values.push(Box::new(label.clone()));
    }
    if let Some(ref command) = updates.command {
        sets.push("command = ?".to_string());
        values.push(Box::new(command.clone()));
    }
    if let Some(category) = updates.category {
        sets.push("category = ?".to_string());
        values.push(Box::new(category.as_sql().to_string()));
    }
    if let Some(run_mode) = updates.run_mode {
        sets.push("run_mode = ?".to_string());
        values.push(Box::new(run_mode.as_sql().to_string()));
    }
    if let Some(ref runner_id) = updates.task_runner_id {
        sets.push("task_runner_id = ?".to_string());
        values.push(Box::new(runner_id.clone()));
    }

    if sets.is_empty() {
        return get_command(conn, id);
    }

    sets.push("updated_at = ?".to_string());
    values.push(Box::new(now_iso()));
    values.push(Box::new(id));

    let sql = format!("UPDATE project_commands SET {} WHERE id = ?", sets.join(", "));
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(AsRef::as_ref).collect();
    let changed = conn.execute(&sql, params_refs.as_slice())?;
    if changed == 0 {
        return Ok(None);
    }
    get_command(conn, id)
}

pub fn delete_command(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM project_commands WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

pub fn set_command_lock(
    conn: &Connection,
    id: i64,
    locked: bool,
    locked_by: Option<&str>,
) -> Result<Option<StoredCommand>> {
    let locked_at = if locked { Some(now_iso()) } else { None };
    let changed = conn.execute(
        "UPDATE project_commands SET locked = ?1, locked_by = ?2, locked_at = ?3, updated_at = ?4
         WHERE id = ?5",
        params![locked, locked_by, locked_at, now_iso(), id],
    )?;
    if changed == 0 {
        return Ok(None);
    }
    get_command(conn, id)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tasks
// ─────────────────────────────────────────────────────────────────────────────

pub fn create_task(conn: &Connection, params: &TaskCreateParams) -> Result<WorkflowTask> {
    let task_type = params.task_type.unwrap_or(TaskType::Feature);
    let (branching_default, review_default) = task_type.default_flags();
    let now = now_iso();
    conn.execute(
        "INSERT INTO project_tasks (project_id, title, description, task_type, status,
         requires_branching, requires_human_review, priority, phase, assigned_model,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, 'requirements', ?5, ?6, ?7, ?8, ?9, ?10, ?10)",
        params![
            params.project_id,
            params.title,
            params.description,
            task_type.as_sql(),
            params.requires_branching.unwrap_or(branching_default),
            params.requires_human_review.unwrap_or(review_default),
            params.priority.unwrap_or(0),
            params.phase,
            params.assigned_model,
            now,
        ],
    )?;
    let id = conn.last_insert_rowid();
    get_task(conn, id)?.ok_or(WorkflowError::TaskNotFound(id))
}

pub fn get_task(conn: &Connection, id: i64) -> Result<Option<WorkflowTask>> {
    let task = conn
        .query_row("SELECT * FROM project_tasks WHERE id = ?1", params![id], |row| {
            task_from_row(row)
        })
        .optional()?;
    Ok(task)
}

pub fn list_tasks(
    conn: &Connection,
    project_id: &str,
    status: Option<TaskStatus>,
) -> Result<Vec<WorkflowTask>> {
    let tasks = if let Some(status) = status {
        let mut stmt = conn.prepare(
            "SELECT * FROM project_tasks WHERE project_id = ?1 AND status = ?2
             ORDER BY priority DESC, created_at, id",
        )?;
        let rows = stmt
            .query_map(params![project_id, status.as_sql()], |row| task_from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    } else {
        let mut stmt = conn.prepare(
            "SELECT * FROM project_tasks WHERE project_id = ?1
             ORDER BY priority DESC, created_at, id",
        )?;
        let rows = stmt
            .query_map(params![project_id], |row| task_from_row(row))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    Ok(tasks)
}

/// Update non-lifecycle task fields. Returns the updated row, or `None` if
/// not found.
pub fn update_task(
    conn: &Connection,
    id: i64,
    updates: &TaskUpdateParams,
) -> Result<Option<WorkflowTask>> {
    let mut sets: Vec<String> = Vec::new();
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

    if let Some(ref title) = updates.title {
        sets.push("title = ?".to_string());
        values.push(Box::new(title.clone()));
    }
    if let Some(ref desc) = updates.description {
        sets.push("description = ?".to_string());
        values.push(Box::new(desc.clone()));
    }
    if let Some(priority) = updates.priority {
        sets.push("priority = ?".to_string());
        values.push(Box::new(priority));
    }
    if let Some(ref phase) = updates.phase {
        sets.push("phase = ?".to_string());
        values.push(Box::new(phase.clone()));
    }
    if let Some(ref model) = updates.assigned_model {
        sets.push("assigned_model = ?".to_string());
        values.push(Box::new(model.clone()));
    }
    if let Some(ref url) = updates.dev_server_url {
        sets.push("dev_server_url = ?".to_string());
        values.push(Box::new(url.clone()));
    }
    if let Some(ref notes) = updates.review_notes {
        sets.push("review_notes = ?".to_string());
        values.push(Box::new(notes.clone()));
    }
    if let Some(ref feedback) = updates.review_feedback {
        sets.push("review_feedback = ?".to_string());
        values.push(Box::new(feedback.clone()));
    }

    if sets.is_empty() {
        return get_task(conn, id);
    }

    sets.push("updated_at = ?".to_string());
    values.push(Box::new(now_iso()));
    values.push(Box::new(id));

    let sql = format!("UPDATE project_tasks SET {} WHERE id = ?", sets.join(", "));
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(AsRef::as_ref).collect();
    let changed = conn.execute(&sql, params_refs.as_slice())?;
    if changed == 0 {
        return Ok(None);
    }
    get_task(conn, id)
}

/// Race-safe status transition: `UPDATE … WHERE id = ? AND status IN (…)`.
///
/// Returns the number of affected rows; `0` means the task is gone or its
/// live status fell outside `allowed_from` (caller raises the transition
/// error).
pub fn transition_task(
    conn: &Connection,
    id: i64,
    to: TaskStatus,
    allowed_from: &[TaskStatus],
) -> Result<usize> {
    let mut values: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();
    values.push(Box::new(to.as_sql().to_string()));
    values.push(Box::new(now_iso()));
    values.push(Box::new(id));
    let mut placeholders: Vec<&'static str> = Vec::new();
    for status in allowed_from {
        placeholders.push("?");
        values.push(Box::new(status.as_sql().to_string()));
    }
    let sql = format!(
        "UPDATE project_tasks SET status = ?, updated_at = ? WHERE id = ? AND status IN ({})",
        placeholders.join(", ")
    );
    let params_refs: Vec<&dyn rusqlite::types::ToSql> = values.iter().map(AsRef::as_ref).collect();
    let changed = conn.execute(&sql, params_refs.as_slice())?;
    Ok(changed)
}

pub fn set_task_branch(
    conn: &Connection,
    id: i64,
    git_branch: &str,
    worktree_path: &str,
) -> Result<()> {
    conn.execute(
        "UPDATE project_tasks SET git_branch = ?1, worktree_path = ?2, updated_at = ?3
         WHERE id = ?4",
        params![git_branch, worktree_path, now_iso(), id],
    )?;
    Ok(())
}

pub fn set_completed_at(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE project_tasks SET completed_at = ?1 WHERE id = ?2",
        params![now_iso(), id],
    )?;
    Ok(())
}

pub fn clear_completed_at(conn: &Connection, id: i64) -> Result<()> {
    conn.execute(
        "UPDATE project_tasks SET completed_at = NULL WHERE id = ?1",
        params![id],
    )?;
    Ok(())
}

/// Record what was interrupted when a task was blocked.
pub fn set_blocked_bookkeeping(
    conn: &Connection,
    id: i64,
    prior: TaskStatus,
    reason: Option<&str>,
) -> Result<()> {
    conn.execute(
        "UPDATE project_tasks SET status_before_blocked = ?1, block_reason = ?2
         WHERE id = ?3 AND status = 'blocked'",
        params![prior.as_sql(), reason, id],
    )?;
    Ok(())
}

/// Invariant: `status_before_blocked` is non-NULL only while blocked.
pub fn clear_blocked_bookkeeping(conn: &Connection, id: i64, clear_reason: bool) -> Result<()> {
    if clear_reason {
        conn.execute(
            "UPDATE project_tasks SET status_before_blocked = NULL, block_reason = NULL
             WHERE id = ?1",
            params![id],
        )?;
    } else {
        conn.execute(
            "UPDATE project_tasks SET status_before_blocked = NULL WHERE id = ?1",
            params![id],
        )?;
    }
    Ok(())
}

/// Highest-priority ready task: eligible status, every dependency done.
/// Ordering: priority DESC, created_at ASC, id ASC.
pub fn next_task(conn: &Connection, project_id: &str) -> Result<Option<WorkflowTask>> {
    let eligible = crate::transitions::NEXT_ELIGIBLE
        .iter()
        .map(|s| format!("'{}'", s.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT t.* FROM project_tasks t
         WHERE t.project_id = ?1
           AND t.status IN ({eligible})
           AND NOT EXISTS (
               SELECT 1 FROM project_task_dependencies d
               JOIN project_tasks p ON p.id = d.depends_on_id
               WHERE d.task_id = t.id AND p.status <> 'done'
           )
         ORDER BY t.priority DESC, t.created_at ASC, t.id ASC
         LIMIT 1"
    );
    let task = conn
        .query_row(&sql, params![project_id], |row| task_from_row(row))
        .optional()?;
    Ok(task)
}

// ─────────────────────────────────────────────────────────────────────────────
// Dependencies
// ─────────────────────────────────────────────────────────────────────────────

pub fn add_dependency(conn: &Connection, task_id: i64, depends_on_id: i64) -> Result<()> {
    conn.execute(
        "INSERT OR IGNORE INTO project_task_dependencies (task_id, depends_on_id, created_at)
         VALUES (?1, ?2, ?3)",
        params![task_id, depends_on_id, now_iso()],
    )?;
    Ok(())
}

pub fn remove_dependency(conn: &Connection, task_id: i64, depends_on_id: i64) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM project_task_dependencies WHERE task_id = ?1 AND depends_on_id = ?2",
        params![task_id, depends_on_id],
    )?;
    Ok(changed > 0)
}

/// Edges where `task_id` is the dependent side.
pub fn list_dependencies(conn: &Connection, task_id: i64) -> Result<Vec<TaskDependency>> {
    let mut stmt = conn.prepare(
        "SELECT task_id, depends_on_id, created_at FROM project_task_dependencies
         WHERE task_id = ?1 ORDER BY depends_on_id",
    )?;
    let deps = stmt
        .query_map(params![task_id], |row| {
            Ok(TaskDependency {
                task_id: row.get(0)?,
                depends_on_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(deps)
}

/// All dependency edges between tasks of one project.
pub fn list_project_dependencies(
    conn: &Connection,
    project_id: &str,
) -> Result<Vec<TaskDependency>> {
    let mut stmt = conn.prepare(
        "SELECT d.task_id, d.depends_on_id, d.created_at
         FROM project_task_dependencies d
         JOIN project_tasks t ON t.id = d.task_id
         WHERE t.project_id = ?1
         ORDER BY d.task_id, d.depends_on_id",
    )?;
    let deps = stmt
        .query_map(params![project_id], |row| {
            Ok(TaskDependency {
                task_id: row.get(0)?,
                depends_on_id: row.get(1)?,
                created_at: row.get(2)?,
            })
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(deps)
}

/// Whether adding `task_id → depends_on_id` would close a cycle.
///
/// BFS from `depends_on_id` following `depends_on` edges; reaching
/// `task_id` means the new edge would complete a loop.
pub fn creates_cycle(conn: &Connection, task_id: i64, depends_on_id: i64) -> Result<bool> {
    let mut visited: HashSet<i64> = HashSet::new();
    let mut queue = VecDeque::new();
    queue.push_back(depends_on_id);

    while let Some(current) = queue.pop_front() {
        if current == task_id {
            return Ok(true);
        }
        if !visited.insert(current) {
            continue;
        }
        let mut stmt = conn.prepare(
            "SELECT depends_on_id FROM project_task_dependencies WHERE task_id = ?1",
        )?;
        let parents: Vec<i64> = stmt
            .query_map(params![current], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        queue.extend(parents);
    }
    Ok(false)
}

// ─────────────────────────────────────────────────────────────────────────────
// Status history
// ─────────────────────────────────────────────────────────────────────────────

pub fn append_history(
    conn: &Connection,
    task_id: i64,
    from: Option<TaskStatus>,
    to: TaskStatus,
    actor: Option<&str>,
    reason: Option<&str>,
) -> Result<()> {
    conn.execute(
        "INSERT INTO task_status_history (task_id, from_status, to_status, actor, reason, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            task_id,
            from.map(TaskStatus::as_sql),
            to.as_sql(),
            actor,
            reason,
            now_iso(),
        ],
    )?;
    Ok(())
}

pub fn list_history(conn: &Connection, task_id: i64) -> Result<Vec<StatusHistoryEntry>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM task_status_history WHERE task_id = ?1 ORDER BY id",
    )?;
    let rows = stmt
        .query_map(params![task_id], |row| history_from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────────────────────────
// Attempts
// ─────────────────────────────────────────────────────────────────────────────

pub fn add_attempt(conn: &Connection, task_id: i64, params: &AttemptParams) -> Result<TaskAttempt> {
    conn.execute(
        "INSERT INTO task_attempts (task_id, session_key, model, summary, outcome, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            task_id,
            params.session_key,
            params.model,
            params.summary,
            params.outcome.as_sql(),
            now_iso(),
        ],
    )?;
    let id = conn.last_insert_rowid();
    let attempt = conn.query_row(
        "SELECT * FROM task_attempts WHERE id = ?1",
        rusqlite::params![id],
        |row| attempt_from_row(row),
    )?;
    Ok(attempt)
}

pub fn list_attempts(conn: &Connection, task_id: i64) -> Result<Vec<TaskAttempt>> {
    let mut stmt =
        conn.prepare("SELECT * FROM task_attempts WHERE task_id = ?1 ORDER BY id")?;
    let rows = stmt
        .query_map(params![task_id], |row| attempt_from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory
// ─────────────────────────────────────────────────────────────────────────────

pub fn add_memory(
    conn: &Connection,
    project_id: &str,
    category: MemoryCategory,
    content: &str,
) -> Result<MemoryNote> {
    conn.execute(
        "INSERT INTO project_memory (project_id, category, content, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![project_id, category.as_sql(), content, now_iso()],
    )?;
    let id = conn.last_insert_rowid();
    let note = conn.query_row(
        "SELECT * FROM project_memory WHERE id = ?1",
        params![id],
        |row| memory_from_row(row),
    )?;
    Ok(note)
}

/// Most recent notes first; `limit = None` returns everything.
pub fn list_memory(
    conn: &Connection,
    project_id: &str,
    limit: Option<u32>,
) -> Result<Vec<MemoryNote>> {
    let sql = match limit {
        Some(n) => format!(
            "SELECT * FROM project_memory WHERE project_id = ?1
             ORDER BY id DESC LIMIT {n}"
        ),
        None => "SELECT * FROM project_memory WHERE project_id = ?1 ORDER BY id DESC".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![project_id], |row| memory_from_row(row))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(rows)
}

pub fn remove_memory(conn: &Connection, id: i64) -> Result<bool> {
    let changed = conn.execute("DELETE FROM project_memory WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_store::run_migrations;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    fn seed_project(conn: &Connection) -> Project {
        create_project(
            conn,
            &ProjectCreateParams {
                id: "p1".into(),
                name: "P1".into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn seed_task(conn: &Connection, title: &str) -> WorkflowTask {
        create_task(
            conn,
            &TaskCreateParams {
                project_id: "p1".into(),
                title: title.into(),
                ..Default::default()
            },
        )
        .unwrap()
    }

    #[test]
    fn create_project_applies_defaults() {
        let conn = setup_db();
        let project = seed_project(&conn);
        assert!(project.has_build_step);
        assert!(project.has_deploy_step);
        assert_eq!(project.state, ProjectState::Planning);
    }

    #[test]
    fn transition_honors_allowed_from_set() {
        let conn = setup_db();
        seed_project(&conn);
        let task = seed_task(&conn, "t1");

        let changed = transition_task(
            &conn,
            task.id,
            TaskStatus::Implementing,
            &[TaskStatus::Requirements, TaskStatus::ChangesRequested],
        )
        .unwrap();
        assert_eq!(changed, 1);

        // Second attempt from the same rule no longer matches.
        let changed = transition_task(
            &conn,
            task.id,
            TaskStatus::Implementing,
            &[TaskStatus::Requirements, TaskStatus::ChangesRequested],
        )
        .unwrap();
        assert_eq!(changed, 0);
    }

    #[test]
    fn next_task_orders_by_priority_then_age() {
        let conn = setup_db();
        seed_project(&conn);
        let low = create_task(
            &conn,
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "low".into(),
                priority: Some(1),
                ..Default::default()
            },
        )
        .unwrap();
        let high = create_task(
            &conn,
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "high".into(),
                priority: Some(10),
                ..Default::default()
            },
        )
        .unwrap();

        let next = next_task(&conn, "p1").unwrap().unwrap();
        assert_eq!(next.id, high.id);

        // Equal priorities fall back to insertion order.
        let changed =
            transition_task(&conn, high.id, TaskStatus::Cancelled, &[TaskStatus::Requirements])
                .unwrap();
        assert_eq!(changed, 1);
        let next = next_task(&conn, "p1").unwrap().unwrap();
        assert_eq!(next.id, low.id);
    }

    #[test]
    fn next_task_skips_tasks_with_unfinished_dependencies() {
        let conn = setup_db();
        seed_project(&conn);
        let a = seed_task(&conn, "a");
        let b = create_task(
            &conn,
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "b".into(),
                priority: Some(100),
                ..Default::default()
            },
        )
        .unwrap();
        add_dependency(&conn, b.id, a.id).unwrap();

        // B outranks A but is gated on it.
        let next = next_task(&conn, "p1").unwrap().unwrap();
        assert_eq!(next.id, a.id);

        conn.execute(
            "UPDATE project_tasks SET status = 'done' WHERE id = ?1",
            params![a.id],
        )
        .unwrap();
        let next = next_task(&conn, "p1").unwrap().unwrap();
        assert_eq!(next.id, b.id);
    }

    #[test]
    fn cycle_detection_walks_transitive_edges() {
        let conn = setup_db();
        seed_project(&conn);
        let a = seed_task(&conn, "a");
        let b = seed_task(&conn, "b");
        let c = seed_task(&conn, "c");
        add_dependency(&conn, a.id, b.id).unwrap();
        add_dependency(&conn, b.id, c.id).unwrap();

        assert!(creates_cycle(&conn, c.id, a.id).unwrap());
        assert!(creates_cycle(&conn, c.id, b.id).unwrap());
        assert!(creates_cycle(&conn, a.id, a.id).unwrap());
        assert!(!creates_cycle(&conn, a.id, c.id).unwrap());
    }

    #[test]
    fn memory_listing_is_recent_first() {
        let conn = setup_db();
        seed_project(&conn);
        add_memory(&conn, "p1", MemoryCategory::Learning, "first").unwrap();
        add_memory(&conn, "p1", MemoryCategory::Gotcha, "second").unwrap();
        let notes = list_memory(&conn, "p1", Some(1)).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].content, "second");
    }

    #[test]
    fn command_lock_round_trip() {
        let conn = setup_db();
        seed_project(&conn);
        let cmd = create_command(
            &conn,
            &CommandCreateParams {
                project_id: "p1".into(),
                label: "dev".into(),
                command: "npm run dev".into(),
                ..Default::default()
            },
        )
        .unwrap();
        assert!(!cmd.locked);

        let locked = set_command_lock(&conn, cmd.id, true, Some("ops")).unwrap().unwrap();
        assert!(locked.locked);
        assert_eq!(locked.locked_by.as_deref(), Some("ops"));
        assert!(locked.locked_at.is_some());

        let unlocked = set_command_lock(&conn, cmd.id, false, None).unwrap().unwrap();
        assert!(!unlocked.locked);
        assert!(unlocked.locked_by.is_none());
        assert!(unlocked.locked_at.is_none());
    }
}
