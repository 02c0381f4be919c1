//! Task handlers: CRUD, selection, and the full lifecycle surface.

use async_trait::async_trait;
use serde_json::{json, Value};

use gantry_workflow::types::{TaskCreateParams, TaskStatus, TaskType, TaskUpdateParams};

use crate::context::ActionContext;
use crate::errors::ActionError;
use crate::handlers::{
    opt_bool, opt_i64, opt_str, parse_enum, require_i64, require_str, require_str_pair,
};
use crate::registry::ActionHandler;

fn task_to_value(task: gantry_workflow::types::WorkflowTask) -> Value {
    serde_json::to_value(task).unwrap_or_default()
}

/// Create a task; type defaults apply unless overridden.
pub struct TaskAddHandler;

#[async_trait]
impl ActionHandler for TaskAddHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let (project_id, title) = require_str_pair(p, "projectId", "title")?;
        let task_type = match opt_str(p, "taskType") {
            Some(raw) => Some(parse_enum(&raw, TaskType::from_sql, "taskType")?),
            None => None,
        };
        let task = ctx.workflow.task_add(
            &TaskCreateParams {
                project_id,
                title,
                description: opt_str(p, "description"),
                task_type,
                priority: opt_i64(p, "priority"),
                requires_branching: opt_bool(p, "requiresBranching"),
                requires_human_review: opt_bool(p, "requiresHumanReview"),
                phase: opt_str(p, "phase"),
                assigned_model: opt_str(p, "assignedModel"),
            },
            opt_str(p, "actor").as_deref(),
        )?;
        Ok(task_to_value(task))
    }
}

/// A task with dependencies, attempts, and status history.
pub struct TaskGetHandler;

#[async_trait]
impl ActionHandler for TaskGetHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let task_id = require_i64(params.as_ref(), "taskId")?;
        let details = ctx.workflow.task_get(task_id)?;
        Ok(serde_json::to_value(details).unwrap_or_default())
    }
}

/// List a project's tasks, optionally filtered by status.
pub struct TaskListHandler;

#[async_trait]
impl ActionHandler for TaskListHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let project_id = require_str(p, "projectId")?;
        let status = match opt_str(p, "status") {
            Some(raw) => Some(parse_enum(&raw, TaskStatus::from_sql, "status")?),
            None => None,
        };
        let tasks = ctx.workflow.task_list(&project_id, status)?;
        Ok(json!({ "tasks": tasks }))
    }
}

/// Update non-lifecycle task fields.
pub struct TaskUpdateHandler;

#[async_trait]
impl ActionHandler for TaskUpdateHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_update(
            task_id,
            &TaskUpdateParams {
                title: opt_str(p, "title"),
                description: opt_str(p, "description"),
                priority: opt_i64(p, "priority"),
                phase: opt_str(p, "phase"),
                assigned_model: opt_str(p, "assignedModel"),
                dev_server_url: opt_str(p, "devServerUrl"),
                review_notes: opt_str(p, "reviewNotes"),
                review_feedback: opt_str(p, "reviewFeedback"),
            },
        )?;
        Ok(task_to_value(task))
    }
}

/// Highest-priority ready task.
pub struct TaskNextHandler;

#[async_trait]
impl ActionHandler for TaskNextHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let project_id = require_str(params.as_ref(), "projectId")?;
        let task = ctx.workflow.task_next(&project_id)?;
        Ok(json!({ "task": task }))
    }
}

/// Begin implementation (worktree creation for branching tasks).
pub struct TaskStartHandler;

#[async_trait]
impl ActionHandler for TaskStartHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx
            .workflow
            .task_start(task_id, opt_str(p, "actor").as_deref(), opt_str(p, "reason").as_deref())
            .await?;
        Ok(task_to_value(task))
    }
}

/// Request review (auto-approves when no human review is required).
pub struct TaskRequestReviewHandler;

#[async_trait]
impl ActionHandler for TaskRequestReviewHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx
            .workflow
            .task_request_review(task_id, opt_str(p, "actor").as_deref())?;
        Ok(task_to_value(task))
    }
}

/// Approve a task.
pub struct TaskApproveHandler;

#[async_trait]
impl ActionHandler for TaskApproveHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_approve(
            task_id,
            opt_str(p, "actor").as_deref(),
            opt_str(p, "reviewNotes").as_deref(),
        )?;
        Ok(task_to_value(task))
    }
}

/// Send a task back with review feedback.
pub struct TaskRequestChangesHandler;

#[async_trait]
impl ActionHandler for TaskRequestChangesHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_request_changes(
            task_id,
            opt_str(p, "actor").as_deref(),
            opt_str(p, "feedback").as_deref(),
        )?;
        Ok(task_to_value(task))
    }
}

/// Merge the task's branch (or skip ahead for non-branching tasks).
pub struct TaskMergeHandler;

#[async_trait]
impl ActionHandler for TaskMergeHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx
            .workflow
            .task_merge(task_id, opt_str(p, "actor").as_deref())
            .await?;
        Ok(task_to_value(task))
    }
}

/// Mark a conflict as resolved; the caller re-runs `task_merge`.
pub struct TaskResolveConflictHandler;

#[async_trait]
impl ActionHandler for TaskResolveConflictHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx
            .workflow
            .task_resolve_conflict(task_id, opt_str(p, "actor").as_deref())?;
        Ok(task_to_value(task))
    }
}

/// Complete the build step.
pub struct TaskBuildHandler;

#[async_trait]
impl ActionHandler for TaskBuildHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_build(task_id, opt_str(p, "actor").as_deref())?;
        Ok(task_to_value(task))
    }
}

/// Complete the deploy step.
pub struct TaskDeployHandler;

#[async_trait]
impl ActionHandler for TaskDeployHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_deploy(task_id, opt_str(p, "actor").as_deref())?;
        Ok(task_to_value(task))
    }
}

/// Force-finish a task.
pub struct TaskCompleteHandler;

#[async_trait]
impl ActionHandler for TaskCompleteHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_complete(
            task_id,
            opt_str(p, "actor").as_deref(),
            opt_str(p, "reason").as_deref(),
        )?;
        Ok(task_to_value(task))
    }
}

/// Cancel a task (best-effort worktree cleanup).
pub struct TaskCancelHandler;

#[async_trait]
impl ActionHandler for TaskCancelHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx
            .workflow
            .task_cancel(
                task_id,
                opt_str(p, "actor").as_deref(),
                opt_str(p, "reason").as_deref(),
            )
            .await?;
        Ok(task_to_value(task))
    }
}

/// Park a task, remembering its current status.
pub struct TaskBlockHandler;

#[async_trait]
impl ActionHandler for TaskBlockHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_block(
            task_id,
            opt_str(p, "reason").as_deref(),
            opt_str(p, "actor").as_deref(),
        )?;
        Ok(task_to_value(task))
    }
}

/// Resume a blocked task at its pre-block status.
pub struct TaskUnblockHandler;

#[async_trait]
impl ActionHandler for TaskUnblockHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let task_id = require_i64(p, "taskId")?;
        let task = ctx.workflow.task_unblock(task_id, opt_str(p, "actor").as_deref())?;
        Ok(task_to_value(task))
    }
}
