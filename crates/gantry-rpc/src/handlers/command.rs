//! Stored command handlers: add, list, remove, update, lock, unlock, run.

use async_trait::async_trait;
use serde_json::{json, Value};

use gantry_runner::StartRequest;
use gantry_workflow::types::{CommandCategory, CommandCreateParams, CommandUpdateParams, RunMode};
use gantry_workflow::CommandRef;

use crate::context::ActionContext;
use crate::errors::{ActionError, RUNNER_ERROR};
use crate::handlers::{opt_bool, opt_i64, opt_str, parse_enum, require_str, require_str_pair};
use crate::registry::ActionHandler;

/// Resolve the command reference from `commandId` or `(projectId, label)`.
fn command_ref(params: Option<&Value>) -> Result<CommandRef, ActionError> {
    if let Some(id) = opt_i64(params, "commandId") {
        return Ok(CommandRef::Id(id));
    }
    let project_id = opt_str(params, "projectId").filter(|s| !s.trim().is_empty());
    let label = opt_str(params, "label").filter(|s| !s.trim().is_empty());
    match (project_id, label) {
        (Some(project_id), Some(label)) => Ok(CommandRef::Labelled { project_id, label }),
        _ => Err(ActionError::InvalidParams {
            message: "commandId or projectId and label required".into(),
        }),
    }
}

/// Create a stored command.
pub struct CmdAddHandler;

#[async_trait]
impl ActionHandler for CmdAddHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let project_id = require_str(p, "projectId")?;
        let (label, command) = require_str_pair(p, "label", "command")?;
        let category = match opt_str(p, "category") {
            Some(raw) => Some(parse_enum(&raw, CommandCategory::from_sql, "category")?),
            None => None,
        };
        let run_mode = match opt_str(p, "runMode") {
            Some(raw) => Some(parse_enum(&raw, RunMode::from_sql, "runMode")?),
            None => None,
        };
        let cmd = ctx.workflow.cmd_add(&CommandCreateParams {
            project_id,
            label,
            command,
            category,
            run_mode,
            task_runner_id: opt_str(p, "taskRunnerId"),
        })?;
        Ok(serde_json::to_value(cmd).unwrap_or_default())
    }
}

/// List a project's stored commands.
pub struct CmdListHandler;

#[async_trait]
impl ActionHandler for CmdListHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let project_id = require_str(params.as_ref(), "projectId")?;
        let commands = ctx.workflow.cmd_list(&project_id)?;
        Ok(json!({ "commands": commands }))
    }
}

/// Delete a stored command (lock-gated).
pub struct CmdRemoveHandler;

#[async_trait]
impl ActionHandler for CmdRemoveHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let cmd_ref = command_ref(p)?;
        let force = opt_bool(p, "force").unwrap_or(false);
        let reason = opt_str(p, "reason");
        ctx.workflow.cmd_remove(&cmd_ref, force, reason.as_deref())?;
        Ok(json!({ "removed": true }))
    }
}

/// Update a stored command (lock-gated).
pub struct CmdUpdateHandler;

#[async_trait]
impl ActionHandler for CmdUpdateHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let cmd_ref = command_ref(p)?;
        let force = opt_bool(p, "force").unwrap_or(false);
        let reason = opt_str(p, "reason");
        let category = match opt_str(p, "category") {
            Some(raw) => Some(parse_enum(&raw, CommandCategory::from_sql, "category")?),
            None => None,
        };
        let run_mode = match opt_str(p, "runMode") {
            Some(raw) => Some(parse_enum(&raw, RunMode::from_sql, "runMode")?),
            None => None,
        };
        let cmd = ctx.workflow.cmd_update(
            &cmd_ref,
            &CommandUpdateParams {
                label: opt_str(p, "newLabel"),
                command: opt_str(p, "command"),
                category,
                run_mode,
                task_runner_id: opt_str(p, "taskRunnerId"),
            },
            force,
            reason.as_deref(),
        )?;
        Ok(serde_json::to_value(cmd).unwrap_or_default())
    }
}

/// Lock a command against destructive edits.
pub struct CmdLockHandler;

#[async_trait]
impl ActionHandler for CmdLockHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let cmd_ref = command_ref(p)?;
        let locked_by = opt_str(p, "lockedBy");
        let cmd = ctx.workflow.cmd_lock(&cmd_ref, locked_by.as_deref())?;
        Ok(serde_json::to_value(cmd).unwrap_or_default())
    }
}

/// Clear a command's lock.
pub struct CmdUnlockHandler;

#[async_trait]
impl ActionHandler for CmdUnlockHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let cmd_ref = command_ref(params.as_ref())?;
        let cmd = ctx.workflow.cmd_unlock(&cmd_ref)?;
        Ok(serde_json::to_value(cmd).unwrap_or_default())
    }
}

/// Run a stored command: synchronously for `exec` mode, through the
/// process supervisor for `task` mode.
pub struct CmdRunHandler;

#[async_trait]
impl ActionHandler for CmdRunHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let cmd_ref = command_ref(p)?;
        let task_id = opt_i64(p, "taskId");
        let timeout_ms = opt_i64(p, "timeoutMs").and_then(|v| u64::try_from(v).ok());

        let prepared = ctx.workflow.cmd_prepare(&cmd_ref, task_id)?;
        match prepared.command.run_mode {
            RunMode::Exec => {
                let result = ctx.workflow.cmd_exec(&prepared, timeout_ms).await?;
                Ok(serde_json::to_value(result).unwrap_or_default())
            }
            RunMode::Task => {
                let runner = ctx.runner.as_ref().ok_or(ActionError::Domain {
                    code: RUNNER_ERROR,
                    message: "task runner not available".into(),
                })?;
                let runner_id = prepared.rendered_runner_id.clone().unwrap_or_else(|| {
                    format!(
                        "project-{}-{}",
                        prepared.command.project_id, prepared.command.id
                    )
                });
                let record = runner
                    .start(StartRequest {
                        id: Some(runner_id),
                        command: prepared.rendered_command.clone(),
                        tags: Some(vec![
                            "project".to_string(),
                            prepared.command.project_id.clone(),
                            prepared.command.label.clone(),
                        ]),
                        project_id: Some(prepared.command.project_id.clone()),
                        replace: true,
                        ..Default::default()
                    })
                    .await?;
                Ok(json!({ "mode": "task", "task": record }))
            }
        }
    }
}
