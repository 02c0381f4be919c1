//! Project handlers: create, get, list, update, delete.

use async_trait::async_trait;
use serde_json::{json, Value};

use gantry_workflow::types::{ProjectCreateParams, ProjectState, ProjectUpdateParams};

use crate::context::ActionContext;
use crate::errors::ActionError;
use crate::handlers::{opt_bool, opt_i64, opt_str, parse_enum, require_str, require_str_pair};
use crate::registry::ActionHandler;

/// Create a project.
pub struct ProjectCreateHandler;

#[async_trait]
impl ActionHandler for ProjectCreateHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let (id, name) = require_str_pair(p, "id", "name")?;
        let project = ctx.workflow.project_create(&ProjectCreateParams {
            id,
            name,
            description: opt_str(p, "description"),
            workspace_path: opt_str(p, "workspacePath"),
            remote_url: opt_str(p, "remoteUrl"),
            telegram_topic_id: opt_i64(p, "telegramTopicId"),
            has_build_step: opt_bool(p, "hasBuildStep"),
            has_deploy_step: opt_bool(p, "hasDeployStep"),
        })?;
        Ok(serde_json::to_value(project).unwrap_or_default())
    }
}

/// Full project context bundle, including supervisor records tagged with
/// this project.
pub struct ProjectGetHandler;

#[async_trait]
impl ActionHandler for ProjectGetHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let project_id = require_str(params.as_ref(), "projectId")?;
        let mut context = ctx.workflow.project_get(&project_id)?;
        if let Some(runner) = &ctx.runner {
            context.running_processes = runner
                .list()
                .await
                .into_iter()
                .filter(|rec| rec.project_id.as_deref() == Some(project_id.as_str()))
                .filter_map(|rec| serde_json::to_value(rec).ok())
                .collect();
        }
        Ok(serde_json::to_value(context).unwrap_or_default())
    }
}

/// List all projects.
pub struct ProjectListHandler;

#[async_trait]
impl ActionHandler for ProjectListHandler {
    async fn handle(&self, _params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let projects = ctx.workflow.project_list()?;
        Ok(json!({ "projects": projects }))
    }
}

/// Update project attributes; state changes go through the project state
/// machine.
pub struct ProjectUpdateHandler;

#[async_trait]
impl ActionHandler for ProjectUpdateHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let project_id = require_str(p, "projectId")?;
        let state = match opt_str(p, "state") {
            Some(raw) => Some(parse_enum(&raw, ProjectState::from_sql, "state")?),
            None => None,
        };
        let project = ctx.workflow.project_update(
            &project_id,
            &ProjectUpdateParams {
                name: opt_str(p, "name"),
                description: opt_str(p, "description"),
                workspace_path: opt_str(p, "workspacePath"),
                remote_url: opt_str(p, "remoteUrl"),
                telegram_topic_id: opt_i64(p, "telegramTopicId"),
                has_build_step: opt_bool(p, "hasBuildStep"),
                has_deploy_step: opt_bool(p, "hasDeployStep"),
                state,
            },
        )?;
        Ok(serde_json::to_value(project).unwrap_or_default())
    }
}

/// Delete a project and everything it owns.
pub struct ProjectDeleteHandler;

#[async_trait]
impl ActionHandler for ProjectDeleteHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let project_id = require_str(params.as_ref(), "projectId")?;
        ctx.workflow.project_delete(&project_id)?;
        Ok(json!({ "deleted": true }))
    }
}
