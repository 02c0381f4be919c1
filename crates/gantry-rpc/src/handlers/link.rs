//! Project link handlers: add, remove, list.

use async_trait::async_trait;
use serde_json::{json, Value};

use gantry_workflow::types::LinkCategory;

use crate::context::ActionContext;
use crate::errors::ActionError;
use crate::handlers::{opt_str, parse_enum, require_str, require_str_pair};
use crate::registry::ActionHandler;

/// Add a labelled URL to a project.
pub struct LinkAddHandler;

#[async_trait]
impl ActionHandler for LinkAddHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let project_id = require_str(p, "projectId")?;
        let (label, url) = require_str_pair(p, "label", "url")?;
        let category = match opt_str(p, "category") {
            Some(raw) => Some(parse_enum(&raw, LinkCategory::from_sql, "category")?),
            None => None,
        };
        let link = ctx.workflow.link_add(&project_id, &label, &url, category)?;
        Ok(serde_json::to_value(link).unwrap_or_default())
    }
}

/// Remove a link by label.
pub struct LinkRemoveHandler;

#[async_trait]
impl ActionHandler for LinkRemoveHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let project_id = require_str(p, "projectId")?;
        let label = require_str(p, "label")?;
        let removed = ctx.workflow.link_remove(&project_id, &label)?;
        Ok(json!({ "removed": removed }))
    }
}

/// List a project's links.
pub struct LinkListHandler;

#[async_trait]
impl ActionHandler for LinkListHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let project_id = require_str(params.as_ref(), "projectId")?;
        let links = ctx.workflow.link_list(&project_id)?;
        Ok(json!({ "links": links }))
    }
}
