//! Project memory handlers: add, list, remove.

use async_trait::async_trait;
use serde_json::{json, Value};

use gantry_workflow::types::MemoryCategory;

use crate::context::ActionContext;
use crate::errors::ActionError;
use crate::handlers::{opt_i64, parse_enum, require_i64, require_str};
use crate::registry::ActionHandler;

/// Record a typed note against a project.
pub struct MemoryAddHandler;

#[async_trait]
impl ActionHandler for MemoryAddHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let project_id = require_str(p, "projectId")?;
        let content = require_str(p, "content")?;
        let raw_category = require_str(p, "category")?;
        let category = parse_enum(&raw_category, MemoryCategory::from_sql, "category")?;
        let note = ctx.workflow.memory_add(&project_id, category, &content)?;
        Ok(serde_json::to_value(note).unwrap_or_default())
    }
}

/// List a project's notes, newest first.
pub struct MemoryListHandler;

#[async_trait]
impl ActionHandler for MemoryListHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let p = params.as_ref();
        let project_id = require_str(p, "projectId")?;
        let limit = opt_i64(p, "limit").and_then(|v| u32::try_from(v).ok());
        let memory = ctx.workflow.memory_list(&project_id, limit)?;
        Ok(json!({ "memory": memory }))
    }
}

/// Delete a note by id.
pub struct MemoryRemoveHandler;

#[async_trait]
impl ActionHandler for MemoryRemoveHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let memory_id = require_i64(params.as_ref(), "memoryId")?;
        let removed = ctx.workflow.memory_remove(memory_id)?;
        Ok(json!({ "removed": removed }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::project::ProjectCreateHandler;
    use crate::handlers::test_helpers::make_test_context;

    #[tokio::test]
    async fn add_list_remove_round_trip() {
        let ctx = make_test_context();
        let _ = ProjectCreateHandler
            .handle(Some(json!({"id": "p1", "name": "P1"})), &ctx)
            .await
            .unwrap();

        let note = MemoryAddHandler
            .handle(
                Some(json!({
                    "projectId": "p1",
                    "category": "gotcha",
                    "content": "migrations must run before first query"
                })),
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(note["category"], "gotcha");
        let id = note["id"].as_i64().unwrap();

        let listed = MemoryListHandler
            .handle(Some(json!({"projectId": "p1"})), &ctx)
            .await
            .unwrap();
        assert_eq!(listed["memory"].as_array().unwrap().len(), 1);

        let removed = MemoryRemoveHandler
            .handle(Some(json!({"memoryId": id})), &ctx)
            .await
            .unwrap();
        assert_eq!(removed["removed"], true);
    }

    #[tokio::test]
    async fn unknown_category_is_invalid() {
        let ctx = make_test_context();
        let _ = ProjectCreateHandler
            .handle(Some(json!({"id": "p1", "name": "P1"})), &ctx)
            .await
            .unwrap();
        let err = MemoryAddHandler
            .handle(
                Some(json!({"projectId": "p1", "category": "vibe", "content": "x"})),
                &ctx,
            )
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid category: vibe");
    }
}
