//! Task dependency handlers: add, remove, list.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::context::ActionContext;
use crate::errors::ActionError;
use crate::handlers::{opt_i64, require_i64};
use crate::registry::ActionHandler;

fn require_edge(params: Option<&Value>) -> Result<(i64, i64), ActionError> {
    match (opt_i64(params, "taskId"), opt_i64(params, "dependsOnId")) {
        (Some(task_id), Some(depends_on_id)) => Ok((task_id, depends_on_id)),
        _ => Err(ActionError::required_pair("taskId", "dependsOnId")),
    }
}

/// Add a `task depends on parent` edge (cycles rejected).
pub struct TaskDepAddHandler;

#[async_trait]
impl ActionHandler for TaskDepAddHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let (task_id, depends_on_id) = require_edge(params.as_ref())?;
        let dependencies = ctx.workflow.task_dep_add(task_id, depends_on_id)?;
        Ok(json!({ "dependencies": dependencies }))
    }
}

/// Remove a dependency edge.
pub struct TaskDepRemoveHandler;

#[async_trait]
impl ActionHandler for TaskDepRemoveHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let (task_id, depends_on_id) = require_edge(params.as_ref())?;
        let removed = ctx.workflow.task_dep_remove(task_id, depends_on_id)?;
        Ok(json!({ "removed": removed }))
    }
}

/// List what a task depends on.
pub struct TaskDepListHandler;

#[async_trait]
impl ActionHandler for TaskDepListHandler {
    async fn handle(&self, params: Option<Value>, ctx: &ActionContext) -> Result<Value, ActionError> {
        let task_id = require_i64(params.as_ref(), "taskId")?;
        let dependencies = ctx.workflow.task_dep_list(task_id)?;
        Ok(json!({ "dependencies": dependencies }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::project::ProjectCreateHandler;
    use crate::handlers::task::TaskAddHandler;
    use crate::handlers::test_helpers::make_test_context;

    async fn seed(ctx: &ActionContext) -> (i64, i64) {
        let _ = ProjectCreateHandler
            .handle(Some(json!({"id": "p1", "name": "P1"})), ctx)
            .await
            .unwrap();
        let a = TaskAddHandler
            .handle(Some(json!({"projectId": "p1", "title": "a"})), ctx)
            .await
            .unwrap()["id"]
            .as_i64()
            .unwrap();
        let b = TaskAddHandler
            .handle(Some(json!({"projectId": "p1", "title": "b"})), ctx)
            .await
            .unwrap()["id"]
            .as_i64()
            .unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn add_list_remove_round_trip() {
        let ctx = make_test_context();
        let (a, b) = seed(&ctx).await;

        let added = TaskDepAddHandler
            .handle(Some(json!({"taskId": b, "dependsOnId": a})), &ctx)
            .await
            .unwrap();
        assert_eq!(added["dependencies"].as_array().unwrap().len(), 1);

        let listed = TaskDepListHandler
            .handle(Some(json!({"taskId": b})), &ctx)
            .await
            .unwrap();
        assert_eq!(listed["dependencies"][0]["dependsOnId"].as_i64(), Some(a));

        let removed = TaskDepRemoveHandler
            .handle(Some(json!({"taskId": b, "dependsOnId": a})), &ctx)
            .await
            .unwrap();
        assert_eq!(removed["removed"], true);
    }

    #[tokio::test]
    async fn self_edge_and_cycles_are_rejected() {
        let ctx = make_test_context();
        let (a, b) = seed(&ctx).await;

        let err = TaskDepAddHandler
            .handle(Some(json!({"taskId": a, "dependsOnId": a})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_PARAMS");

        let _ = TaskDepAddHandler
            .handle(Some(json!({"taskId": b, "dependsOnId": a})), &ctx)
            .await
            .unwrap();
        let err = TaskDepAddHandler
            .handle(Some(json!({"taskId": a, "dependsOnId": b})), &ctx)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn missing_edge_fields_use_pair_message() {
        let ctx = make_test_context();
        let err = TaskDepAddHandler
            .handle(Some(json!({"taskId": 1})), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "taskId and dependsOnId required");
    }
}
