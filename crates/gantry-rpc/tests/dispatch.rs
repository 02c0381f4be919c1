//! Dispatch-level behavior: envelope shapes, unknown actions, and a full
//! lifecycle driven purely through the action surface.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use gantry_rpc::{register_all, ActionContext, ActionRegistry, ActionRequest};
use gantry_store::{new_in_memory, run_migrations, ConnectionConfig};
use gantry_workflow::errors::Result;
use gantry_workflow::{GitBackend, MergeOutcome, WorkflowService};
use serde_json::{json, Value};

struct NoopGit;

#[async_trait]
impl GitBackend for NoopGit {
    async fn create_worktree(&self, _: &Path, _: &Path, _: &str) -> Result<()> {
        Ok(())
    }

    async fn remove_worktree(&self, _: &Path, _: &Path, _: &str) -> Result<()> {
        Ok(())
    }

    async fn merge_branch(&self, _: &Path, _: &str) -> Result<MergeOutcome> {
        Ok(MergeOutcome {
            success: true,
            conflict: false,
            output: String::new(),
        })
    }
}

fn setup() -> (ActionRegistry, ActionContext) {
    let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    let ctx = ActionContext {
        workflow: Arc::new(WorkflowService::new(pool, Arc::new(NoopGit))),
        runner: None,
    };
    let mut registry = ActionRegistry::new();
    register_all(&mut registry);
    (registry, ctx)
}

fn request(action: &str, params: Value) -> ActionRequest {
    ActionRequest {
        id: Some("req".into()),
        action: action.to_string(),
        params: Some(params),
    }
}

#[tokio::test]
async fn unknown_action_fails_with_stable_message() {
    let (registry, ctx) = setup();
    let resp = registry
        .dispatch(request("task_teleport", json!({})), &ctx)
        .await;
    assert!(!resp.success);
    let error = resp.error.unwrap();
    assert_eq!(error.code, "UNKNOWN_ACTION");
    assert_eq!(error.message, "Unknown action: task_teleport");
}

#[tokio::test]
async fn missing_required_field_message_is_stable() {
    let (registry, ctx) = setup();
    let resp = registry.dispatch(request("project_get", json!({})), &ctx).await;
    let error = resp.error.unwrap();
    assert_eq!(error.code, "INVALID_PARAMS");
    assert_eq!(error.message, "projectId required");
}

#[tokio::test]
async fn full_lifecycle_through_the_action_surface() {
    let (registry, ctx) = setup();

    let resp = registry
        .dispatch(
            request(
                "project_create",
                json!({
                    "id": "p1",
                    "name": "P1",
                    "workspacePath": "/tmp/ws",
                    "hasBuildStep": false,
                    "hasDeployStep": false
                }),
            ),
            &ctx,
        )
        .await;
    assert!(resp.success, "{:?}", resp.error);

    let resp = registry
        .dispatch(
            request(
                "task_add",
                json!({"projectId": "p1", "title": "hotfix", "taskType": "hotfix"}),
            ),
            &ctx,
        )
        .await;
    let task_id = resp.result.unwrap()["id"].as_i64().unwrap();

    for action in ["task_start", "task_request_review", "task_merge"] {
        let resp = registry
            .dispatch(request(action, json!({"taskId": task_id})), &ctx)
            .await;
        assert!(resp.success, "{action}: {:?}", resp.error);
    }

    let resp = registry
        .dispatch(request("task_get", json!({"taskId": task_id})), &ctx)
        .await;
    let details = resp.result.unwrap();
    assert_eq!(details["task"]["status"], "done");
    assert!(details["task"]["completedAt"].is_string());

    // History carries the auto-approval.
    let reasons: Vec<&str> = details["statusHistory"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|h| h["reason"].as_str())
        .collect();
    assert!(reasons.contains(&"auto-approved"));

    // A done task cannot be re-completed, but can be cancelled.
    let resp = registry
        .dispatch(request("task_complete", json!({"taskId": task_id})), &ctx)
        .await;
    assert!(!resp.success);
    let resp = registry
        .dispatch(request("task_cancel", json!({"taskId": task_id})), &ctx)
        .await;
    assert!(resp.success);
    assert!(resp.result.unwrap()["completedAt"].is_null());
}

#[tokio::test]
async fn responses_echo_the_request_id() {
    let (registry, ctx) = setup();
    let resp = registry
        .dispatch(
            ActionRequest {
                id: Some("corr-42".into()),
                action: "project_list".into(),
                params: None,
            },
            &ctx,
        )
        .await;
    assert_eq!(resp.id.as_deref(), Some("corr-42"));
    assert!(resp.success);
}
