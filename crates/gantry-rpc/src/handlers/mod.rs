//! Action handler modules, registration, and the shared parameter
//! normalization helpers.
//!
//! Callers send free-form string-keyed maps; the helpers here coerce
//! recognized primitives (numbers sent as strings, booleans sent as
//! strings) in one place so every handler sees the same rules.

pub mod command;
pub mod dependency;
pub mod link;
pub mod memory;
pub mod project;
pub mod task;

use serde_json::Value;

use crate::errors::ActionError;
use crate::registry::ActionRegistry;

/// Register all 38 actions with the registry.
pub fn register_all(registry: &mut ActionRegistry) {
    // Projects
    registry.register("project_create", project::ProjectCreateHandler);
    registry.register("project_get", project::ProjectGetHandler);
    registry.register("project_list", project::ProjectListHandler);
    registry.register("project_update", project::ProjectUpdateHandler);
    registry.register("project_delete", project::ProjectDeleteHandler);

    // Links
    registry.register("link_add", link::LinkAddHandler);
    registry.register("link_remove", link::LinkRemoveHandler);
    registry.register("link_list", link::LinkListHandler);

    // Stored commands
    registry.register("cmd_add", command::CmdAddHandler);
    registry.register("cmd_list", command::CmdListHandler);
    registry.register("cmd_remove", command::CmdRemoveHandler);
    registry.register("cmd_update", command::CmdUpdateHandler);
    registry.register("cmd_lock", command::CmdLockHandler);
    registry.register("cmd_unlock", command::CmdUnlockHandler);
    registry.register("cmd_run", command::CmdRunHandler);

    // Tasks
    registry.register("task_add", task::TaskAddHandler);
    registry.register("task_get", task::TaskGetHandler);
    registry.register("task_list", task::TaskListHandler);
    registry.register("task_update", task::TaskUpdateHandler);
    registry.register("task_next", task::TaskNextHandler);
    registry.register("task_start", task::TaskStartHandler);
    registry.register("task_request_review", task::TaskRequestReviewHandler);
    registry.register("task_approve", task::TaskApproveHandler);
    registry.register("task_request_changes", task::TaskRequestChangesHandler);
    registry.register("task_merge", task::TaskMergeHandler);
    registry.register("task_resolve_conflict", task::TaskResolveConflictHandler);
    registry.register("task_build", task::TaskBuildHandler);
    registry.register("task_deploy", task::TaskDeployHandler);
    registry.register("task_complete", task::TaskCompleteHandler);
    registry.register("task_cancel", task::TaskCancelHandler);
    registry.register("task_block", task::TaskBlockHandler);
    registry.register("task_unblock", task::TaskUnblockHandler);

    // Dependencies
    registry.register("task_dep_add", dependency::TaskDepAddHandler);
    registry.register("task_dep_remove", dependency::TaskDepRemoveHandler);
    registry.register("task_dep_list", dependency::TaskDepListHandler);

    // Memory
    registry.register("memory_add", memory::MemoryAddHandler);
    registry.register("memory_list", memory::MemoryListHandler);
    registry.register("memory_remove", memory::MemoryRemoveHandler);
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter extraction (with coercion)
// ─────────────────────────────────────────────────────────────────────────────

/// Optional string; numbers are coerced to their decimal form.
pub(crate) fn opt_str(params: Option<&Value>, key: &str) -> Option<String> {
    let value = params?.get(key)?;
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Required, non-blank string.
pub(crate) fn require_str(params: Option<&Value>, key: &str) -> Result<String, ActionError> {
    match opt_str(params, key) {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(ActionError::required(key)),
    }
}

/// Two required strings that travel together; both missing or either blank
/// yields the combined message.
pub(crate) fn require_str_pair(
    params: Option<&Value>,
    a: &str,
    b: &str,
) -> Result<(String, String), ActionError> {
    let first = opt_str(params, a).filter(|s| !s.trim().is_empty());
    let second = opt_str(params, b).filter(|s| !s.trim().is_empty());
    match (first, second) {
        (Some(first), Some(second)) => Ok((first, second)),
        _ => Err(ActionError::required_pair(a, b)),
    }
}

/// Optional integer; numeric strings are coerced.
pub(crate) fn opt_i64(params: Option<&Value>, key: &str) -> Option<i64> {
    let value = params?.get(key)?;
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Required integer.
pub(crate) fn require_i64(params: Option<&Value>, key: &str) -> Result<i64, ActionError> {
    opt_i64(params, key).ok_or_else(|| ActionError::required(key))
}

/// Optional boolean; `"true"`/`"false"` strings are coerced.
pub(crate) fn opt_bool(params: Option<&Value>, key: &str) -> Option<bool> {
    let value = params?.get(key)?;
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// Parse an enum from its wire string via the type's `from_sql`.
pub(crate) fn parse_enum<T>(
    raw: &str,
    parse: fn(&str) -> Option<T>,
    what: &str,
) -> Result<T, ActionError> {
    parse(raw).ok_or_else(|| ActionError::InvalidParams {
        message: format!("invalid {what}: {raw}"),
    })
}

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::path::Path;
    use std::sync::Arc;

    use async_trait::async_trait;
    use gantry_store::{new_in_memory, run_migrations, ConnectionConfig};
    use gantry_workflow::errors::Result;
    use gantry_workflow::{GitBackend, MergeOutcome, WorkflowService};

    use crate::context::ActionContext;

    /// Git backend that always succeeds; handler tests exercise the
    /// dispatch surface, not git.
    pub struct NoopGit;

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

    /// An `ActionContext` backed by an in-memory store and no runner.
    pub fn make_test_context() -> ActionContext {
        let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
        {
            let conn = pool.get().unwrap();
            run_migrations(&conn).unwrap();
        }
        ActionContext {
            workflow: Arc::new(WorkflowService::new(pool, Arc::new(NoopGit))),
            runner: None,
        }
    }
}
