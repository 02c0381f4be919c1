//! End-to-end lifecycle coverage over an in-memory store and a scripted
//! git backend.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gantry_store::{new_in_memory, run_migrations, ConnectionConfig};
use gantry_workflow::errors::Result;
use gantry_workflow::types::{
    ProjectCreateParams, TaskCreateParams, TaskStatus, TaskType,
};
use gantry_workflow::{GitBackend, MergeOutcome, WorkflowService};

/// Scripted git backend: records calls, conflicts on demand.
struct ScriptedGit {
    calls: Mutex<Vec<String>>,
    conflict_next_merge: AtomicBool,
}

impl ScriptedGit {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            conflict_next_merge: AtomicBool::new(false),
        })
    }

    fn call_log(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl GitBackend for ScriptedGit {
    async fn create_worktree(&self, repo: &Path, worktree_path: &Path, branch: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!(
            "worktree-add {} {} {}",
            repo.display(),
            worktree_path.display(),
            branch
        ));
        Ok(())
    }

    async fn remove_worktree(
        &self,
        _repo: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("worktree-remove {} {}", worktree_path.display(), branch));
        Ok(())
    }

    async fn merge_branch(&self, _repo: &Path, branch: &str) -> Result<MergeOutcome> {
        self.calls.lock().unwrap().push(format!("merge {branch}"));
        if self.conflict_next_merge.swap(false, Ordering::SeqCst) {
            Ok(MergeOutcome {
                success: false,
                conflict: true,
                output: "Automatic merge failed; fix conflicts and then commit the result.".into(),
            })
        } else {
            Ok(MergeOutcome {
                success: true,
                conflict: false,
                output: "Merge made by the 'ort' strategy.".into(),
            })
        }
    }
}

fn service_with_git() -> (WorkflowService, Arc<ScriptedGit>) {
    let pool = new_in_memory(&ConnectionConfig::default()).unwrap();
    {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
    }
    let git = ScriptedGit::new();
    (WorkflowService::new(pool, git.clone()), git)
}

#[test]
fn project_create_applies_defaults() {
    let (service, _) = service_with_git();
    let project = service
        .project_create(&ProjectCreateParams {
            id: "p1".into(),
            name: "P1".into(),
            ..Default::default()
        })
        .unwrap();
    assert!(project.has_build_step);
    assert!(project.has_deploy_step);
    assert_eq!(project.state.as_sql(), "planning");
}

#[test]
fn feature_task_defaults_and_initial_history() {
    let (service, _) = service_with_git();
    service
        .project_create(&ProjectCreateParams {
            id: "p1".into(),
            name: "P1".into(),
            ..Default::default()
        })
        .unwrap();
    let task = service
        .task_add(
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "t1".into(),
                task_type: Some(TaskType::Feature),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    assert_eq!(task.status, TaskStatus::Requirements);
    assert!(task.requires_branching);
    assert!(task.requires_human_review);

    let details = service.task_get(task.id).unwrap();
    assert_eq!(details.status_history.len(), 1);
    assert_eq!(details.status_history[0].from_status, None);
    assert_eq!(details.status_history[0].to_status, TaskStatus::Requirements);
}

/// Linear path with no branching, review, build, or deploy: hotfix goes
/// straight through without touching git.
#[tokio::test]
async fn hotfix_linear_path_never_invokes_git() {
    let (service, git) = service_with_git();
    service
        .project_create(&ProjectCreateParams {
            id: "p1".into(),
            name: "P1".into(),
            has_build_step: Some(false),
            has_deploy_step: Some(false),
            ..Default::default()
        })
        .unwrap();
    let task = service
        .task_add(
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "fix prod".into(),
                task_type: Some(TaskType::Hotfix),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let task = service.task_start(task.id, None, None).await.unwrap();
    assert_eq!(task.status, TaskStatus::Implementing);

    let task = service.task_request_review(task.id, None).unwrap();
    assert_eq!(task.status, TaskStatus::Approved);

    let task = service.task_merge(task.id, None).await.unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert!(task.completed_at.is_some());
    assert!(git.call_log().is_empty());
}

/// Branching path with a conflict: worktree at start, conflict on first
/// merge, resolve, clean merge into the build step.
#[tokio::test]
async fn branching_path_with_conflict() {
    let (service, git) = service_with_git();
    service
        .project_create(&ProjectCreateParams {
            id: "p1".into(),
            name: "P1".into(),
            workspace_path: Some("/srv/work/p1".into()),
            has_build_step: Some(true),
            has_deploy_step: Some(false),
            ..Default::default()
        })
        .unwrap();
    let task = service
        .task_add(
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "new feature".into(),
                task_type: Some(TaskType::Feature),
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let task = service.task_start(task.id, None, None).await.unwrap();
    assert_eq!(task.status, TaskStatus::Implementing);
    let expected_worktree = format!("/srv/work/p1/worktrees/task-{}", task.id);
    assert_eq!(task.worktree_path.as_deref(), Some(expected_worktree.as_str()));
    assert_eq!(task.git_branch.as_deref(), Some(format!("task/{}", task.id).as_str()));
    assert!(git
        .call_log()
        .iter()
        .any(|c| c.starts_with("worktree-add /srv/work/p1/main")));

    let task = service.task_request_review(task.id, None).unwrap();
    let task = service.task_approve(task.id, Some("reviewer"), None).unwrap();
    assert_eq!(task.status, TaskStatus::Approved);

    git.conflict_next_merge.store(true, Ordering::SeqCst);
    let task = service.task_merge(task.id, None).await.unwrap();
    assert_eq!(task.status, TaskStatus::MergeConflict);

    let task = service.task_resolve_conflict(task.id, None).unwrap();
    assert_eq!(task.status, TaskStatus::Merging);

    let task = service.task_merge(task.id, None).await.unwrap();
    assert_eq!(task.status, TaskStatus::Building);

    let task = service.task_build(task.id, None).unwrap();
    assert_eq!(task.status, TaskStatus::Done);
    assert!(task.completed_at.is_some());
}

/// Dependency gating: the lower-priority parent is selected until it is
/// done, then the dependent becomes eligible.
#[tokio::test]
async fn dependency_gating_orders_task_next() {
    let (service, _) = service_with_git();
    service
        .project_create(&ProjectCreateParams {
            id: "p1".into(),
            name: "P1".into(),
            has_build_step: Some(false),
            has_deploy_step: Some(false),
            ..Default::default()
        })
        .unwrap();
    let a = service
        .task_add(
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "a".into(),
                task_type: Some(TaskType::Hotfix),
                priority: Some(10),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let b = service
        .task_add(
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "b".into(),
                task_type: Some(TaskType::Hotfix),
                priority: Some(5),
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let _ = service.task_dep_add(b.id, a.id).unwrap();

    let next = service.task_next("p1").unwrap().unwrap();
    assert_eq!(next.id, a.id);

    let _ = service.task_start(a.id, None, None).await.unwrap();
    let next = service.task_next("p1").unwrap().unwrap();
    assert_eq!(next.id, a.id, "implementing parent is still the pick");

    let _ = service.task_complete(a.id, None, None).unwrap();
    let next = service.task_next("p1").unwrap().unwrap();
    assert_eq!(next.id, b.id, "dependency satisfied once parent is done");
}

/// Every transition leaves exactly one matching history row.
#[tokio::test]
async fn history_is_complete_across_a_full_run() {
    let (service, _) = service_with_git();
    service
        .project_create(&ProjectCreateParams {
            id: "p1".into(),
            name: "P1".into(),
            workspace_path: Some("/srv/work/p1".into()),
            has_build_step: Some(false),
            has_deploy_step: Some(true),
            ..Default::default()
        })
        .unwrap();
    let task = service
        .task_add(
            &TaskCreateParams {
                project_id: "p1".into(),
                title: "tracked".into(),
                task_type: Some(TaskType::Bugfix),
                ..Default::default()
            },
            Some("agent"),
        )
        .unwrap();

    let _ = service.task_start(task.id, Some("agent"), None).await.unwrap();
    let _ = service.task_request_review(task.id, Some("agent")).unwrap();
    let _ = service.task_merge(task.id, Some("agent")).await.unwrap();
    let _ = service.task_deploy(task.id, Some("agent")).unwrap();

    let details = service.task_get(task.id).unwrap();
    let transitions: Vec<(Option<TaskStatus>, TaskStatus)> = details
        .status_history
        .iter()
        .map(|h| (h.from_status, h.to_status))
        .collect();
    assert_eq!(
        transitions,
        vec![
            (None, TaskStatus::Requirements),
            (Some(TaskStatus::Requirements), TaskStatus::Implementing),
            (Some(TaskStatus::Implementing), TaskStatus::Approved),
            (Some(TaskStatus::Approved), TaskStatus::Merging),
            (Some(TaskStatus::Merging), TaskStatus::Deploying),
            (Some(TaskStatus::Deploying), TaskStatus::Done),
        ]
    );
    assert!(details.task.completed_at.is_some());
}

/// Block/unblock round-trips through several source statuses.
#[tokio::test]
async fn block_round_trip_from_various_statuses() {
    let (service, _) = service_with_git();
    service
        .project_create(&ProjectCreateParams {
            id: "p1".into(),
            name: "P1".into(),
            has_build_step: Some(false),
            has_deploy_step: Some(false),
            ..Default::default()
        })
        .unwrap();

    for (title, advance) in [("r", false), ("i", true)] {
        let task = service
            .task_add(
                &TaskCreateParams {
                    project_id: "p1".into(),
                    title: title.into(),
                    task_type: Some(TaskType::Hotfix),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let before = if advance {
            service.task_start(task.id, None, None).await.unwrap().status
        } else {
            task.status
        };

        let blocked = service.task_block(task.id, Some("stuck"), None).unwrap();
        assert_eq!(blocked.status, TaskStatus::Blocked);
        assert_eq!(blocked.status_before_blocked, Some(before));

        let restored = service.task_unblock(task.id, None).unwrap();
        assert_eq!(restored.status, before);
        assert_eq!(restored.status_before_blocked, None);
    }
}
