//! Git side effects for branching tasks: worktree creation and removal,
//! branch merging with conflict classification.
//!
//! The [`GitBackend`] trait is the seam for tests; [`SystemGit`] shells out
//! to the real `git` CLI. All invocations force `LC_ALL=C` so conflict
//! classification by output text stays deterministic across locales.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::errors::{Result, WorkflowError};

/// Outcome of a `git merge` invocation.
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub success: bool,
    pub conflict: bool,
    pub output: String,
}

/// Git operations needed by the workflow engine.
#[async_trait]
pub trait GitBackend: Send + Sync {
    /// Create (or reset) `branch` at HEAD and check it out into a new
    /// worktree at `worktree_path`.
    async fn create_worktree(&self, repo: &Path, worktree_path: &Path, branch: &str)
        -> Result<()>;

    /// Remove a worktree and delete its branch. Secondary failures (branch
    /// deletion, pruning) are swallowed; the primary removal failure
    /// propagates.
    async fn remove_worktree(&self, repo: &Path, worktree_path: &Path, branch: &str)
        -> Result<()>;

    /// Merge `branch` into the currently checked-out branch of `repo` with
    /// `--no-ff`, classifying conflicts.
    async fn merge_branch(&self, repo: &Path, branch: &str) -> Result<MergeOutcome>;
}

/// Real git CLI backend.
pub struct SystemGit;

impl SystemGit {
    async fn run(&self, repo: &Path, args: &[&str]) -> Result<std::process::Output> {
        debug!(repo = %repo.display(), ?args, "running git");
        Command::new("git")
            .arg("-C")
            .arg(repo)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| WorkflowError::Git(format!("failed to spawn git: {e}")))
    }
}

fn combined_output(output: &std::process::Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.is_empty() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&stderr);
    }
    text
}

/// Conflict classification: git in the C locale reports conflicts with
/// "CONFLICT" markers or "Automatic merge failed".
fn looks_like_conflict(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("conflict") || lower.contains("automatic merge failed")
}

#[async_trait]
impl GitBackend for SystemGit {
    async fn create_worktree(
        &self,
        repo: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<()> {
        let path = worktree_path.to_string_lossy();
        let output = self
            .run(repo, &["worktree", "add", "-B", branch, path.as_ref()])
            .await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(WorkflowError::Git(combined_output(&output)))
        }
    }

    async fn remove_worktree(
        &self,
        repo: &Path,
        worktree_path: &Path,
        branch: &str,
    ) -> Result<()> {
        let path = worktree_path.to_string_lossy();
        let output = self
            .run(repo, &["worktree", "remove", "--force", path.as_ref()])
            .await?;
        if !output.status.success() {
            return Err(WorkflowError::Git(combined_output(&output)));
        }
        if let Ok(out) = self.run(repo, &["branch", "-D", branch]).await {
            if !out.status.success() {
                warn!(branch, "branch deletion failed: {}", combined_output(&out));
            }
        }
        if let Ok(out) = self.run(repo, &["worktree", "prune"]).await {
            if !out.status.success() {
                warn!("worktree prune failed: {}", combined_output(&out));
            }
        }
        Ok(())
    }

    async fn merge_branch(&self, repo: &Path, branch: &str) -> Result<MergeOutcome> {
        let output = self.run(repo, &["merge", "--no-ff", branch]).await?;
        let text = combined_output(&output);
        if output.status.success() {
            return Ok(MergeOutcome {
                success: true,
                conflict: false,
                output: text,
            });
        }
        if looks_like_conflict(&text) {
            // Leave the repo clean for a later retry.
            if let Ok(out) = self.run(repo, &["merge", "--abort"]).await {
                if !out.status.success() {
                    warn!("merge abort failed: {}", combined_output(&out));
                }
            }
            return Ok(MergeOutcome {
                success: false,
                conflict: true,
                output: text,
            });
        }
        Ok(MergeOutcome {
            success: false,
            conflict: false,
            output: text,
        })
    }
}
