//! Per-agent git worktrees.
//!
//! Each agent gets branch `agent/<name>` checked out at
//! `<project>/.shieldbox/worktrees/<name>`, sharing the project's object
//! store.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::process::Command;

use shieldbox_core::paths::{agent_branch, ensure_control_dir, worktree_dir};
use shieldbox_core::{BestEffort, Error, Result};

/// Worktree backend used by the orchestrator.
#[async_trait]
pub trait Worktrees: Send + Sync {
    /// Create a fresh branch and worktree for `agent`, clearing leftovers of
    /// a previous run first. Returns the worktree directory.
    async fn create(&self, project_dir: &Path, agent: &str) -> Result<PathBuf>;

    /// Remove the agent's worktree and delete its branch.
    async fn remove(&self, project_dir: &Path, agent: &str) -> Result<()>;

    /// Commit pending changes in the worktree, then merge the agent branch
    /// into the project's current branch with a merge commit.
    ///
    /// Conflicts fail with [`Error::MergeConflict`] carrying git's output;
    /// the merge is left in place for manual resolution.
    async fn merge(&self, project_dir: &Path, agent: &str) -> Result<()>;
}

/// [`Worktrees`] driving the `git` CLI.
#[derive(Debug, Clone, Default)]
pub struct GitWorktrees;

impl GitWorktrees {
    pub fn new() -> Self {
        Self
    }
}

/// Run `git -C <dir> <args>`, returning combined output.
async fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .await
        .map_err(|e| Error::git(args.join(" "), format!("failed to run git: {}", e)))?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    if output.status.success() {
        Ok(text)
    } else {
        Err(Error::git(args.join(" "), text.trim_end()))
    }
}

async fn branch_exists(project_dir: &Path, branch: &str) -> bool {
    let reference = format!("refs/heads/{}", branch);
    git(project_dir, &["rev-parse", "--verify", "--quiet", &reference])
        .await
        .is_ok()
}

#[async_trait]
impl Worktrees for GitWorktrees {
    async fn create(&self, project_dir: &Path, agent: &str) -> Result<PathBuf> {
        ensure_control_dir(project_dir)?;
        let dir = worktree_dir(project_dir, agent);
        let branch = agent_branch(agent);
        let dir_arg = dir.display().to_string();

        let _prune = BestEffort::run("prune worktrees", git(project_dir, &["worktree", "prune"]).await);

        if dir.exists() {
            let _worktree = BestEffort::run(
                "remove leftover worktree",
                git(project_dir, &["worktree", "remove", "--force", &dir_arg]).await,
            );
            if dir.exists() {
                let _dir = BestEffort::run("remove leftover directory", std::fs::remove_dir_all(&dir));
            }
            let _prune = BestEffort::run("prune worktrees", git(project_dir, &["worktree", "prune"]).await);
        }

        if branch_exists(project_dir, &branch).await {
            let _branch = BestEffort::run(
                "delete leftover branch",
                git(project_dir, &["branch", "-D", &branch]).await,
            );
        }

        git(project_dir, &["worktree", "add", "-b", &branch, &dir_arg]).await?;
        tracing::debug!(agent = %agent, branch = %branch, worktree = %dir.display(), "Worktree created");
        Ok(dir)
    }

    async fn remove(&self, project_dir: &Path, agent: &str) -> Result<()> {
        let dir = worktree_dir(project_dir, agent);
        let branch = agent_branch(agent);

        if dir.exists() {
            git(
                project_dir,
                &["worktree", "remove", "--force", &dir.display().to_string()],
            )
            .await?;
        }
        if branch_exists(project_dir, &branch).await {
            git(project_dir, &["branch", "-D", &branch]).await?;
        }
        Ok(())
    }

    async fn merge(&self, project_dir: &Path, agent: &str) -> Result<()> {
        let dir = worktree_dir(project_dir, agent);
        let branch = agent_branch(agent);

        git(&dir, &["add", "-A"]).await?;
        let pending = git(&dir, &["status", "--porcelain"]).await?;
        if !pending.trim().is_empty() {
            let message = format!("shieldbox: agent {} changes", agent);
            git(&dir, &["commit", "-m", &message]).await?;
        }

        let message = format!("Merge agent {}", agent);
        match git(project_dir, &["merge", "--no-ff", "-m", &message, &branch]).await {
            Ok(_) => {
                tracing::info!(agent = %agent, branch = %branch, "Agent branch merged");
                Ok(())
            }
            Err(Error::Git { output, .. }) if output.contains("CONFLICT") => {
                Err(Error::MergeConflict {
                    agent: agent.to_string(),
                    output,
                })
            }
            Err(e) => Err(e),
        }
    }
}
