//! Multi-agent coordination.
//!
//! Every agent gets its own sandbox session rooted at a dedicated git
//! worktree of the project. Spawning and stopping hold the write lock for
//! their whole duration, so git and container operations for one
//! orchestrator never interleave.

use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

use shieldbox_core::paths;
use shieldbox_core::{AuditEntry, AuditEventType, BestEffort, Error, Result, SandboxConfig, Session};
use shieldbox_governance::{track_session_event, SecretMap};
use shieldbox_sandbox::SandboxEngine;

use crate::worktree::{GitWorktrees, Worktrees};

/// Outcome of [`Orchestrator::stop_agent`].
#[derive(Debug, Clone, Serialize)]
pub struct AgentStopReport {
    pub agent: String,
    /// Whether the agent's branch was merged into the project.
    pub merged: bool,
    /// Cleanup steps run after the session stopped.
    pub cleanup: Vec<BestEffort>,
}

pub struct Orchestrator {
    engine: Arc<SandboxEngine>,
    worktrees: Arc<dyn Worktrees>,
    agents: RwLock<HashMap<String, Session>>,
}

impl Orchestrator {
    pub fn new(engine: Arc<SandboxEngine>) -> Self {
        Self::with_worktrees(engine, Arc::new(GitWorktrees::new()))
    }

    pub fn with_worktrees(engine: Arc<SandboxEngine>, worktrees: Arc<dyn Worktrees>) -> Self {
        Self {
            engine,
            worktrees,
            agents: RwLock::new(HashMap::new()),
        }
    }

    pub fn engine(&self) -> &Arc<SandboxEngine> {
        &self.engine
    }

    /// Start agent `name` in a fresh worktree of `project_dir`.
    ///
    /// Fails with [`Error::AlreadyExists`] while an agent of that name is
    /// live, whether tracked here or found running in the daemon. Leftovers
    /// of an earlier failed spawn are cleared first. If the sandbox cannot be
    /// created the worktree is torn down again.
    pub async fn spawn_agent(
        &self,
        project_dir: &Path,
        name: &str,
        config: &SandboxConfig,
        secrets: &SecretMap,
    ) -> Result<Session> {
        paths::validate_agent_name(name)?;
        let mut agents = self.agents.write().await;

        if agents.contains_key(name) {
            return Err(Error::already_exists("agent", name));
        }
        let project_dir = paths::absolute(project_dir)?;

        let live = self
            .engine
            .list_sessions()
            .await?
            .into_iter()
            .any(|s| s.agent_name == name && s.project_dir == project_dir && !s.state.is_terminal());
        if live {
            return Err(Error::already_exists("agent", name));
        }

        let worktree = self.worktrees.create(&project_dir, name).await?;

        let session = match self
            .engine
            .create_worktree_session(&project_dir, &worktree, config, name, secrets)
            .await
        {
            Ok(session) => session,
            Err(e) => {
                let _teardown = BestEffort::run(
                    "remove worktree after failed spawn",
                    self.worktrees.remove(&project_dir, name).await,
                );
                return Err(e);
            }
        };

        tracing::info!(
            agent = %name,
            session_id = %session.id,
            worktree = %worktree.display(),
            "Agent spawned"
        );
        track_session_event("agent_spawned");
        self.engine
            .audit(AuditEntry::event(&session.id, name, AuditEventType::AgentSpawned))
            .await;

        agents.insert(name.to_string(), session.clone());
        Ok(session)
    }

    /// Stop agent `name`, optionally merging its branch first.
    ///
    /// Agents missing from the map (after a restart) are found through the
    /// engine's session listing. On a merge failure the stopped session stays
    /// tracked and the worktree is kept so the merge can be retried.
    pub async fn stop_agent(&self, name: &str, merge: bool) -> Result<AgentStopReport> {
        let mut agents = self.agents.write().await;

        let (mut session, tracked) = match agents.get(name) {
            Some(session) => (session.clone(), true),
            None => (self.reconcile(name).await?, false),
        };

        // A tracked terminal session already had its container removed.
        if !(tracked && session.state.is_terminal()) {
            self.engine.stop_session(&mut session).await?;
        }

        let mut merged = false;
        if merge && session.worktree_dir.is_some() {
            if let Err(e) = self.worktrees.merge(&session.project_dir, name).await {
                tracing::warn!(agent = %name, error = %e, "Merge failed; worktree kept");
                agents.insert(name.to_string(), session);
                return Err(e);
            }
            merged = true;
        }

        let mut cleanup = Vec::new();
        if session.worktree_dir.is_some() {
            cleanup.push(BestEffort::run(
                "remove worktree",
                self.worktrees.remove(&session.project_dir, name).await,
            ));
        }
        agents.remove(name);

        tracing::info!(agent = %name, session_id = %session.id, merged, "Agent stopped");
        self.engine
            .audit(
                AuditEntry::event(&session.id, name, AuditEventType::AgentStopped)
                    .with_reason(if merged { "merged" } else { "discarded" }),
            )
            .await;

        Ok(AgentStopReport {
            agent: name.to_string(),
            merged,
            cleanup,
        })
    }

    /// Most recent orchestrated session of `name` known to the daemon,
    /// preferring live ones.
    async fn reconcile(&self, name: &str) -> Result<Session> {
        let found = self
            .engine
            .list_sessions()
            .await?
            .into_iter()
            .filter(|s| s.agent_name == name && s.worktree_dir.is_some())
            .max_by_key(|s| (!s.state.is_terminal(), s.created_at));

        match found {
            Some(session) => {
                tracing::debug!(
                    agent = %name,
                    session_id = %session.id,
                    "Recovered agent session from daemon"
                );
                Ok(session)
            }
            None => Err(Error::not_found("agent", name)),
        }
    }

    /// Snapshot of the tracked agents.
    pub async fn list_agents(&self) -> HashMap<String, Session> {
        self.agents.read().await.clone()
    }
}
