//! Sandbox session lifecycle.
//!
//! The engine materializes hardened containers for agents, mediates host-side
//! command execution through the policy engine, and reconstructs sessions
//! from the daemon's container listing.
//!
//! Policy is enforced in two places. [`SandboxEngine::exec_command`] checks
//! commands on the host. When a policy is attached, the rule set is also
//! written out as a [`shieldbox_policy::PolicyArtifact`], mounted read-only
//! into the container, and the container's shell is replaced by the
//! enforcement shell that re-checks every command from the inside.

use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use shieldbox_core::paths::{self, labels, POLICY_SHELL_PATH, WORKSPACE_MOUNT};
use shieldbox_core::{
    AuditEntry, AuditEventType, BestEffort, Error, PolicyResult, Result, RulesConfig,
    SandboxConfig, Session, SessionState,
};
use shieldbox_governance::{
    track_policy_decision, track_session_event, AuditSink, DecisionKind, SecretMap,
};
use shieldbox_policy::PolicyEngine;

use crate::assembly::{build_hardening, build_mounts, session_labels};
use crate::runtime::{ContainerRuntime, ContainerSpec, ExecOutput};

/// Grace period before a stopping container is killed.
pub const STOP_GRACE: Duration = Duration::from_secs(10);

/// Bound on the local image existence check.
pub const IMAGE_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Owns container lifecycle for sandbox sessions.
pub struct SandboxEngine {
    runtime: Arc<dyn ContainerRuntime>,
    policy: Option<Arc<PolicyEngine>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl SandboxEngine {
    pub fn new(runtime: Arc<dyn ContainerRuntime>) -> Self {
        Self {
            runtime,
            policy: None,
            audit: None,
        }
    }

    /// Attach a policy engine: enables host-side checks and in-container
    /// enforcement for sessions created afterwards.
    pub fn with_policy(mut self, policy: Arc<PolicyEngine>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn runtime(&self) -> &Arc<dyn ContainerRuntime> {
        &self.runtime
    }

    pub fn policy(&self) -> Option<&Arc<PolicyEngine>> {
        self.policy.as_ref()
    }

    /// Create and start a session with `project_dir` mounted at the workspace.
    pub async fn create_session(
        &self,
        project_dir: &Path,
        config: &SandboxConfig,
        agent_name: &str,
        secrets: &SecretMap,
    ) -> Result<Session> {
        self.create(project_dir, None, config, agent_name, secrets).await
    }

    /// Create and start a session with an agent worktree mounted at the
    /// workspace. The session still belongs to `project_dir`.
    pub async fn create_worktree_session(
        &self,
        project_dir: &Path,
        worktree_dir: &Path,
        config: &SandboxConfig,
        agent_name: &str,
        secrets: &SecretMap,
    ) -> Result<Session> {
        self.create(project_dir, Some(worktree_dir), config, agent_name, secrets)
            .await
    }

    async fn create(
        &self,
        project_dir: &Path,
        worktree_dir: Option<&Path>,
        config: &SandboxConfig,
        agent_name: &str,
        secrets: &SecretMap,
    ) -> Result<Session> {
        paths::validate_agent_name(agent_name)?;

        let now = Utc::now();
        let mut session = Session {
            id: session_id(agent_name, now.timestamp_millis()),
            project_dir: paths::absolute(project_dir)?,
            container_id: String::new(),
            state: SessionState::Creating,
            agent_name: agent_name.to_string(),
            worktree_dir: worktree_dir.map(paths::absolute).transpose()?,
            created_at: now,
            updated_at: now,
        };

        self.ensure_image(&config.image).await?;

        let artifact = match &self.policy {
            Some(policy) => Some(write_policy_artifact(policy, &session.project_dir)?),
            None => None,
        };

        let mut env = secret_env(secrets);
        let cmd = if self.policy.is_some() {
            env.push(format!("SHELL={}", POLICY_SHELL_PATH));
            vec![POLICY_SHELL_PATH.to_string()]
        } else {
            vec!["sleep".to_string(), "infinity".to_string()]
        };

        let spec = ContainerSpec {
            env,
            cmd: Some(cmd),
            ..self.container_spec(&session, config, &config.image, artifact.as_deref())
        };

        let container_id = self.runtime.create_container(Some(&session.id), &spec).await?;
        if let Err(e) = self.runtime.start_container(&container_id).await {
            let _cleanup = BestEffort::run(
                "remove unstarted container",
                self.runtime.remove_container(&container_id).await,
            );
            return Err(e);
        }

        session.container_id = container_id;
        session.transition(SessionState::Running);

        tracing::info!(
            session_id = %session.id,
            agent = %session.agent_name,
            container = %session.container_id,
            workspace = %session.workspace_root().display(),
            enforced = self.policy.is_some(),
            "Sandbox session started"
        );
        track_session_event("created");
        self.audit(AuditEntry::event(
            &session.id,
            &session.agent_name,
            AuditEventType::SessionCreated,
        ))
        .await;

        Ok(session)
    }

    /// Spec for a session container: labels, mounts and hardening derived
    /// from the session and `config`, with no command override or env.
    fn container_spec(
        &self,
        session: &Session,
        config: &SandboxConfig,
        image: &str,
        policy_artifact: Option<&Path>,
    ) -> ContainerSpec {
        ContainerSpec {
            image: image.to_string(),
            labels: session_labels(session),
            env: Vec::new(),
            cmd: None,
            working_dir: WORKSPACE_MOUNT.to_string(),
            mounts: build_mounts(session.workspace_root(), config, policy_artifact),
            hardening: build_hardening(config),
            tty: true,
            open_stdin: true,
        }
    }

    /// Spec for recreating `session` from a committed image.
    ///
    /// Labels, mounts and hardening match the original session. Command and
    /// environment come from the image, which captured them at commit time.
    pub fn restore_spec(&self, session: &Session, config: &SandboxConfig, image: &str) -> ContainerSpec {
        let artifact = self
            .policy
            .as_ref()
            .map(|_| paths::policy_artifact_file(&session.project_dir));
        self.container_spec(session, config, image, artifact.as_deref())
    }

    async fn ensure_image(&self, image: &str) -> Result<()> {
        let exists = tokio::time::timeout(IMAGE_CHECK_TIMEOUT, self.runtime.image_exists(image))
            .await
            .map_err(|_| {
                Error::container(
                    format!("inspect image {}", image),
                    format!("timed out after {:?}", IMAGE_CHECK_TIMEOUT),
                )
            })??;

        if !exists {
            self.runtime.pull_image(image).await?;
        }
        Ok(())
    }

    /// Run `command` in the session's workspace after a host-side policy
    /// check.
    ///
    /// A denied command fails with [`Error::PolicyDenied`] without touching
    /// the container. With a policy attached the command runs through the
    /// enforcement shell, so it is checked again inside the container.
    pub async fn exec_command(&self, session: &Session, command: &str) -> Result<ExecOutput> {
        let argv = match &self.policy {
            Some(policy) => {
                let result = policy.evaluate_command(command);
                track_policy_decision(DecisionKind::Command, &result);
                self.audit(
                    AuditEntry::event(&session.id, &session.agent_name, AuditEventType::CommandExec)
                        .with_command(command)
                        .with_decision(&result),
                )
                .await;

                if !result.allowed {
                    tracing::warn!(
                        session_id = %session.id,
                        command = %command,
                        reason = %result.reason,
                        "Command blocked by policy"
                    );
                    return Err(Error::PolicyDenied {
                        command: command.to_string(),
                        reason: result.reason,
                    });
                }
                tracing::debug!(session_id = %session.id, command = %command, "Command allowed");
                vec![POLICY_SHELL_PATH.to_string(), "-c".to_string(), command.to_string()]
            }
            None => vec!["/bin/sh".to_string(), "-c".to_string(), command.to_string()],
        };

        self.runtime
            .exec(&session.container_id, &argv, WORKSPACE_MOUNT)
            .await
    }

    /// Evaluate access to `path` (a path inside the container) and audit the
    /// decision. Relative paths are taken relative to the workspace.
    pub async fn file_access(&self, session: &Session, path: &str) -> PolicyResult {
        let result = match &self.policy {
            Some(policy) => policy.evaluate_file_access(path),
            None => PolicyEngine::new(RulesConfig::default()).evaluate_file_access(path),
        };
        track_policy_decision(DecisionKind::File, &result);

        if !result.allowed {
            tracing::warn!(session_id = %session.id, path = %path, reason = %result.reason, "File access blocked");
        }
        self.audit(
            AuditEntry::event(&session.id, &session.agent_name, AuditEventType::FileAccess)
                .with_file_path(path)
                .with_decision(&result),
        )
        .await;
        result
    }

    /// Stop (with [`STOP_GRACE`]) and remove the session's container.
    ///
    /// Failures are returned; the session keeps its state in that case.
    pub async fn stop_session(&self, session: &mut Session) -> Result<()> {
        self.runtime
            .stop_container(&session.container_id, STOP_GRACE)
            .await?;
        self.runtime.remove_container(&session.container_id).await?;

        session.transition(SessionState::Stopped);
        tracing::info!(session_id = %session.id, agent = %session.agent_name, "Sandbox session stopped");
        track_session_event("stopped");
        self.audit(AuditEntry::event(
            &session.id,
            &session.agent_name,
            AuditEventType::SessionStopped,
        ))
        .await;
        Ok(())
    }

    /// Sessions reconstructed from every container carrying the management
    /// label, whatever their state.
    pub async fn list_sessions(&self) -> Result<Vec<Session>> {
        let containers = self.runtime.list_containers((labels::MANAGED, "true")).await?;

        let sessions = containers
            .into_iter()
            .filter_map(|c| {
                let Some(id) = c.labels.get(labels::SESSION).cloned() else {
                    tracing::debug!(container = %c.id, "Managed container without session label");
                    return None;
                };
                let label = |key: &str| c.labels.get(key).cloned().unwrap_or_default();
                let created_at = DateTime::from_timestamp(c.created, 0).unwrap_or_default();

                Some(Session {
                    id,
                    project_dir: PathBuf::from(label(labels::PROJECT)),
                    state: SessionState::from_container_state(&c.state),
                    agent_name: label(labels::AGENT),
                    worktree_dir: c.labels.get(labels::WORKTREE).map(PathBuf::from),
                    container_id: c.id,
                    created_at,
                    updated_at: created_at,
                })
            })
            .collect();
        Ok(sessions)
    }

    /// Log to the audit sink, if any. Failures are logged and ignored.
    pub async fn audit(&self, entry: AuditEntry) {
        if let Some(sink) = &self.audit {
            let _logged = BestEffort::run("write audit entry", sink.log(entry).await);
        }
    }
}

/// `KEY=value` pairs, sorted by key.
/// `sb-<agent>-<millis>-<8 hex>`; the suffix separates sessions started in
/// the same millisecond.
fn session_id(agent_name: &str, millis: i64) -> String {
    let suffix = uuid::Uuid::new_v4().simple().to_string();
    format!("sb-{}-{}-{}", agent_name, millis, &suffix[..8])
}

fn secret_env(secrets: &SecretMap) -> Vec<String> {
    let mut env: Vec<String> = secrets
        .iter()
        .map(|(k, v)| format!("{}={}", k, v.expose_secret()))
        .collect();
    env.sort();
    env
}

fn write_policy_artifact(policy: &PolicyEngine, project_dir: &Path) -> Result<PathBuf> {
    paths::ensure_control_dir(project_dir)?;
    let path = paths::policy_artifact_file(project_dir);
    policy.to_artifact().write(&path)?;
    tracing::debug!(path = %path.display(), "Policy artifact written");
    Ok(path)
}
