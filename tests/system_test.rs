//! End-to-end flows across the workspace crates with the in-memory
//! container runtime.

use std::path::Path;
use std::sync::Arc;

use shieldbox_core::paths::{checkpoint_index_file, control_dir};
use shieldbox_core::{AuditEventType, Error, PolicyAction, ProjectConfig, SessionState};
use shieldbox_governance::{AuditFilter, FileAuditLog, SecretMap};
use shieldbox_orchestrator::Orchestrator;
use shieldbox_policy::PolicyEngine;
use shieldbox_rollback::{JsonFileCheckpointStore, RollbackManager};
use shieldbox_sandbox::{MockRuntime, SandboxEngine};

struct Project {
    dir: tempfile::TempDir,
    config: ProjectConfig,
    runtime: Arc<MockRuntime>,
    engine: Arc<SandboxEngine>,
}

impl Project {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ProjectConfig::default();
        config.sandbox.read_only = vec!["/opt/toolchain".to_string()];
        config.save(dir.path()).unwrap();

        let config = ProjectConfig::load(dir.path()).unwrap();
        let runtime = Arc::new(MockRuntime::new());
        let audit = FileAuditLog::new(config.audit.resolved_log_dir(dir.path())).unwrap();
        let engine = SandboxEngine::new(runtime.clone())
            .with_policy(Arc::new(PolicyEngine::from_config(&config)))
            .with_audit(Arc::new(audit));

        Self {
            dir,
            config,
            runtime,
            engine: Arc::new(engine),
        }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

#[tokio::test]
async fn test_project_session_lifecycle() {
    let project = Project::new();
    assert_eq!(project.config.sandbox.read_only, vec!["/opt/toolchain"]);

    let mut session = project
        .engine
        .create_session(project.path(), &project.config.sandbox, "alpha", &SecretMap::new())
        .await
        .unwrap();

    project.engine.exec_command(&session, "git status").await.unwrap();
    let denied = project
        .engine
        .exec_command(&session, "sudo rm -rf /tmp")
        .await
        .unwrap_err();
    assert!(matches!(denied, Error::PolicyDenied { .. }));

    let store = Arc::new(JsonFileCheckpointStore::new(checkpoint_index_file(project.path())));
    let mut rollback = RollbackManager::open(
        project.engine.clone(),
        project.config.sandbox.clone(),
        store,
    )
    .await
    .unwrap();
    let checkpoint = rollback
        .create_checkpoint(&session, "after install")
        .await
        .unwrap();
    assert!(checkpoint_index_file(project.path()).exists());

    let before = session.container_id.clone();
    rollback.rollback(&mut session, &checkpoint.id).await.unwrap();
    assert_ne!(session.container_id, before);

    let restored = project.runtime.container(&session.container_id).await.unwrap();
    assert!(restored
        .spec
        .mounts
        .iter()
        .any(|m| m.target == "/opt/toolchain" && m.read_only));

    project.engine.stop_session(&mut session).await.unwrap();
    assert_eq!(session.state, SessionState::Stopped);
    assert!(project.runtime.containers().await.is_empty());

    // Nothing under the control directory is visible to git.
    let gitignore = std::fs::read_to_string(control_dir(project.path()).join(".gitignore")).unwrap();
    assert_eq!(gitignore, "*\n");

    let log_dir = project.config.audit.resolved_log_dir(project.path());
    let entries = FileAuditLog::read_dir(&log_dir, &AuditFilter::session(session.id.as_str())).unwrap();
    let events: Vec<_> = entries.iter().map(|e| e.event_type).collect();
    assert_eq!(
        events,
        vec![
            AuditEventType::SessionCreated,
            AuditEventType::CommandExec,
            AuditEventType::CommandExec,
            AuditEventType::CheckpointCreated,
            AuditEventType::Rollback,
            AuditEventType::SessionStopped,
        ]
    );
    assert_eq!(entries[2].action, PolicyAction::Block);
    assert_eq!(entries[2].command.as_deref(), Some("sudo rm -rf /tmp"));
}

fn git(dir: &Path, args: &[&str]) -> bool {
    std::process::Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[tokio::test]
async fn test_agents_merge_back_through_git_worktrees() {
    let project = Project::new();
    if !git(project.path(), &["init", "-q"]) {
        eprintln!("git not installed; skipping");
        return;
    }
    git(project.path(), &["config", "user.email", "dev@example.com"]);
    git(project.path(), &["config", "user.name", "Dev"]);
    git(project.path(), &["config", "commit.gpgsign", "false"]);
    assert!(git(project.path(), &["add", ".shieldbox.yaml"]));
    assert!(git(project.path(), &["commit", "-q", "-m", "init"]));

    let orchestrator = Orchestrator::new(project.engine.clone());
    let mut worktrees = Vec::new();
    for name in ["alpha", "beta"] {
        let session = orchestrator
            .spawn_agent(project.path(), name, &project.config.sandbox, &SecretMap::new())
            .await
            .unwrap();
        let worktree = session.worktree_dir.clone().unwrap();
        std::fs::write(worktree.join(format!("{name}.txt")), format!("{name}\n")).unwrap();
        worktrees.push(worktree);
    }
    assert_eq!(orchestrator.list_agents().await.len(), 2);

    for name in ["alpha", "beta"] {
        let report = orchestrator.stop_agent(name, true).await.unwrap();
        assert!(report.merged);
        assert!(report.cleanup.iter().all(|step| step.succeeded()));
    }

    assert_eq!(std::fs::read_to_string(project.path().join("alpha.txt")).unwrap(), "alpha\n");
    assert_eq!(std::fs::read_to_string(project.path().join("beta.txt")).unwrap(), "beta\n");
    assert!(worktrees.iter().all(|w| !w.exists()));
    assert!(orchestrator.list_agents().await.is_empty());
    assert!(project.runtime.containers().await.is_empty());
}
