#![deny(unused)]
//! Shieldbox - sandboxed execution for AI coding agents.
//!
//! This binary reports the sandbox sessions of the project in the current
//! directory as seen by the container daemon, with their checkpoints.

use std::sync::Arc;

use shieldbox_core::paths::checkpoint_index_file;
use shieldbox_core::ProjectConfig;
use shieldbox_governance::{configure_tracing, AuditSink, FileAuditLog};
use shieldbox_policy::PolicyEngine;
use shieldbox_rollback::{JsonFileCheckpointStore, RollbackManager};
use shieldbox_sandbox::{DockerRuntime, SandboxEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    configure_tracing(std::env::var_os("SHIELDBOX_LOG_JSON").is_some())?;

    let project_dir = std::env::current_dir()?;
    let config = ProjectConfig::load(&project_dir)?;
    tracing::debug!(
        project = %project_dir.display(),
        configured = ProjectConfig::exists(&project_dir),
        "Configuration loaded"
    );

    let runtime = Arc::new(DockerRuntime::connect().await?);
    let mut engine = SandboxEngine::new(runtime)
        .with_policy(Arc::new(PolicyEngine::from_config(&config)));
    if config.audit.enabled {
        let log_dir = config.audit.resolved_log_dir(&project_dir);
        let sink: Arc<dyn AuditSink> = Arc::new(FileAuditLog::new(log_dir)?);
        engine = engine.with_audit(sink);
    }
    let engine = Arc::new(engine);

    let store = Arc::new(JsonFileCheckpointStore::new(checkpoint_index_file(&project_dir)));
    let rollback = RollbackManager::open(engine.clone(), config.sandbox.clone(), store).await?;

    let mut sessions: Vec<_> = engine
        .list_sessions()
        .await?
        .into_iter()
        .filter(|s| s.project_dir == project_dir)
        .collect();
    sessions.sort_by_key(|s| s.created_at);

    if sessions.is_empty() {
        println!("No sandbox sessions for {}", project_dir.display());
        return Ok(());
    }

    println!(
        "{:<36} {:<16} {:<10} {:<12} {}",
        "SESSION", "AGENT", "STATE", "CONTAINER", "CHECKPOINTS"
    );
    for session in &sessions {
        let checkpoints = rollback.list_checkpoints(&session.id);
        println!(
            "{:<36} {:<16} {:<10} {:<12} {}",
            session.id,
            session.agent_name,
            session.state.to_string(),
            session.container_id.chars().take(12).collect::<String>(),
            checkpoints.len()
        );
        if let Some(worktree) = &session.worktree_dir {
            println!("    worktree: {}", worktree.display());
        }
        if let Some(latest) = checkpoints.last() {
            println!(
                "    latest checkpoint: {} ({}) {}",
                latest.id,
                latest.created_at.format("%Y-%m-%d %H:%M:%S"),
                latest.description
            );
        }
    }

    tracing::info!(sessions = sessions.len(), "Status reported");
    Ok(())
}
