//! Checkpoint creation and restore.
//!
//! A checkpoint commits a session's container to an image. Restoring replaces
//! the session's container with a fresh one started from that image; the
//! session id and the checkpoint history are kept.
//!
//! Methods that touch the index take `&mut self`: one manager is the single
//! writer for the sessions it handles. Callers sharing a manager across
//! tasks wrap it in a lock.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use shieldbox_core::paths::{labels, CHECKPOINT_REPO};
use shieldbox_core::{
    AuditEntry, AuditEventType, BestEffort, Checkpoint, Error, Result, SandboxConfig, Session,
    SessionState,
};
use shieldbox_governance::{track_checkpoint_event, track_session_event};
use shieldbox_sandbox::{CommitRequest, SandboxEngine};

use crate::store::{CheckpointIndex, CheckpointStore};

/// Grace period for stopping the container being replaced.
pub const ROLLBACK_GRACE: Duration = Duration::from_secs(5);

/// Outcome of a successful restore.
#[derive(Debug, Clone, Serialize)]
pub struct RestoreReport {
    /// Checkpoint the session was restored from.
    pub checkpoint: Checkpoint,
    /// Removal of the replaced container. A failure here does not fail the
    /// restore.
    pub teardown: BestEffort,
}

pub struct RollbackManager {
    engine: Arc<SandboxEngine>,
    config: SandboxConfig,
    store: Arc<dyn CheckpointStore>,
    index: CheckpointIndex,
}

impl RollbackManager {
    /// Load the checkpoint index from `store`.
    ///
    /// `config` must be the sandbox configuration the sessions were created
    /// with; restored containers get the same mounts and hardening.
    pub async fn open(
        engine: Arc<SandboxEngine>,
        config: SandboxConfig,
        store: Arc<dyn CheckpointStore>,
    ) -> Result<Self> {
        let index = store.load().await?;
        tracing::debug!(sessions = index.len(), "Checkpoint index loaded");
        Ok(Self {
            engine,
            config,
            store,
            index,
        })
    }

    /// Checkpoints of `session_id`, oldest first.
    pub fn list_checkpoints(&self, session_id: &str) -> &[Checkpoint] {
        self.index.get(session_id).map(Vec::as_slice).unwrap_or_default()
    }

    /// Snapshot the session's current container.
    ///
    /// The container is paused while it is committed. The index is persisted
    /// before this returns; if that fails the checkpoint is not recorded.
    pub async fn create_checkpoint(
        &mut self,
        session: &Session,
        description: &str,
    ) -> Result<Checkpoint> {
        let created_at = self.next_timestamp();
        let id = format!("sb-cp-{}", created_at.timestamp_millis());

        let request = CommitRequest {
            repo: CHECKPOINT_REPO.to_string(),
            tag: id.clone(),
            comment: description.to_string(),
            pause: true,
        };
        let image_id = self
            .engine
            .runtime()
            .commit_container(&session.container_id, &request)
            .await?;

        let checkpoint = Checkpoint {
            id,
            session_id: session.id.clone(),
            image_id,
            description: description.to_string(),
            created_at,
        };

        let mut index = self.index.clone();
        index
            .entry(session.id.clone())
            .or_default()
            .push(checkpoint.clone());
        self.store.save(&index).await?;
        self.index = index;

        tracing::info!(
            session_id = %session.id,
            checkpoint = %checkpoint.id,
            image = %checkpoint.image_id,
            "Checkpoint created"
        );
        track_checkpoint_event("created");
        self.engine
            .audit(
                AuditEntry::event(&session.id, &session.agent_name, AuditEventType::CheckpointCreated)
                    .with_reason(format!("checkpoint {}: {}", checkpoint.id, description)),
            )
            .await;

        Ok(checkpoint)
    }

    /// Strictly after every recorded checkpoint, so per-session order is
    /// creation order and ids never collide.
    fn next_timestamp(&self) -> DateTime<Utc> {
        let now = Utc::now();
        let last = self
            .index
            .values()
            .flatten()
            .map(|c| c.created_at.timestamp_millis())
            .max();

        match last {
            Some(last) if last >= now.timestamp_millis() => {
                DateTime::from_timestamp_millis(last + 1).unwrap_or(now)
            }
            _ => now,
        }
    }

    /// Replace the session's container with one started from `checkpoint_id`.
    ///
    /// Later checkpoints stay listed, so rolling forward again is possible.
    pub async fn rollback(
        &mut self,
        session: &mut Session,
        checkpoint_id: &str,
    ) -> Result<RestoreReport> {
        let checkpoints = self.list_checkpoints(&session.id);
        if checkpoints.is_empty() {
            return Err(Error::not_found("checkpoints for session", session.id.clone()));
        }
        let checkpoint = checkpoints
            .iter()
            .find(|c| c.id == checkpoint_id)
            .cloned()
            .ok_or_else(|| Error::not_found("checkpoint", checkpoint_id))?;

        let runtime = self.engine.runtime().clone();
        let previous = session.container_id.clone();

        if let Err(e) = runtime.stop_container(&previous, ROLLBACK_GRACE).await {
            tracing::debug!(container = %previous, error = %e, "Stop before restore failed");
        }
        let teardown = BestEffort::run(
            "remove replaced container",
            runtime.remove_container(&previous).await,
        );

        // Reuse the session name only when no container of this session is
        // left; an earlier failed teardown may still hold it.
        let name_free = teardown.succeeded() && !self.has_leftover_container(&session.id).await;
        let name = name_free.then_some(session.id.as_str());
        let spec = self
            .engine
            .restore_spec(session, &self.config, &checkpoint.image_id);

        let restored = match runtime.create_container(name, &spec).await {
            Ok(id) => id,
            Err(e) => {
                self.mark_failed(session, &teardown);
                return Err(e);
            }
        };
        if let Err(e) = runtime.start_container(&restored).await {
            let _cleanup = BestEffort::run(
                "remove unstarted restore",
                runtime.remove_container(&restored).await,
            );
            self.mark_failed(session, &teardown);
            return Err(e);
        }

        session.container_id = restored;
        session.transition(SessionState::Running);

        tracing::info!(
            session_id = %session.id,
            checkpoint = %checkpoint.id,
            container = %session.container_id,
            "Session restored from checkpoint"
        );
        track_checkpoint_event("restored");
        track_session_event("restored");
        self.engine
            .audit(
                AuditEntry::event(&session.id, &session.agent_name, AuditEventType::Rollback)
                    .with_reason(format!("restored checkpoint {}", checkpoint.id)),
            )
            .await;

        Ok(RestoreReport {
            checkpoint,
            teardown,
        })
    }

    async fn has_leftover_container(&self, session_id: &str) -> bool {
        match self
            .engine
            .runtime()
            .list_containers((labels::SESSION, session_id))
            .await
        {
            Ok(containers) => !containers.is_empty(),
            Err(e) => {
                tracing::debug!(session_id = %session_id, error = %e, "Container listing failed");
                true
            }
        }
    }

    /// Restore the most recent checkpoint of the session.
    pub async fn rollback_to_latest(&mut self, session: &mut Session) -> Result<RestoreReport> {
        let latest = self
            .list_checkpoints(&session.id)
            .last()
            .map(|c| c.id.clone())
            .ok_or_else(|| Error::not_found("checkpoints for session", session.id.clone()))?;
        self.rollback(session, &latest).await
    }

    /// With the old container gone and no replacement, the session is dead.
    fn mark_failed(&self, session: &mut Session, teardown: &BestEffort) {
        if teardown.succeeded() {
            session.transition(SessionState::Error);
        }
    }
}
