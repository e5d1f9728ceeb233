use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{PolicyAction, PolicyResult};

/// Kind of event recorded in the audit trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    SessionCreated,
    SessionStopped,
    CommandExec,
    FileAccess,
    CheckpointCreated,
    Rollback,
    AgentSpawned,
    AgentStopped,
}

impl std::fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SessionCreated => "session_created",
            Self::SessionStopped => "session_stopped",
            Self::CommandExec => "command_exec",
            Self::FileAccess => "file_access",
            Self::CheckpointCreated => "checkpoint_created",
            Self::Rollback => "rollback",
            Self::AgentSpawned => "agent_spawned",
            Self::AgentStopped => "agent_stopped",
        };
        f.write_str(s)
    }
}

/// A single audit log entry, serialized as one JSON line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub session_id: String,
    pub agent_name: String,
    pub event_type: AuditEventType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    pub action: PolicyAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule_pattern: Option<String>,
}

impl AuditEntry {
    /// A lifecycle event with no policy decision attached.
    pub fn event(
        session_id: impl Into<String>,
        agent_name: impl Into<String>,
        event_type: AuditEventType,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            session_id: session_id.into(),
            agent_name: agent_name.into(),
            event_type,
            command: None,
            file_path: None,
            action: PolicyAction::Allow,
            reason: None,
            rule_pattern: None,
        }
    }

    /// Attach a policy decision (action, reason and matched pattern).
    pub fn with_decision(mut self, result: &PolicyResult) -> Self {
        self.action = result.action;
        self.reason = (!result.reason.is_empty()).then(|| result.reason.clone());
        self.rule_pattern = result.matched_rule.as_ref().map(|r| r.pattern.clone());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
