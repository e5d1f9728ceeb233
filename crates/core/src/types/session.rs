use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// =============================================================================
// Session & State Types
// =============================================================================

/// Lifecycle state of a sandbox session.
///
/// `Creating → Running → {Paused, Stopped, Error}`; `Stopped` and `Error`
/// are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionState {
    Creating,
    Running,
    Paused,
    Stopped,
    Error,
}

impl SessionState {
    /// Whether no further transitions are possible.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Stopped | Self::Error)
    }

    /// Map a daemon-reported container state string onto a session state.
    pub fn from_container_state(state: &str) -> Self {
        match state {
            "created" => Self::Creating,
            "exited" | "removing" => Self::Stopped,
            "paused" => Self::Paused,
            "dead" => Self::Error,
            _ => Self::Running,
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Creating => "creating",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One managed, hardened execution environment bound to a single agent.
///
/// `id` never changes once created. `container_id` is replaced by a rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique session ID (`sb-<agent>-<millis>-<suffix>`).
    pub id: String,

    /// Absolute path of the project the session belongs to.
    pub project_dir: PathBuf,

    /// Daemon-side container reference.
    pub container_id: String,

    /// Current lifecycle state.
    pub state: SessionState,

    /// Agent the session is bound to.
    pub agent_name: String,

    /// Git worktree mounted as the workspace, for orchestrated agents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worktree_dir: Option<PathBuf>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Directory bind-mounted at the workspace target.
    pub fn workspace_root(&self) -> &PathBuf {
        self.worktree_dir.as_ref().unwrap_or(&self.project_dir)
    }

    /// Move to `state` and bump `updated_at`.
    pub fn transition(&mut self, state: SessionState) {
        self.state = state;
        self.touch();
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_container_state_mapping() {
        assert_eq!(SessionState::from_container_state("running"), SessionState::Running);
        assert_eq!(SessionState::from_container_state("exited"), SessionState::Stopped);
        assert_eq!(SessionState::from_container_state("paused"), SessionState::Paused);
        assert_eq!(SessionState::from_container_state("dead"), SessionState::Error);
        assert_eq!(SessionState::from_container_state("created"), SessionState::Creating);
    }

    #[test]
    fn test_terminal_states() {
        assert!(SessionState::Stopped.is_terminal());
        assert!(SessionState::Error.is_terminal());
        assert!(!SessionState::Running.is_terminal());
        assert!(!SessionState::Paused.is_terminal());
    }

    #[test]
    fn test_state_serializes_lowercase() {
        let json = serde_json::to_string(&SessionState::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }
}
