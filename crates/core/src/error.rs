//! Error types for Shieldbox.

use thiserror::Error;

/// Result type alias using Shieldbox's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for Shieldbox.
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Container daemon
    // =========================================================================
    #[error("Container daemon unavailable: {0}")]
    DockerUnavailable(String),

    #[error("Container operation '{operation}' failed: {message}")]
    Container { operation: String, message: String },

    // =========================================================================
    // Lookups
    // =========================================================================
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} '{id}' already exists")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("Invalid {kind} '{value}': {reason}")]
    Invalid {
        kind: &'static str,
        value: String,
        reason: String,
    },

    // =========================================================================
    // Policy
    // =========================================================================
    #[error("Policy blocked: {command} (reason: {reason})")]
    PolicyDenied { command: String, reason: String },

    // =========================================================================
    // Git / worktrees
    // =========================================================================
    #[error("git {operation} failed: {output}")]
    Git { operation: String, output: String },

    #[error("Merge failed for agent '{agent}' (resolve conflicts manually): {output}")]
    MergeConflict { agent: String, output: String },

    // =========================================================================
    // Persistence, config, secrets
    // =========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Secrets error: {0}")]
    Secrets(String),

    // =========================================================================
    // Generic Errors
    // =========================================================================
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create a container operation error.
    pub fn container(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Container {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a not-found error for the given kind of object.
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create an already-exists error.
    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        Self::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    /// Create a validation error.
    pub fn invalid(
        kind: &'static str,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Invalid {
            kind,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a git error carrying the tool output verbatim.
    pub fn git(operation: impl Into<String>, output: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            output: output.into(),
        }
    }

    /// Create a storage error.
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a secrets error.
    pub fn secrets(msg: impl Into<String>) -> Self {
        Self::Secrets(msg.into())
    }

    /// Whether this error is a lookup miss (recoverable by the caller).
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_carries_id() {
        let err = Error::not_found("checkpoint", "sb-cp-42");
        assert_eq!(err.to_string(), "checkpoint 'sb-cp-42' not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_merge_conflict_keeps_output_verbatim() {
        let err = Error::MergeConflict {
            agent: "alpha".into(),
            output: "CONFLICT (content): Merge conflict in src/lib.rs".into(),
        };
        assert!(err
            .to_string()
            .contains("CONFLICT (content): Merge conflict in src/lib.rs"));
    }
}
