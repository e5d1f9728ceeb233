//! Counters emitted by the supervisor.
//!
//! Only the `metrics` facade is used here; an embedding process may install
//! whatever recorder it likes.

use shieldbox_core::PolicyResult;

/// What was evaluated by the policy engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecisionKind {
    Command,
    File,
}

impl DecisionKind {
    fn as_str(&self) -> &'static str {
        match self {
            DecisionKind::Command => "command",
            DecisionKind::File => "file",
        }
    }
}

/// Count a policy decision.
pub fn track_policy_decision(kind: DecisionKind, result: &PolicyResult) {
    metrics::counter!(
        "shieldbox_policy_decisions_total",
        "kind" => kind.as_str(),
        "action" => result.action.to_string()
    )
    .increment(1);
}

/// Count a session lifecycle event (`created`, `stopped`, `restored`, ...).
pub fn track_session_event(event: &'static str) {
    metrics::counter!("shieldbox_sessions_total", "event" => event).increment(1);
}

/// Count a checkpoint event (`created`, `restored`).
pub fn track_checkpoint_event(event: &'static str) {
    metrics::counter!("shieldbox_checkpoints_total", "event" => event).increment(1);
}
