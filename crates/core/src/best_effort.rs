//! Explicit record of compensating/cleanup steps.
//!
//! A cleanup step that fails must never mask the primary error of the
//! operation it belongs to. Instead of discarding its result, callers wrap it
//! in [`BestEffort`], which logs the failure and keeps it observable.

use serde::Serialize;

/// Outcome of one best-effort step.
#[must_use]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BestEffort {
    /// Short name of the step (e.g. `"remove worktree"`).
    pub step: String,
    /// Failure text, `None` when the step succeeded.
    pub error: Option<String>,
}

impl BestEffort {
    /// Record `result` for `step`, logging a warning when it failed.
    pub fn run<T, E: std::fmt::Display>(
        step: impl Into<String>,
        result: std::result::Result<T, E>,
    ) -> Self {
        let step = step.into();
        match result {
            Ok(_) => Self { step, error: None },
            Err(e) => {
                tracing::warn!(step = %step, error = %e, "Best-effort step failed; continuing");
                Self {
                    step,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// A step that did not need to run.
    pub fn skipped(step: impl Into<String>) -> Self {
        Self {
            step: step.into(),
            error: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn failed(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_and_failure_are_recorded() {
        let ok = BestEffort::run("prune", Ok::<(), String>(()));
        assert!(ok.succeeded());

        let failed = BestEffort::run("remove", Err::<(), _>("no such container"));
        assert!(failed.failed());
        assert_eq!(failed.step, "remove");
        assert_eq!(failed.error.as_deref(), Some("no such container"));
    }
}
