//! Audit sinks exercised through the trait object the supervisor uses.

use std::sync::Arc;

use shieldbox_core::{AuditEntry, AuditEventType, PolicyAction, PolicyResult, Rule};
use shieldbox_governance::{AuditFilter, AuditSink, FileAuditLog, InMemoryAuditLog};

fn decision(session: &str, command: &str, allowed: bool) -> AuditEntry {
    let result = if allowed {
        PolicyResult::allow(Some(Rule::allow("git *")), "")
    } else {
        PolicyResult::block(
            Some(Rule::block("sudo *", "Privilege escalation not allowed")),
            "Privilege escalation not allowed",
        )
    };
    AuditEntry::event(session, "alpha", AuditEventType::CommandExec)
        .with_command(command)
        .with_decision(&result)
}

async fn exercise(sink: Arc<dyn AuditSink>) {
    sink.log(decision("sb-alpha-1", "git status", true)).await.unwrap();
    sink.log(decision("sb-beta-2", "git log", true)).await.unwrap();
    sink.log(decision("sb-alpha-1", "sudo su", false)).await.unwrap();

    let alpha = sink.query(AuditFilter::session("sb-alpha-1")).await.unwrap();
    assert_eq!(alpha.len(), 2);
    assert_eq!(alpha[0].command.as_deref(), Some("git status"));
    assert_eq!(alpha[1].action, PolicyAction::Block);
    assert_eq!(alpha[1].rule_pattern.as_deref(), Some("sudo *"));
    assert_eq!(
        alpha[1].reason.as_deref(),
        Some("Privilege escalation not allowed")
    );

    let last = sink.query(AuditFilter::default().last(1)).await.unwrap();
    assert_eq!(last.len(), 1);
    assert_eq!(last[0].command.as_deref(), Some("sudo su"));
}

#[tokio::test]
async fn test_in_memory_sink() {
    exercise(Arc::new(InMemoryAuditLog::new())).await;
}

#[tokio::test]
async fn test_file_sink() {
    let dir = tempfile::tempdir().unwrap();
    exercise(Arc::new(FileAuditLog::new(dir.path()).unwrap())).await;
}

#[tokio::test]
async fn test_file_sink_reads_across_instances() {
    let dir = tempfile::tempdir().unwrap();
    let first = FileAuditLog::new(dir.path()).unwrap();
    first.log(decision("s", "git status", true)).await.unwrap();
    drop(first);

    let second = FileAuditLog::new(dir.path()).unwrap();
    second.log(decision("s", "git diff", true)).await.unwrap();

    let entries = second.query(AuditFilter::session("s")).await.unwrap();
    assert_eq!(entries.len(), 2);
}
