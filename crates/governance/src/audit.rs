//! Audit logging for compliance and forensics.
//!
//! Append-only, one JSON object per line. Entries are written in the order
//! operations complete; no global sequencing exists beyond the per-sink
//! append.

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use shieldbox_core::{AuditEntry, Error, Result};

/// Filter for querying audit logs.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only entries of this session.
    pub session_id: Option<String>,
    /// Keep only the last N entries (applied after the session filter).
    pub last: Option<usize>,
}

impl AuditFilter {
    pub fn session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            last: None,
        }
    }

    pub fn last(mut self, n: usize) -> Self {
        self.last = Some(n);
        self
    }

    /// Apply the filter to entries already in log order.
    pub fn apply(&self, entries: impl IntoIterator<Item = AuditEntry>) -> Vec<AuditEntry> {
        let mut result: Vec<AuditEntry> = entries
            .into_iter()
            .filter(|e| {
                self.session_id
                    .as_ref()
                    .map_or(true, |s| &e.session_id == s)
            })
            .collect();

        if let Some(n) = self.last {
            if n < result.len() {
                result.drain(..result.len() - n);
            }
        }
        result
    }
}

/// Sink for audit entries.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append an entry.
    async fn log(&self, entry: AuditEntry) -> Result<()>;

    /// Query entries with optional filters, in log order.
    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>>;
}

/// In-memory audit sink for testing.
#[derive(Default)]
pub struct InMemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl InMemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry logged so far.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries
            .lock()
            .map(|e| e.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditLog {
    async fn log(&self, entry: AuditEntry) -> Result<()> {
        self.entries
            .lock()
            .map_err(|_| Error::storage("audit log lock poisoned"))?
            .push(entry);
        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>> {
        Ok(filter.apply(self.entries()))
    }
}

/// Audit sink writing JSONL files under a log directory.
///
/// Each sink instance appends to `audit-<timestamp>.jsonl`; queries read
/// every audit file in the directory, oldest first.
pub struct FileAuditLog {
    log_dir: PathBuf,
    path: PathBuf,
    file: Mutex<std::fs::File>,
}

impl FileAuditLog {
    /// Open (or create) the current audit file under `log_dir`.
    pub fn new(log_dir: impl Into<PathBuf>) -> Result<Self> {
        let log_dir = log_dir.into();
        std::fs::create_dir_all(&log_dir).map_err(|e| {
            Error::storage(format!(
                "Failed to create audit log dir {}: {}",
                log_dir.display(),
                e
            ))
        })?;

        let filename = format!(
            "audit-{}.jsonl",
            chrono::Utc::now().format("%Y-%m-%dT%H-%M-%S")
        );
        let path = log_dir.join(filename);

        let mut options = std::fs::OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let file = options.open(&path).map_err(|e| {
            Error::storage(format!("Failed to open audit log {}: {}", path.display(), e))
        })?;

        Ok(Self {
            log_dir,
            path,
            file: Mutex::new(file),
        })
    }

    /// File this sink appends to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read entries from every audit file under `log_dir`.
    ///
    /// Lines that fail to parse are skipped.
    pub fn read_dir(log_dir: &Path, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        if !log_dir.exists() {
            return Ok(Vec::new());
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(log_dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .map(|n| n.to_string_lossy())
                    .is_some_and(|n| n.starts_with("audit-") && n.ends_with(".jsonl"))
            })
            .collect();
        files.sort();

        let mut entries = Vec::new();
        for file in files {
            let content = match std::fs::read_to_string(&file) {
                Ok(content) => content,
                Err(e) => {
                    tracing::warn!(file = %file.display(), error = %e, "Skipping unreadable audit file");
                    continue;
                }
            };
            entries.extend(
                content
                    .lines()
                    .filter(|l| !l.trim().is_empty())
                    .filter_map(|l| serde_json::from_str::<AuditEntry>(l).ok()),
            );
        }

        Ok(filter.apply(entries))
    }
}

#[async_trait]
impl AuditSink for FileAuditLog {
    async fn log(&self, entry: AuditEntry) -> Result<()> {
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = self
            .file
            .lock()
            .map_err(|_| Error::storage("audit log lock poisoned"))?;
        file.write_all(line.as_bytes())
            .map_err(|e| Error::storage(format!("Failed to write audit entry: {}", e)))?;
        Ok(())
    }

    async fn query(&self, filter: AuditFilter) -> Result<Vec<AuditEntry>> {
        Self::read_dir(&self.log_dir, &filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shieldbox_core::AuditEventType;

    fn entry(session: &str, event: AuditEventType) -> AuditEntry {
        AuditEntry::event(session, "alpha", event)
    }

    #[test]
    fn test_filter_session_then_last() {
        let entries = vec![
            entry("s1", AuditEventType::SessionCreated),
            entry("s2", AuditEventType::SessionCreated),
            entry("s1", AuditEventType::CommandExec),
            entry("s1", AuditEventType::SessionStopped),
        ];

        let filtered = AuditFilter::session("s1").last(2).apply(entries.clone());
        assert_eq!(filtered.len(), 2);
        assert_eq!(filtered[0].event_type, AuditEventType::CommandExec);
        assert_eq!(filtered[1].event_type, AuditEventType::SessionStopped);

        let all = AuditFilter::default().last(10).apply(entries);
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_file_audit_log_appends_jsonl() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAuditLog::new(dir.path().join("logs")).unwrap();

        log.log(entry("s1", AuditEventType::SessionCreated)).await.unwrap();
        log.log(
            entry("s1", AuditEventType::CommandExec)
                .with_command("git status"),
        )
        .await
        .unwrap();
        log.log(entry("s2", AuditEventType::SessionCreated)).await.unwrap();

        let content = std::fs::read_to_string(log.path()).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("\"event_type\":\"command_exec\""));

        let s1 = log.query(AuditFilter::session("s1")).await.unwrap();
        assert_eq!(s1.len(), 2);
        assert_eq!(s1[1].command.as_deref(), Some("git status"));
    }

    #[tokio::test]
    async fn test_unparsable_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let log = FileAuditLog::new(dir.path()).unwrap();
        log.log(entry("s1", AuditEventType::SessionCreated)).await.unwrap();

        std::fs::write(dir.path().join("audit-0000-corrupt.jsonl"), "{not json\n\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let entries = FileAuditLog::read_dir(dir.path(), &AuditFilter::default()).unwrap();
        assert_eq!(entries.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_dir_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let entries =
            FileAuditLog::read_dir(&dir.path().join("absent"), &AuditFilter::default()).unwrap();
        assert!(entries.is_empty());
    }
}
