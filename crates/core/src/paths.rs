//! Well-known paths, labels and naming conventions.
//!
//! These constants are a contract between the host (engine, orchestrator)
//! and the sandbox image (enforcement shell), so they live in one place.

use std::path::{Path, PathBuf};

use crate::Result;

/// Workspace mount point inside every sandbox container.
pub const WORKSPACE_MOUNT: &str = "/workspace";

/// Fixed path the policy artifact is mounted at inside the container.
pub const POLICY_ARTIFACT_PATH: &str = "/etc/shieldbox/policy.json";

/// Policy-enforcing shell shipped in the sandbox image.
pub const POLICY_SHELL_PATH: &str = "/usr/local/bin/shieldbox-shell";

/// Default sandbox image.
pub const SANDBOX_IMAGE: &str = "shieldbox/sandbox:latest";

/// Repository checkpoint images are committed into.
pub const CHECKPOINT_REPO: &str = "shieldbox/checkpoint";

/// Project configuration file name.
pub const CONFIG_FILE_NAME: &str = ".shieldbox.yaml";

/// Hidden per-project control directory.
pub const CONTROL_DIR: &str = ".shieldbox";

/// Container labels. Every managed container carries all of them.
pub mod labels {
    pub const MANAGED: &str = "shieldbox.managed";
    pub const SESSION: &str = "shieldbox.session";
    pub const AGENT: &str = "shieldbox.agent";
    pub const PROJECT: &str = "shieldbox.project";
    pub const WORKTREE: &str = "shieldbox.worktree";
}

/// `<project>/.shieldbox`
pub fn control_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CONTROL_DIR)
}

/// Host-side location of the serialized policy artifact.
pub fn policy_artifact_file(project_dir: &Path) -> PathBuf {
    control_dir(project_dir).join("policy.json")
}

/// Default checkpoint index location.
pub fn checkpoint_index_file(project_dir: &Path) -> PathBuf {
    control_dir(project_dir).join("checkpoints.json")
}

/// `<project>/.shieldbox/worktrees/<agent>`
pub fn worktree_dir(project_dir: &Path, agent_name: &str) -> PathBuf {
    control_dir(project_dir).join("worktrees").join(agent_name)
}

/// `agent/<name>`
pub fn agent_branch(agent_name: &str) -> String {
    format!("agent/{}", agent_name)
}

/// Create the control directory (mode 0700 on unix) with a catch-all
/// `.gitignore`, so nothing under it is ever picked up by git.
pub fn ensure_control_dir(project_dir: &Path) -> Result<PathBuf> {
    let dir = control_dir(project_dir);
    std::fs::create_dir_all(&dir)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700))?;
    }

    let ignore = dir.join(".gitignore");
    if !ignore.exists() {
        std::fs::write(&ignore, "*\n")?;
    }
    Ok(dir)
}

/// Resolve `path` to an absolute path without requiring it to exist.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    Ok(std::path::absolute(path)?)
}

/// Reject agent names that would be unsafe in branch or path construction.
pub fn validate_agent_name(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("must not be empty")
    } else if name.starts_with('-') || name.starts_with('.') {
        Some("must not start with '-' or '.'")
    } else if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        Some("only ASCII letters, digits, '-', '_' and '.' are allowed")
    } else if name.contains("..") {
        Some("must not contain '..'")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(crate::Error::invalid("agent name", name, reason)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worktree_layout() {
        let project = Path::new("/repo");
        assert_eq!(
            worktree_dir(project, "alpha"),
            PathBuf::from("/repo/.shieldbox/worktrees/alpha")
        );
        assert_eq!(agent_branch("alpha"), "agent/alpha");
        assert_eq!(
            policy_artifact_file(project),
            PathBuf::from("/repo/.shieldbox/policy.json")
        );
    }

    #[test]
    fn test_agent_name_validation() {
        assert!(validate_agent_name("alpha").is_ok());
        assert!(validate_agent_name("agent-2_b.v1").is_ok());
        assert!(validate_agent_name("").is_err());
        assert!(validate_agent_name("-rf").is_err());
        assert!(validate_agent_name("../escape").is_err());
        assert!(validate_agent_name("a b").is_err());
        assert!(validate_agent_name("a..b").is_err());
    }

    #[test]
    fn test_control_dir_is_git_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let control = ensure_control_dir(dir.path()).unwrap();
        let ignore = std::fs::read_to_string(control.join(".gitignore")).unwrap();
        assert_eq!(ignore, "*\n");
        // idempotent
        ensure_control_dir(dir.path()).unwrap();
    }
}
