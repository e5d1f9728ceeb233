//! Mount, hardening and label assembly for session containers.

use std::collections::HashMap;
use std::path::Path;

use shieldbox_core::paths::{labels, POLICY_ARTIFACT_PATH, WORKSPACE_MOUNT};
use shieldbox_core::{SandboxConfig, Session};

use crate::runtime::{Hardening, MountSpec};

/// Capabilities kept after dropping `ALL`: enough for file ownership changes.
pub const KEPT_CAPABILITIES: &[&str] = &["CHOWN", "DAC_OVERRIDE", "FOWNER", "SETGID", "SETUID"];

/// Runtime used when gVisor isolation is requested.
pub const GVISOR_RUNTIME: &str = "runsc";

/// Workspace bind (read-write), each configured read-only path bound at the
/// same location, then the policy artifact if one was written.
pub fn build_mounts(
    workspace_root: &Path,
    config: &SandboxConfig,
    policy_artifact: Option<&Path>,
) -> Vec<MountSpec> {
    let mut mounts = vec![MountSpec::read_write(workspace_root, WORKSPACE_MOUNT)];

    mounts.extend(
        config
            .read_only
            .iter()
            .map(|path| MountSpec::read_only(path, path.clone())),
    );

    if let Some(artifact) = policy_artifact {
        mounts.push(MountSpec::read_only(artifact, POLICY_ARTIFACT_PATH));
    }
    mounts
}

pub fn build_hardening(config: &SandboxConfig) -> Hardening {
    Hardening {
        security_opt: vec!["no-new-privileges:true".to_string()],
        cap_drop: vec!["ALL".to_string()],
        cap_add: KEPT_CAPABILITIES.iter().map(|c| c.to_string()).collect(),
        network_mode: (!config.network).then(|| "none".to_string()),
        memory_bytes: config.memory_bytes(),
        nano_cpus: config.nano_cpus(),
        runtime: config.use_gvisor.then(|| GVISOR_RUNTIME.to_string()),
    }
}

/// Management labels from which a [`Session`] can be rebuilt.
pub fn session_labels(session: &Session) -> HashMap<String, String> {
    let mut map = HashMap::from([
        (labels::MANAGED.to_string(), "true".to_string()),
        (labels::SESSION.to_string(), session.id.clone()),
        (labels::AGENT.to_string(), session.agent_name.clone()),
        (
            labels::PROJECT.to_string(),
            session.project_dir.display().to_string(),
        ),
    ]);
    if let Some(worktree) = &session.worktree_dir {
        map.insert(labels::WORKTREE.to_string(), worktree.display().to_string());
    }
    map
}
