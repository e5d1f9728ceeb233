//! Container-control capability.
//!
//! Everything the supervisor asks of the container daemon goes through
//! [`ContainerRuntime`]. [`crate::DockerRuntime`] talks to a real daemon;
//! [`crate::MockRuntime`] keeps containers in memory for tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use shieldbox_core::Result;

// =============================================================================
// Container Specification
// =============================================================================

/// A bind mount from the host into the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountSpec {
    pub source: PathBuf,
    pub target: String,
    pub read_only: bool,
}

impl MountSpec {
    pub fn read_write(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: false,
        }
    }

    pub fn read_only(source: impl Into<PathBuf>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            read_only: true,
        }
    }
}

/// Security and resource settings applied to the container's host config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hardening {
    pub security_opt: Vec<String>,
    pub cap_drop: Vec<String>,
    pub cap_add: Vec<String>,
    /// `Some("none")` disables networking.
    pub network_mode: Option<String>,
    pub memory_bytes: Option<i64>,
    pub nano_cpus: Option<i64>,
    /// Alternate low-level runtime, e.g. `runsc`.
    pub runtime: Option<String>,
}

/// Everything needed to create one container.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ContainerSpec {
    pub image: String,
    pub labels: HashMap<String, String>,
    /// `KEY=value` pairs. May carry secrets; redacted from `Debug`.
    pub env: Vec<String>,
    /// `None` keeps the image's own command.
    pub cmd: Option<Vec<String>>,
    pub working_dir: String,
    pub mounts: Vec<MountSpec>,
    pub hardening: Hardening,
    pub tty: bool,
    pub open_stdin: bool,
}

impl std::fmt::Debug for ContainerSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let env_keys: Vec<&str> = self
            .env
            .iter()
            .map(|kv| kv.split_once('=').map_or(kv.as_str(), |(k, _)| k))
            .collect();
        f.debug_struct("ContainerSpec")
            .field("image", &self.image)
            .field("labels", &self.labels)
            .field("env", &env_keys)
            .field("cmd", &self.cmd)
            .field("working_dir", &self.working_dir)
            .field("mounts", &self.mounts)
            .field("hardening", &self.hardening)
            .field("tty", &self.tty)
            .field("open_stdin", &self.open_stdin)
            .finish()
    }
}

// =============================================================================
// Runtime Results
// =============================================================================

/// Captured result of a command executed inside a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

impl ExecOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// One entry of the daemon's container listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    pub id: String,
    pub labels: HashMap<String, String>,
    /// Daemon state string (`running`, `exited`, `paused`, ...).
    pub state: String,
    /// Creation time, unix seconds.
    pub created: i64,
}

/// Parameters for snapshotting a container into an image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRequest {
    pub repo: String,
    pub tag: String,
    pub comment: String,
    /// Pause the container for the duration of the commit.
    pub pause: bool,
}

impl CommitRequest {
    /// `repo:tag`
    pub fn reference(&self) -> String {
        format!("{}:{}", self.repo, self.tag)
    }
}

// =============================================================================
// Container Runtime Trait
// =============================================================================

/// Operations the supervisor needs from a container daemon.
///
/// All calls are blocking daemon round-trips from the caller's point of view;
/// implementations must be shareable across tasks.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Check the daemon is reachable.
    async fn ping(&self) -> Result<()>;

    /// Whether `image` is present locally.
    async fn image_exists(&self, image: &str) -> Result<bool>;

    /// Pull `image` from its registry.
    async fn pull_image(&self, image: &str) -> Result<()>;

    /// Create a container, returning its id. `name` is optional.
    async fn create_container(&self, name: Option<&str>, spec: &ContainerSpec) -> Result<String>;

    async fn start_container(&self, id: &str) -> Result<()>;

    /// Stop gracefully, killing after `grace`.
    async fn stop_container(&self, id: &str, grace: Duration) -> Result<()>;

    async fn remove_container(&self, id: &str) -> Result<()>;

    /// Run `cmd` in a running container and capture its output.
    async fn exec(&self, id: &str, cmd: &[String], working_dir: &str) -> Result<ExecOutput>;

    /// Every container (running or not) carrying label `key=value`.
    async fn list_containers(&self, label: (&str, &str)) -> Result<Vec<ContainerSummary>>;

    /// Commit the container to a new image, returning the image reference.
    async fn commit_container(&self, id: &str, request: &CommitRequest) -> Result<String>;
}
