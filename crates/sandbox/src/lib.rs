#![deny(unused)]
//! Sandbox sessions for Shieldbox.
//!
//! Each agent works inside its own hardened container. This crate owns the
//! container lifecycle and the first layer of policy enforcement.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────┐
//! │  Orchestrator / Rollback Manager       │
//! │    ↓ sessions                          │
//! ├────────────────────────────────────────┤
//! │  SandboxEngine                         │
//! │    policy check → audit → exec         │
//! │    ↓ ContainerRuntime                  │
//! ├────────────────────────────────────────┤
//! │  DockerRuntime (bollard) / MockRuntime │
//! ├────────────────────────────────────────┤
//! │  Container                             │
//! │    /workspace  (project bind, rw)      │
//! │    /etc/shieldbox/policy.json (ro)     │
//! │    shell = shieldbox-shell             │
//! │    caps dropped, no network            │
//! └────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use shieldbox_sandbox::{DockerRuntime, SandboxEngine};
//!
//! let runtime = Arc::new(DockerRuntime::connect().await?);
//! let engine = SandboxEngine::new(runtime)
//!     .with_policy(Arc::new(PolicyEngine::from_config(&config)))
//!     .with_audit(audit);
//!
//! let session = engine.create_session(&project, &config.sandbox, "alpha", &secrets).await?;
//! let output = engine.exec_command(&session, "cargo test").await?;
//! ```

pub mod assembly;
pub mod docker;
pub mod engine;
pub mod mock;
pub mod runtime;

pub use docker::DockerRuntime;
pub use engine::{SandboxEngine, STOP_GRACE};
pub use mock::{MockContainer, MockRuntime};
pub use runtime::{
    CommitRequest, ContainerRuntime, ContainerSpec, ContainerSummary, ExecOutput, Hardening,
    MountSpec,
};
