#![deny(unused)]
//! Policy engine for Shieldbox.
//!
//! Decides whether a command or a file path is permitted inside a sandbox:
//!
//! - [`PolicyEngine::evaluate_command`]: deny-first, then allow, then
//!   default-deny.
//! - [`PolicyEngine::evaluate_file_access`]: credential files are always
//!   blocked, everything else must live under the workspace mount.
//! - [`PolicyArtifact`]: the JSON contract handed to the enforcement shell
//!   running inside the container.

pub mod artifact;
pub mod engine;
pub mod matcher;

pub use artifact::{ArtifactRule, PolicyArtifact};
pub use engine::{PolicyEngine, NOT_IN_ALLOWLIST};
pub use matcher::CommandPattern;
