#![deny(unused)]
//! Core types, configuration and error definitions for Shieldbox.
//!
//! This crate provides the data model shared by every layer: sessions,
//! policy rules and results, checkpoints, audit entries, the project
//! configuration and the naming conventions that tie host and sandbox
//! together.

pub mod best_effort;
pub mod config;
pub mod error;
pub mod paths;
pub mod types;

pub use best_effort::BestEffort;
pub use config::{AuditConfig, ProjectConfig, SandboxConfig, SecretsConfig};
pub use error::{Error, Result};
pub use types::*;
