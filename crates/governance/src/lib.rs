#![deny(unused)]
//! Governance for Shieldbox.
//!
//! This crate provides:
//! - Audit sinks (JSONL files, in-memory)
//! - Secret providers (environment, 1Password, Vault)
//! - Tracing subscriber setup
//! - Metrics helpers

pub mod audit;
pub mod metrics;
pub mod secrets;
pub mod tracing_layer;

pub use audit::{AuditFilter, AuditSink, FileAuditLog, InMemoryAuditLog};
pub use metrics::{track_checkpoint_event, track_policy_decision, track_session_event, DecisionKind};
pub use secrets::{load_secrets, SecretMap, SecretProvider};
pub use tracing_layer::configure_tracing;
