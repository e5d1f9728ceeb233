#![deny(unused)]
//! Checkpoint and rollback for Shieldbox sessions.

pub mod manager;
pub mod store;

pub use manager::{RestoreReport, RollbackManager, ROLLBACK_GRACE};
pub use store::{CheckpointIndex, CheckpointStore, JsonFileCheckpointStore, MemoryCheckpointStore};
