//! Core type definitions for Shieldbox.
//!
//! Shared data model used by the policy, sandbox, rollback and
//! orchestration layers.

pub mod audit;
pub mod checkpoint;
pub mod policy;
pub mod session;

pub use audit::*;
pub use checkpoint::*;
pub use policy::*;
pub use session::*;
