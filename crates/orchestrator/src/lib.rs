#![deny(unused)]
//! Runs several agents side by side on one project, each in its own
//! sandbox session and git worktree.

pub mod orchestrator;
pub mod worktree;

pub use orchestrator::{AgentStopReport, Orchestrator};
pub use worktree::{GitWorktrees, Worktrees};
