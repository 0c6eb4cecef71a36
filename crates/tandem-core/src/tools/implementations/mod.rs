//! Tool implementations
//!
//! Workspace tools (files, shell) are supplied by the embedding application.
//! The engine ships the one tool it needs to drive itself:
//! - invoke_subagents: run delegated tasks as parallel subagent loops

pub mod invoke_subagents;

pub use invoke_subagents::{InvokeSubagentsTool, INVOKE_SUBAGENTS};
