//! Subagent types and data structures
//!
//! Core types for subagent configuration, progress tracking, and results.

use once_cell::sync::OnceCell;
use serde::Serialize;
use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::tools::ToolExecutor;

pub const DEFAULT_MAX_SUBAGENTS: usize = 4;
pub const DEFAULT_STAGGER: Duration = Duration::from_millis(2_000);
pub const DEFAULT_SUBAGENT_ITERATIONS: usize = 8;
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(10);
pub const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// One delegated task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubagentTask {
    /// Display name (e.g. "Subagent 2" when the model gave none)
    pub name: String,
    pub prompt: String,
}

impl SubagentTask {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

/// Status of a subagent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// Progress report for one subagent, keyed by its index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubagentUpdate {
    pub parent_tool_call_id: Option<String>,
    pub index: usize,
    pub task_name: String,
    pub prompt: String,
    pub status: SubagentStatus,
    /// Summary, present once the subagent finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
}

/// Result from a subagent execution
#[derive(Debug, Clone, PartialEq)]
pub struct SubagentResult {
    pub index: usize,
    pub task_name: String,
    pub summary: String,
    pub success: bool,
    /// Whether the rate-limit retry was used
    pub retried: bool,
    pub duration_ms: u64,
}

#[derive(Debug, Clone)]
pub struct SubagentConfig {
    pub max_subagents: usize,
    /// Subagent `i` starts after `i * stagger`
    pub stagger: Duration,
    pub max_iterations: usize,
    /// Wait used when a rate-limit error names no retry-after
    pub default_retry_after: Duration,
    pub max_retry_after: Duration,
}

impl Default for SubagentConfig {
    fn default() -> Self {
        Self {
            max_subagents: DEFAULT_MAX_SUBAGENTS,
            stagger: DEFAULT_STAGGER,
            max_iterations: DEFAULT_SUBAGENT_ITERATIONS,
            default_retry_after: DEFAULT_RETRY_AFTER,
            max_retry_after: MAX_RETRY_AFTER,
        }
    }
}

/// Late-bound reference to the executor.
///
/// The executor owns the registry, which owns the subagent tool, which needs
/// the executor. The tool holds this handle and it is bound once the executor
/// exists; a dropped executor reads as unbound.
#[derive(Debug, Clone, Default)]
pub struct ExecutorHandle {
    slot: Arc<OnceCell<Weak<ToolExecutor>>>,
}

impl ExecutorHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the handle was already bound
    pub fn bind(&self, executor: &Arc<ToolExecutor>) -> bool {
        self.slot.set(Arc::downgrade(executor)).is_ok()
    }

    pub fn get(&self) -> Option<Arc<ToolExecutor>> {
        self.slot.get().and_then(Weak::upgrade)
    }
}
