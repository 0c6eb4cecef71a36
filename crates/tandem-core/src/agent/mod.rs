//! Agent system
//!
//! ## Orchestrator (the primary chat loop)
//! - `AgenticOrchestrator` - streaming, tool execution, iteration limit
//! - `AgentEvent` / `EventSink` - event protocol between the loop and consumers
//!
//! ## Sub-agents
//! - `SubagentPool` - parallel, staggered subagent loops with rate-limit retry
//! - `SubagentTask` - task configuration for sub-agents

pub mod executor;
pub mod loop_events;
pub mod orchestrator;
pub mod stream;
pub mod subagent;

pub use loop_events::{AgentEvent, EventSink};
pub use orchestrator::{AgenticOrchestrator, OrchestratorConfig, DEFAULT_MAX_ITERATIONS};
pub use subagent::{
    ExecutorHandle, SubagentConfig, SubagentPool, SubagentResult, SubagentStatus, SubagentTask,
    SubagentUpdate,
};
