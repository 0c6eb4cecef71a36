//! Parallel subagents
//!
//! - `SubagentPool` - runs up to four delegated loops concurrently
//! - `SubagentTask` / `SubagentResult` - input and outcome of one subagent
//! - `ExecutorHandle` - late-bound executor reference used by the spawning tool

mod pool;
pub mod rate_limit;
mod runner;
mod types;

pub use pool::{combined_summary, SubagentPool};
pub use rate_limit::RateLimited;
pub use types::{
    ExecutorHandle, SubagentConfig, SubagentResult, SubagentStatus, SubagentTask, SubagentUpdate,
};
