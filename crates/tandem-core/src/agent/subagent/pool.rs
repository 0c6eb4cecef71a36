//! Concurrent subagent execution
//!
//! All subagents of one call run as futures joined inside the calling tool,
//! so dropping the tool call drops every subagent with it.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{info, warn};

use crate::ai::providers::ModelSelection;
use crate::tools::{ToolContext, ToolExecutor};

use super::runner::SubagentRunner;
use super::types::{SubagentConfig, SubagentResult, SubagentStatus, SubagentTask};

pub struct SubagentPool {
    executor: Arc<ToolExecutor>,
    config: SubagentConfig,
}

impl SubagentPool {
    pub fn new(executor: Arc<ToolExecutor>, config: SubagentConfig) -> Self {
        Self { executor, config }
    }

    /// Run `tasks` in parallel with staggered starts; results come back in
    /// task order. Tasks beyond `max_subagents` are dropped.
    pub async fn run(
        &self,
        selection: ModelSelection,
        mut tasks: Vec<SubagentTask>,
        parent: &ToolContext,
    ) -> Vec<SubagentResult> {
        if tasks.len() > self.config.max_subagents {
            warn!(
                requested = tasks.len(),
                max = self.config.max_subagents,
                "Ignoring subagents beyond the limit"
            );
            tasks.truncate(self.config.max_subagents);
        }

        let runner = SubagentRunner {
            executor: self.executor.clone(),
            selection,
            config: self.config.clone(),
            events: parent.events.clone(),
            parent_tool_call_id: parent.tool_call_id.clone(),
            workspace: parent.workspace.clone(),
            cancel: parent.cancel.child_token(),
        };

        for (index, task) in tasks.iter().enumerate() {
            runner.report(index, task, SubagentStatus::Pending, None);
        }

        info!(count = tasks.len(), "Launching subagents");
        let runner = &runner;
        join_all(
            tasks
                .into_iter()
                .enumerate()
                .map(|(index, task)| runner.run(index, task)),
        )
        .await
    }
}

/// Result block handed back to the primary model
pub fn combined_summary(results: &[SubagentResult]) -> String {
    let mut out = format!(
        "=== SUBAGENT RESULTS ({} agents ran in parallel) ===\n\n",
        results.len()
    );
    for result in results {
        out.push_str(&format!("--- [{}] ---\n{}\n\n", result.task_name, result.summary));
    }
    out.push_str("=== END OF SUBAGENT RESULTS ===\n");
    out
}
