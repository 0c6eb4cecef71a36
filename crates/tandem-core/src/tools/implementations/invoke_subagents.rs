//! invoke_subagents tool - delegate independent tasks to parallel subagents

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use crate::agent::subagent::{
    combined_summary, ExecutorHandle, SubagentConfig, SubagentPool, SubagentTask,
};
use crate::ai::types::{Arguments, Metadata, ParamSchema};
use crate::tools::registry::{Tool, ToolCategory};
use crate::tools::{parse_params, ErrorKind, ToolContext, ToolResult};

pub const INVOKE_SUBAGENTS: &str = "invoke_subagents";

/// Ceiling for a whole batch: stagger, two attempts and their tool calls
const BATCH_TIMEOUT: Duration = Duration::from_secs(30 * 60);

pub struct InvokeSubagentsTool {
    executor: ExecutorHandle,
    config: SubagentConfig,
}

impl InvokeSubagentsTool {
    pub fn new(executor: ExecutorHandle, config: SubagentConfig) -> Self {
        Self { executor, config }
    }
}

#[derive(Deserialize)]
struct Params {
    subagents: Vec<SubagentEntry>,
}

#[derive(Deserialize)]
struct SubagentEntry {
    #[serde(default)]
    task_name: Option<String>,
    #[serde(default)]
    task: Option<String>,
}

#[async_trait]
impl Tool for InvokeSubagentsTool {
    fn name(&self) -> &str {
        INVOKE_SUBAGENTS
    }

    fn description(&self) -> &str {
        "Run up to 4 independent tasks in parallel, each handled by a subagent with access to \
         the workspace tools. Use this for research or changes that split cleanly into separate \
         pieces. Each subagent returns a summary; all summaries come back together in one result."
    }

    fn parameters(&self) -> ParamSchema {
        let subagent = ParamSchema::object()
            .property(
                "task_name",
                ParamSchema::string("Short label for this subagent"),
                false,
            )
            .property(
                "task",
                ParamSchema::string("Complete, self-contained instructions for the subagent"),
                true,
            );
        ParamSchema::object().property(
            "subagents",
            ParamSchema::array("Tasks to run in parallel (max 4)", subagent),
            true,
        )
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::Orchestration
    }

    fn timeout(&self) -> Option<Duration> {
        Some(BATCH_TIMEOUT)
    }

    async fn execute(&self, arguments: Arguments, ctx: &ToolContext) -> ToolResult {
        if ctx.nested {
            return ToolResult::invalid_parameters("Subagents cannot invoke further subagents");
        }
        let params = match parse_params::<Params>(&arguments) {
            Ok(p) => p,
            Err(e) => return e,
        };
        let mut entries = params.subagents;
        if entries.is_empty() {
            return ToolResult::invalid_parameters("Subagents list is empty.");
        }
        // Entries past the limit are ignored, not validated
        if entries.len() > self.config.max_subagents {
            warn!(
                requested = entries.len(),
                max = self.config.max_subagents,
                "Ignoring subagents beyond the limit"
            );
            entries.truncate(self.config.max_subagents);
        }

        let mut tasks = Vec::with_capacity(entries.len());
        for (index, entry) in entries.into_iter().enumerate() {
            let Some(task) = entry.task.filter(|t| !t.trim().is_empty()) else {
                return ToolResult::invalid_parameters(format!(
                    "Subagent at index {} is missing the 'task' field.",
                    index
                ));
            };
            let name = entry
                .task_name
                .filter(|n| !n.trim().is_empty())
                .unwrap_or_else(|| format!("Subagent {}", index + 1));
            tasks.push(SubagentTask::new(name, task));
        }

        let Some(executor) = self.executor.get() else {
            return ToolResult::error(
                ErrorKind::ConfigurationError,
                "Tool executor is not available for subagents",
            );
        };
        let Some(selection) = ctx.model.clone() else {
            return ToolResult::error(
                ErrorKind::ConfigurationError,
                "No model selected for subagents",
            );
        };

        let results = SubagentPool::new(executor, self.config.clone())
            .run(selection, tasks, ctx)
            .await;

        let failed = results.iter().filter(|r| !r.success).count();
        let mut metadata = Metadata::new();
        metadata.insert("subagents".to_string(), results.len().to_string());
        metadata.insert("failed".to_string(), failed.to_string());
        ToolResult::success_with(combined_summary(&results), metadata)
    }
}
