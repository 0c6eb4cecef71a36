//! A single subagent: staggered start, bounded tool loop, one rate-limit retry

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::agent::executor::execute_tool_calls;
use crate::agent::loop_events::{AgentEvent, EventSink};
use crate::agent::stream::process_stream;
use crate::ai::providers::ModelSelection;
use crate::ai::types::ChatMessage;
use crate::tools::implementations::INVOKE_SUBAGENTS;
use crate::tools::{AutoDecline, ToolContext, ToolExecutor};

use super::rate_limit::{self, RateLimited};
use super::types::{SubagentConfig, SubagentResult, SubagentStatus, SubagentTask, SubagentUpdate};

const NO_OUTPUT: &str = "No output.";

const SUBAGENT_PROMPT: &str = "You are a subagent: a focused assistant with a single task to complete.
You have access to the same workspace tools as the primary agent.
Complete your task thoroughly and finish with a clear, structured summary of what you found or did.
Your final message is returned to the primary agent as your result.";

const RETRY_NOTE: &str = "NOTE: This is a retry after a rate limit error. Keep tool use to what the task needs.";

pub(crate) fn system_prompt(retry: bool) -> String {
    if retry {
        format!("{}\n\n{}", SUBAGENT_PROMPT, RETRY_NOTE)
    } else {
        SUBAGENT_PROMPT.to_string()
    }
}

enum LoopFailure {
    RateLimited(RateLimited),
    Failed(String),
}

impl LoopFailure {
    fn message(&self) -> &str {
        match self {
            LoopFailure::RateLimited(limited) => &limited.message,
            LoopFailure::Failed(message) => message,
        }
    }
}

/// Everything a subagent shares with its siblings
pub(crate) struct SubagentRunner {
    pub executor: Arc<ToolExecutor>,
    pub selection: ModelSelection,
    pub config: SubagentConfig,
    /// Parent's sink; only status updates go here
    pub events: EventSink,
    pub parent_tool_call_id: Option<String>,
    pub workspace: Option<PathBuf>,
    pub cancel: CancellationToken,
}

impl SubagentRunner {
    pub(crate) fn report(
        &self,
        index: usize,
        task: &SubagentTask,
        status: SubagentStatus,
        result: Option<String>,
    ) {
        self.events.emit(AgentEvent::SubagentUpdate(SubagentUpdate {
            parent_tool_call_id: self.parent_tool_call_id.clone(),
            index,
            task_name: task.name.clone(),
            prompt: task.prompt.clone(),
            status,
            result,
        }));
    }

    /// Run task `index` to completion. Never fails; errors become the summary.
    pub(crate) async fn run(&self, index: usize, task: SubagentTask) -> SubagentResult {
        let delay = self.config.stagger * index as u32;
        if !delay.is_zero() {
            tokio::select! {
                _ = self.cancel.cancelled() => {}
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.report(index, &task, SubagentStatus::Running, None);
        let start = Instant::now();
        info!(subagent = %task.name, index, "Subagent started");

        let mut retried = false;
        let outcome = match self.run_loop(&task, false).await {
            Err(LoopFailure::RateLimited(limited)) => {
                retried = true;
                warn!(
                    subagent = %task.name,
                    wait_secs = limited.retry_after.as_secs(),
                    "Subagent rate limited, retrying once"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => {}
                    _ = tokio::time::sleep(limited.retry_after) => {}
                }
                self.run_loop(&task, true).await.map_err(|e| {
                    format!("[RATE LIMITED] Subagent failed after retry: {}", e.message())
                })
            }
            Err(failure) => Err(format!("[ERROR] {}", failure.message())),
            Ok(summary) => Ok(summary),
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        let (summary, success) = match outcome {
            Ok(summary) => (summary, true),
            Err(summary) => (summary, false),
        };
        info!(subagent = %task.name, index, success, duration_ms, "Subagent finished");

        let status = if success {
            SubagentStatus::Succeeded
        } else {
            SubagentStatus::Failed
        };
        self.report(index, &task, status, Some(summary.clone()));

        SubagentResult {
            index,
            task_name: task.name,
            summary,
            success,
            retried,
            duration_ms,
        }
    }

    async fn run_loop(&self, task: &SubagentTask, retry: bool) -> Result<String, LoopFailure> {
        let tools = self
            .executor
            .registry()
            .definitions_excluding(&[INVOKE_SUBAGENTS]);
        let ctx = ToolContext {
            workspace: self.workspace.clone(),
            confirmer: Arc::new(AutoDecline),
            cancel: self.cancel.clone(),
            model: Some(self.selection.clone()),
            ..ToolContext::default()
        }
        .nested();
        let quiet = EventSink::disabled();

        let mut messages = vec![ChatMessage::user(task.prompt.clone())];
        let mut transcript = String::new();

        for iteration in 1..=self.config.max_iterations {
            let request = self
                .selection
                .request(messages.clone())
                .with_system_prompt(system_prompt(retry))
                .with_tools(tools.clone());
            let result = process_stream(self.selection.provider.chat(request), &quiet, &self.cancel).await;

            if result.cancelled {
                return Err(LoopFailure::Failed("cancelled".to_string()));
            }
            if let Some(error) = result.error {
                return Err(match rate_limit::detect(&error.message, &self.config) {
                    Some(limited) => LoopFailure::RateLimited(limited),
                    None => LoopFailure::Failed(error.message),
                });
            }

            if result.tool_calls.is_empty() {
                transcript.push_str(&result.text);
                break;
            }

            if !result.text.trim().is_empty() {
                transcript.push_str(&result.text);
                transcript.push('\n');
            }
            debug!(
                subagent = %task.name,
                iteration,
                tools = result.tool_calls.len(),
                "Subagent executing tools"
            );
            messages.push(ChatMessage::assistant(
                Some(result.text),
                result.tool_calls.clone(),
            ));
            messages.extend(execute_tool_calls(&result.tool_calls, &self.executor, &ctx).await);
        }

        let summary = transcript.trim();
        Ok(if summary.is_empty() {
            NO_OUTPUT.to_string()
        } else {
            summary.to_string()
        })
    }
}
