//! Agentic orchestrator - the primary chat loop.
//!
//! `AgenticOrchestrator::run()` spawns one turn: stream a reply, execute the
//! tool calls it asks for, feed the results back, repeat until the model
//! answers without tools. Front ends consume the returned `AgentEvent`
//! receiver; `Done` is always the last event and carries the final history.
//!
//! ```text
//!  ┌──────────────┐      AgentEvent      ┌──────────────┐
//!  │ Orchestrator │ ───────────────────► │   Consumer   │
//!  │    (core)    │                      │  (CLI / UI)  │
//!  └──────────────┘                      └──────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::ai::providers::ModelSelection;
use crate::ai::types::ChatMessage;
use crate::tools::implementations::InvokeSubagentsTool;
use crate::tools::{ActionValidator, Confirmer, ToolContext, ToolExecutor, ToolRegistry};

use super::executor::execute_tool_calls;
use super::loop_events::{AgentEvent, EventSink};
use super::stream::process_stream;
use super::subagent::{ExecutorHandle, SubagentConfig};

pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Configuration for an orchestrator run.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_iterations: usize,
    pub system_prompt: Option<String>,
    /// Workspace handed to tools
    pub workspace: Option<PathBuf>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            system_prompt: None,
            workspace: None,
        }
    }
}

/// The agentic orchestrator — runs the complete agent loop.
#[derive(Clone)]
pub struct AgenticOrchestrator {
    executor: Arc<ToolExecutor>,
    config: OrchestratorConfig,
}

impl AgenticOrchestrator {
    pub fn new(executor: Arc<ToolExecutor>, config: OrchestratorConfig) -> Self {
        Self { executor, config }
    }

    /// Wire `registry` together with the `invoke_subagents` tool and an
    /// executor that both the loop and the subagents share.
    pub fn with_subagents(
        mut registry: ToolRegistry,
        validator: Arc<dyn ActionValidator>,
        tool_timeout: Duration,
        subagents: SubagentConfig,
        config: OrchestratorConfig,
    ) -> Self {
        let handle = ExecutorHandle::new();
        registry.register(Arc::new(InvokeSubagentsTool::new(handle.clone(), subagents)));

        let executor = Arc::new(
            ToolExecutor::new(Arc::new(registry))
                .with_validator(validator)
                .with_default_timeout(tool_timeout),
        );
        handle.bind(&executor);
        Self::new(executor, config)
    }

    pub fn executor(&self) -> &Arc<ToolExecutor> {
        &self.executor
    }

    /// Start one turn.
    ///
    /// The loop runs as a spawned tokio task and stops promptly once `cancel`
    /// fires.
    pub fn run(
        &self,
        selection: ModelSelection,
        history: Vec<ChatMessage>,
        user_message: impl Into<String>,
        confirmer: Arc<dyn Confirmer>,
        cancel: CancellationToken,
    ) -> mpsc::UnboundedReceiver<AgentEvent> {
        let (events, event_rx) = EventSink::channel();
        let this = self.clone();
        let user_message = user_message.into();

        tokio::spawn(async move {
            let history = this
                .run_inner(selection, history, user_message, confirmer, &events, cancel)
                .await;
            events.emit(AgentEvent::Done { history });
        });

        event_rx
    }

    async fn run_inner(
        &self,
        selection: ModelSelection,
        mut history: Vec<ChatMessage>,
        user_message: String,
        confirmer: Arc<dyn Confirmer>,
        events: &EventSink,
        cancel: CancellationToken,
    ) -> Vec<ChatMessage> {
        history.push(ChatMessage::user(user_message));

        let tools = self.executor.registry().definitions();
        let ctx = ToolContext {
            workspace: self.config.workspace.clone(),
            confirmer,
            events: events.clone(),
            cancel: cancel.clone(),
            model: Some(selection.clone()),
            ..ToolContext::default()
        };

        let mut iteration = 0;
        loop {
            iteration += 1;
            if iteration > self.config.max_iterations {
                warn!(max = self.config.max_iterations, "Iteration limit hit");
                events.emit(AgentEvent::Error {
                    message: "Maximum iterations reached".to_string(),
                    retryable: false,
                });
                break;
            }
            if iteration > 1 {
                events.emit(AgentEvent::NewIteration { iteration });
            }

            let mut request = selection.request(history.clone()).with_tools(tools.clone());
            if let Some(prompt) = &self.config.system_prompt {
                request = request.with_system_prompt(prompt.clone());
            }
            let result = process_stream(selection.provider.chat(request), events, &cancel).await;

            if result.cancelled {
                emit_cancelled(events);
                break;
            }
            if let Some(error) = result.error {
                warn!(error = %error.message, code = ?error.code, "Provider stream failed");
                events.emit(AgentEvent::Error {
                    message: error.message,
                    retryable: error.retryable,
                });
                break;
            }

            if result.tool_calls.is_empty() {
                if !result.text.is_empty() {
                    history.push(ChatMessage::assistant(Some(result.text), Vec::new()));
                }
                info!(iteration, finish_reason = ?result.finish_reason, "Turn complete");
                break;
            }

            history.push(ChatMessage::assistant(
                Some(result.text),
                result.tool_calls.clone(),
            ));
            history.extend(execute_tool_calls(&result.tool_calls, &self.executor, &ctx).await);

            if cancel.is_cancelled() {
                emit_cancelled(events);
                break;
            }
        }

        history
    }
}

fn emit_cancelled(events: &EventSink) {
    info!("Turn cancelled");
    events.emit(AgentEvent::Error {
        message: "Cancelled".to_string(),
        retryable: false,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::test_support::ScriptedProvider;
    use crate::ai::types::{Arguments, ResponseEvent, Role, ToolCallRecord};
    use crate::tools::{AllowAll, AutoApprove};
    use futures::stream;
    use serde_json::json;

    fn done() -> ResponseEvent {
        ResponseEvent::Done {
            usage: None,
            finish_reason: None,
        }
    }

    fn orchestrator(max_iterations: usize) -> AgenticOrchestrator {
        AgenticOrchestrator::with_subagents(
            ToolRegistry::new(),
            Arc::new(AllowAll),
            Duration::from_secs(120),
            SubagentConfig::default(),
            OrchestratorConfig {
                max_iterations,
                ..Default::default()
            },
        )
    }

    async fn collect(mut rx: mpsc::UnboundedReceiver<AgentEvent>) -> Vec<AgentEvent> {
        let mut out = Vec::new();
        while let Some(event) = rx.recv().await {
            out.push(event);
        }
        out
    }

    #[tokio::test]
    async fn test_plain_reply_ends_with_done() {
        let provider = ScriptedProvider::new(vec![vec![ResponseEvent::text("Hi there"), done()]]);
        let rx = orchestrator(10).run(
            ModelSelection::new(provider, "m"),
            Vec::new(),
            "hello",
            Arc::new(AutoApprove),
            CancellationToken::new(),
        );
        let events = collect(rx).await;

        assert!(matches!(events[0], AgentEvent::TextDelta { ref delta } if delta == "Hi there"));
        match events.last().unwrap() {
            AgentEvent::Done { history } => {
                assert_eq!(history.len(), 2);
                assert_eq!(history[1].role(), Role::Assistant);
                assert_eq!(history[1].content(), Some("Hi there"));
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_tool_round_trip_then_answer() {
        let provider = ScriptedProvider::new(vec![
            vec![
                ResponseEvent::ToolCall(ToolCallRecord::new("c1", "missing_tool", Arguments::new())),
                done(),
            ],
            vec![ResponseEvent::text("Sorry, that tool is unavailable."), done()],
        ]);
        let rx = orchestrator(10).run(
            ModelSelection::new(provider.clone(), "m"),
            Vec::new(),
            "do it",
            Arc::new(AutoApprove),
            CancellationToken::new(),
        );
        let events = collect(rx).await;

        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::ToolCallStart { id, .. } if id == "c1")));
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::NewIteration { iteration: 2 })));
        let history = match events.last().unwrap() {
            AgentEvent::Done { history } => history.clone(),
            other => panic!("unexpected event {:?}", other),
        };
        let roles: Vec<Role> = history.iter().map(|m| m.role()).collect();
        assert_eq!(
            roles,
            vec![Role::User, Role::Assistant, Role::Tool, Role::Assistant]
        );

        let second = &provider.requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert!(second.tools.iter().any(|t| t.name == "invoke_subagents"));
    }

    #[tokio::test]
    async fn test_iteration_limit() {
        let provider = ScriptedProvider::repeating(vec![
            ResponseEvent::ToolCall(ToolCallRecord::new("c", "missing_tool", Arguments::new())),
            done(),
        ]);
        let rx = orchestrator(2).run(
            ModelSelection::new(provider.clone(), "m"),
            Vec::new(),
            "loop",
            Arc::new(AutoApprove),
            CancellationToken::new(),
        );
        let events = collect(rx).await;

        let n = events.len();
        assert!(matches!(
            &events[n - 2],
            AgentEvent::Error { message, .. } if message == "Maximum iterations reached"
        ));
        assert!(matches!(events[n - 1], AgentEvent::Done { .. }));
        assert_eq!(provider.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_stream_error_ends_turn() {
        let provider = ScriptedProvider::new(vec![vec![ResponseEvent::error(
            "API error 503: unavailable",
            Some("HTTP_503"),
            true,
        )]]);
        let rx = orchestrator(10).run(
            ModelSelection::new(provider, "m"),
            vec![ChatMessage::system("be brief")],
            "hello",
            Arc::new(AutoApprove),
            CancellationToken::new(),
        );
        let events = collect(rx).await;
        assert!(matches!(
            &events[0],
            AgentEvent::Error { retryable: true, .. }
        ));
        assert!(matches!(&events[1], AgentEvent::Done { history } if history.len() == 2));
    }

    #[tokio::test]
    async fn test_cancel_emits_cancelled_then_done() {
        let provider = ScriptedProvider::with_stream(|| stream::pending::<ResponseEvent>());
        let cancel = CancellationToken::new();
        let rx = orchestrator(10).run(
            ModelSelection::new(provider, "m"),
            Vec::new(),
            "wait forever",
            Arc::new(AutoApprove),
            cancel.clone(),
        );
        cancel.cancel();
        let events = collect(rx).await;
        assert_eq!(events.len(), 2);
        assert_eq!(
            serde_json::to_value(&events[0]).unwrap(),
            json!({"type": "error", "message": "Cancelled", "retryable": false})
        );
    }
}
