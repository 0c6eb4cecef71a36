//! Tool execution pipeline
//!
//! Lookup, argument defaults, policy validation, confirmation, timed
//! execution and output capping, in that order. A tool that asks for
//! confirmation itself is re-invoked at most once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::agent::loop_events::AgentEvent;
use crate::ai::types::Arguments;
use crate::tools::confirmation::{ConfirmationRequest, RiskLevel};
use crate::tools::registry::{ErrorKind, Tool, ToolCategory, ToolContext, ToolRegistry, ToolResult};
use crate::tools::validation::{ActionValidator, AllowAll, Validation};

pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(120);
pub const MAX_TOOL_OUTPUT_CHARS: usize = 30_000;
pub const CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Metadata key set when output was cut down
pub const META_TRUNCATED: &str = "truncated";

pub struct ToolExecutor {
    registry: Arc<ToolRegistry>,
    validator: Arc<dyn ActionValidator>,
    default_timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self {
            registry,
            validator: Arc::new(AllowAll),
            default_timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_validator(mut self, validator: Arc<dyn ActionValidator>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<ToolRegistry> {
        &self.registry
    }

    /// Run one tool call end to end
    pub async fn execute(&self, name: &str, mut arguments: Arguments, ctx: &ToolContext) -> ToolResult {
        let Some(tool) = self.registry.get(name) else {
            warn!(tool = %name, "Unknown tool requested");
            return ToolResult::error(
                ErrorKind::NotFound,
                format!(
                    "Unknown tool: {}. Available: {}",
                    name,
                    self.registry.names().join(", ")
                ),
            );
        };

        if tool.category() == ToolCategory::Shell && !arguments.contains_key("working_dir") {
            if let Some(workspace) = &ctx.workspace {
                arguments.insert(
                    "working_dir".to_string(),
                    Value::String(workspace.display().to_string()),
                );
            }
        }

        let result = match self.validator.validate(name, &arguments) {
            Validation::Denied { reason } => {
                info!(tool = %name, reason = %reason, "Tool call denied by policy");
                ToolResult::error(ErrorKind::SecurityViolation, reason)
            }
            Validation::RequiresConfirmation { reason, risk } => {
                let details = describe_arguments(&arguments);
                if confirm(ctx, name, &reason, details, risk).await {
                    self.dispatch(tool.as_ref(), arguments, ctx).await
                } else {
                    ToolResult::error(
                        ErrorKind::PermissionError,
                        format!("User declined: {}", reason),
                    )
                }
            }
            Validation::Allowed => self.dispatch(tool.as_ref(), arguments, ctx).await,
        };

        ctx.events.emit(AgentEvent::ToolResult {
            id: ctx.tool_call_id.clone().unwrap_or_default(),
            name: name.to_string(),
            output: result.to_content(),
            is_error: result.is_error(),
        });
        result
    }

    /// Run a validated call, honoring a tool-requested confirmation once
    async fn dispatch(&self, tool: &dyn Tool, arguments: Arguments, ctx: &ToolContext) -> ToolResult {
        ctx.events.emit(AgentEvent::ToolExecuting {
            id: ctx.tool_call_id.clone().unwrap_or_default(),
            name: tool.name().to_string(),
        });

        let first = self.run_tool(tool, arguments.clone(), ctx).await;
        let ToolResult::RequiresConfirmation { reason, details } = first else {
            return first;
        };
        if ctx.pre_confirmed {
            return ToolResult::error(
                ErrorKind::PermissionError,
                format!("Confirmation requested again: {}", reason),
            );
        }
        if !confirm(ctx, tool.name(), &reason, details, RiskLevel::Medium).await {
            return ToolResult::error(
                ErrorKind::PermissionError,
                format!("User declined: {}", reason),
            );
        }

        let mut confirmed = ctx.clone();
        confirmed.pre_confirmed = true;
        match self.run_tool(tool, arguments, &confirmed).await {
            ToolResult::RequiresConfirmation { reason, .. } => ToolResult::error(
                ErrorKind::PermissionError,
                format!("Confirmation requested again: {}", reason),
            ),
            other => other,
        }
    }

    async fn run_tool(&self, tool: &dyn Tool, arguments: Arguments, ctx: &ToolContext) -> ToolResult {
        let timeout = tool.timeout().unwrap_or(self.default_timeout);
        let start = Instant::now();

        let result = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => ToolResult::error(ErrorKind::ExecutionError, "cancelled"),
            outcome = tokio::time::timeout(timeout, tool.execute(arguments, ctx)) => match outcome {
                Ok(result) => result,
                Err(_) => ToolResult::error(
                    ErrorKind::Timeout,
                    format!("Tool '{}' timed out after {}s", tool.name(), timeout.as_secs()),
                ),
            },
        };

        let duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(tool = %tool.name(), duration_ms, is_error = result.is_error(), "Tool finished");
        cap_output(result)
    }
}

/// Ask the context's confirmer, treating cancellation and timeout as a decline
async fn confirm(
    ctx: &ToolContext,
    tool_name: &str,
    reason: &str,
    details: String,
    risk: RiskLevel,
) -> bool {
    ctx.events.emit(AgentEvent::ConfirmationRequested {
        tool_name: tool_name.to_string(),
        reason: reason.to_string(),
        risk,
    });
    let request = ConfirmationRequest {
        tool_name: tool_name.to_string(),
        reason: reason.to_string(),
        details,
        risk,
    };

    let approved = tokio::select! {
        _ = ctx.cancel.cancelled() => false,
        answer = tokio::time::timeout(CONFIRMATION_TIMEOUT, ctx.confirmer.confirm(request)) => {
            answer.unwrap_or_else(|_| {
                warn!(tool = %tool_name, "Confirmation timed out");
                false
            })
        }
    };
    debug!(tool = %tool_name, approved, "Confirmation answered");
    approved
}

/// One `key: value` line per argument
fn describe_arguments(arguments: &Arguments) -> String {
    arguments
        .iter()
        .map(|(key, value)| match value {
            Value::String(s) => format!("{}: {}", key, s),
            other => format!("{}: {}", key, other),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn cap_output(result: ToolResult) -> ToolResult {
    match result {
        ToolResult::Success { output, mut metadata } if output.len() > MAX_TOOL_OUTPUT_CHARS => {
            metadata.insert(
                META_TRUNCATED.to_string(),
                ErrorKind::SizeLimit.as_str().to_string(),
            );
            ToolResult::Success {
                output: truncate_output(&output),
                metadata,
            }
        }
        ToolResult::Error {
            message,
            kind,
            recoverable,
        } if message.len() > MAX_TOOL_OUTPUT_CHARS => ToolResult::Error {
            message: truncate_output(&message),
            kind,
            recoverable,
        },
        other => other,
    }
}

pub(crate) fn truncate_output(output: &str) -> String {
    if output.len() <= MAX_TOOL_OUTPUT_CHARS {
        return output.to_string();
    }

    let cut = floor_char_boundary(output, MAX_TOOL_OUTPUT_CHARS);
    let head = &output[..cut];
    let clean = &output[..head.rfind('\n').unwrap_or(cut)];
    format!(
        "{}\n\n[... OUTPUT TRUNCATED: {} chars -> {} chars ...]",
        clean,
        output.len(),
        clean.len()
    )
}

fn floor_char_boundary(text: &str, index: usize) -> usize {
    let mut boundary = index.min(text.len());
    while boundary > 0 && !text.is_char_boundary(boundary) {
        boundary -= 1;
    }
    boundary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::loop_events::EventSink;
    use crate::ai::types::ParamSchema;
    use crate::tools::confirmation::{AutoApprove, AutoDecline, ChannelConfirmer};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts invocations and optionally asks for confirmation
    struct CountingTool {
        name: &'static str,
        category: ToolCategory,
        calls: Arc<AtomicUsize>,
        ask_confirmation: bool,
        always_ask: bool,
    }

    impl CountingTool {
        fn new(name: &'static str) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    name,
                    category: ToolCategory::Write,
                    calls: calls.clone(),
                    ask_confirmation: false,
                    always_ask: false,
                },
                calls,
            )
        }
    }

    #[async_trait]
    impl Tool for CountingTool {
        fn name(&self) -> &str {
            self.name
        }

        fn description(&self) -> &str {
            "Counts calls"
        }

        fn parameters(&self) -> ParamSchema {
            ParamSchema::object()
        }

        fn category(&self) -> ToolCategory {
            self.category
        }

        async fn execute(&self, arguments: Arguments, ctx: &ToolContext) -> ToolResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.always_ask || (self.ask_confirmation && !ctx.pre_confirmed) {
                return ToolResult::requires_confirmation("overwrites file", "path: a.txt");
            }
            ToolResult::success(serde_json::to_string(&arguments).unwrap_or_default())
        }
    }

    struct AskFirst;

    impl ActionValidator for AskFirst {
        fn validate(&self, _action: &str, _arguments: &Arguments) -> Validation {
            Validation::RequiresConfirmation {
                reason: "runs a command".to_string(),
                risk: RiskLevel::High,
            }
        }
    }

    struct DenyAll;

    impl ActionValidator for DenyAll {
        fn validate(&self, _action: &str, _arguments: &Arguments) -> Validation {
            Validation::Denied {
                reason: "blocked by policy".to_string(),
            }
        }
    }

    fn executor_with(tool: CountingTool) -> ToolExecutor {
        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(tool));
        ToolExecutor::new(Arc::new(registry))
    }

    #[tokio::test]
    async fn test_unknown_tool_lists_available() {
        let (tool, _) = CountingTool::new("write_file");
        let executor = executor_with(tool);
        let result = executor
            .execute("delete_everything", Arguments::new(), &ToolContext::default())
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::NotFound));
        assert!(result.to_content().contains("Available: write_file"));
    }

    #[tokio::test]
    async fn test_denied_twice_never_calls_tool() {
        let (tool, calls) = CountingTool::new("write_file");
        let executor = executor_with(tool).with_validator(Arc::new(DenyAll));
        for _ in 0..2 {
            let result = executor
                .execute("write_file", Arguments::new(), &ToolContext::default())
                .await;
            assert_eq!(result.error_kind(), Some(ErrorKind::SecurityViolation));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tool_confirmation_reinvokes_once() {
        let (mut tool, calls) = CountingTool::new("write_file");
        tool.ask_confirmation = true;
        let executor = executor_with(tool);
        let ctx = ToolContext::default().with_confirmer(Arc::new(AutoApprove));

        let result = executor.execute("write_file", Arguments::new(), &ctx).await;
        assert!(!result.is_error());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_repeated_confirmation_is_permission_error() {
        let (mut tool, calls) = CountingTool::new("write_file");
        tool.always_ask = true;
        let executor = executor_with(tool);
        let ctx = ToolContext::default().with_confirmer(Arc::new(AutoApprove));

        let result = executor.execute("write_file", Arguments::new(), &ctx).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::PermissionError));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_declined_tool_confirmation_is_permission_error() {
        let (mut tool, calls) = CountingTool::new("write_file");
        tool.ask_confirmation = true;
        let executor = executor_with(tool);
        let ctx = ToolContext::default().with_confirmer(Arc::new(AutoDecline));

        let result = executor.execute("write_file", Arguments::new(), &ctx).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::PermissionError));
        assert_eq!(result.to_content(), "Error: User declined: overwrites file");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validator_confirmation_declined() {
        let (tool, calls) = CountingTool::new("bash");
        let executor = executor_with(tool).with_validator(Arc::new(AskFirst));
        let (events, mut rx) = EventSink::channel();
        let ctx = ToolContext::default()
            .with_events(events)
            .with_tool_call_id("call_1");

        let result = executor.execute("bash", Arguments::new(), &ctx).await;
        assert_eq!(result.error_kind(), Some(ErrorKind::PermissionError));
        assert_eq!(result.to_content(), "Error: User declined: runs a command");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        match rx.recv().await.unwrap() {
            AgentEvent::ConfirmationRequested { risk, .. } => assert_eq!(risk, RiskLevel::High),
            other => panic!("unexpected event {:?}", other),
        }
        match rx.recv().await.unwrap() {
            AgentEvent::ToolResult { id, is_error, .. } => {
                assert_eq!(id, "call_1");
                assert!(is_error);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_shell_tools_get_working_dir() {
        let (mut tool, _) = CountingTool::new("bash");
        tool.category = ToolCategory::Shell;
        let executor = executor_with(tool);
        let ctx = ToolContext::default().with_workspace("/srv/project");

        let result = executor.execute("bash", Arguments::new(), &ctx).await;
        let echoed: Value = serde_json::from_str(&result.to_content()).unwrap();
        assert_eq!(echoed, json!({"working_dir": "/srv/project"}));

        let mut args = Arguments::new();
        args.insert("working_dir".to_string(), json!("/tmp"));
        let result = executor.execute("bash", args, &ctx).await;
        let echoed: Value = serde_json::from_str(&result.to_content()).unwrap();
        assert_eq!(echoed["working_dir"], "/tmp");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_tool_times_out() {
        struct Sleeper;

        #[async_trait]
        impl Tool for Sleeper {
            fn name(&self) -> &str {
                "sleep"
            }
            fn description(&self) -> &str {
                "Sleeps"
            }
            fn parameters(&self) -> ParamSchema {
                ParamSchema::object()
            }
            fn timeout(&self) -> Option<Duration> {
                Some(Duration::from_secs(5))
            }
            async fn execute(&self, _arguments: Arguments, _ctx: &ToolContext) -> ToolResult {
                tokio::time::sleep(Duration::from_secs(60)).await;
                ToolResult::success("woke")
            }
        }

        let mut registry = ToolRegistry::new();
        registry.register(Arc::new(Sleeper));
        let executor = ToolExecutor::new(Arc::new(registry));
        let result = executor
            .execute("sleep", Arguments::new(), &ToolContext::default())
            .await;
        assert_eq!(result.error_kind(), Some(ErrorKind::Timeout));
    }

    #[tokio::test]
    async fn test_cancelled_context_short_circuits() {
        let (tool, _) = CountingTool::new("write_file");
        let executor = executor_with(tool);
        let ctx = ToolContext::default();
        ctx.cancel.cancel();

        let result = executor.execute("write_file", Arguments::new(), &ctx).await;
        assert_eq!(result.to_content(), "Error: cancelled");
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_confirmation_declines() {
        let (tool, calls) = CountingTool::new("bash");
        let executor = executor_with(tool).with_validator(Arc::new(AskFirst));
        let (confirmer, mut parked) = ChannelConfirmer::new();
        let ctx = ToolContext::default().with_confirmer(Arc::new(confirmer));

        let cancel = ctx.cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            cancel.cancel();
        });

        let start = tokio::time::Instant::now();
        let result = executor.execute("bash", Arguments::new(), &ctx).await;
        assert!(start.elapsed() < CONFIRMATION_TIMEOUT);
        assert_eq!(result.error_kind(), Some(ErrorKind::PermissionError));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        // The request was delivered but never answered
        let pending = parked.try_recv().unwrap();
        assert_eq!(pending.request.tool_name, "bash");
    }

    #[tokio::test(start_paused = true)]
    async fn test_unanswered_confirmation_times_out_as_decline() {
        let (tool, calls) = CountingTool::new("bash");
        let executor = executor_with(tool).with_validator(Arc::new(AskFirst));
        let (confirmer, _parked) = ChannelConfirmer::new();
        let ctx = ToolContext::default().with_confirmer(Arc::new(confirmer));

        let start = tokio::time::Instant::now();
        let result = executor.execute("bash", Arguments::new(), &ctx).await;
        assert!(start.elapsed() >= CONFIRMATION_TIMEOUT);
        assert_eq!(result.to_content(), "Error: User declined: runs a command");
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_truncate_output_marks_size() {
        let line = "x".repeat(99) + "\n";
        let long = line.repeat(400);
        let capped = cap_output(ToolResult::success(long.clone()));
        match capped {
            ToolResult::Success { output, metadata } => {
                assert!(output.len() < long.len());
                assert!(output.contains("[... OUTPUT TRUNCATED: 40000 chars -> "));
                assert_eq!(metadata.get(META_TRUNCATED).map(String::as_str), Some("SIZE_LIMIT"));
            }
            other => panic!("unexpected result {:?}", other),
        }
        assert_eq!(truncate_output("short"), "short");
    }
}
