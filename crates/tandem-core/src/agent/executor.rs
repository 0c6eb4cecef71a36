//! Tool-call batches for the agentic loop.
//!
//! Calls run sequentially through the [`ToolExecutor`]; each produces exactly
//! one tool message so the history stays well-formed even when a call fails
//! or the turn is cancelled midway.

use serde_json::Value;

use crate::ai::types::{ChatMessage, ToolCallRecord, ToolResultRecord};
use crate::tools::{ToolContext, ToolExecutor};

use super::loop_events::AgentEvent;

/// Execute `calls` in order and return one tool message per call.
pub(crate) async fn execute_tool_calls(
    calls: &[ToolCallRecord],
    executor: &ToolExecutor,
    ctx: &ToolContext,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(calls.len());

    for call in calls {
        ctx.events.emit(AgentEvent::ToolCallStart {
            id: call.id.clone(),
            name: call.name.clone(),
            arguments: Value::Object(call.arguments.clone()),
        });

        let call_ctx = ctx.clone().with_tool_call_id(call.id.clone());
        let result = executor
            .execute(&call.name, call.arguments.clone(), &call_ctx)
            .await;

        messages.push(ChatMessage::tool(ToolResultRecord::for_call(
            call,
            result.to_content(),
            result.is_error(),
        )));
    }

    messages
}
