//! Stream processing for agent loops.
//!
//! Drains one adapter stream, accumulating text and tool calls and forwarding
//! text deltas as they arrive. Cancellation drops the stream, which closes
//! the connection.

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::ai::client::ResponseStream;
use crate::ai::types::{FinishReason, ResponseEvent, TokenUsage, ToolCallRecord};

use super::loop_events::{AgentEvent, EventSink};

/// Terminal error reported by the adapter
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct StreamError {
    pub message: String,
    pub code: Option<String>,
    pub retryable: bool,
}

/// Result of processing a complete stream.
#[derive(Debug, Default)]
pub(crate) struct StreamResult {
    pub text: String,
    pub tool_calls: Vec<ToolCallRecord>,
    pub usage: Option<TokenUsage>,
    pub finish_reason: Option<FinishReason>,
    pub error: Option<StreamError>,
    pub cancelled: bool,
}

/// Consume `stream` until its terminal event or until `cancel` fires.
pub(crate) async fn process_stream(
    mut stream: ResponseStream,
    events: &EventSink,
    cancel: &CancellationToken,
) -> StreamResult {
    let mut result = StreamResult::default();

    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                result.cancelled = true;
                break;
            }
            event = stream.next() => event,
        };

        match event {
            Some(ResponseEvent::TextDelta { text, .. }) => {
                if !text.is_empty() {
                    events.emit(AgentEvent::TextDelta {
                        delta: text.clone(),
                    });
                    result.text.push_str(&text);
                }
            }
            Some(ResponseEvent::ToolCall(call)) => {
                debug!(tool = %call.name, id = %call.id, "Tool call received");
                result.tool_calls.push(call);
            }
            Some(ResponseEvent::Done {
                usage,
                finish_reason,
            }) => {
                result.usage = usage;
                result.finish_reason = finish_reason;
                break;
            }
            Some(ResponseEvent::Error {
                message,
                code,
                retryable,
            }) => {
                result.error = Some(StreamError {
                    message,
                    code,
                    retryable,
                });
                break;
            }
            None => break,
        }
    }

    if let Some(usage) = result.usage {
        events.emit(AgentEvent::Usage {
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
        });
    }
    result
}
