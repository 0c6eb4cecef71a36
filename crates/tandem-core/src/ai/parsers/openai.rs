//! OpenAI-compatible SSE parser
//!
//! Servers that speak this format disagree about tool-call indices. Some emit
//! every argument continuation under index 0 no matter which call it belongs
//! to, so argument fragments without an id are routed to the oldest call that
//! has not received any arguments yet instead of trusting the claimed index.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::{is_transient_message, parse_arguments, str_field, ToolCallAccumulator};
use crate::ai::client::transport::StreamFailure;
use crate::ai::sse::{SseFrame, SseHandler};
use crate::ai::types::{FinishReason, ResponseEvent, TokenUsage, ToolCallRecord};

/// OpenAI chat/completions stream parser
#[derive(Debug, Default)]
pub struct OpenAIParser {
    /// Accumulators keyed by slot index
    tool_accumulators: BTreeMap<usize, ToolCallAccumulator>,
    /// Slot indices in header arrival order
    tool_order: Vec<usize>,
    finish_reason: Option<FinishReason>,
    usage: Option<TokenUsage>,
}

impl OpenAIParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit every accumulator with both an id and a name, in arrival order,
    /// and reset tool state.
    fn drain_tool_calls(&mut self) -> Vec<ResponseEvent> {
        let mut events = Vec::new();
        for slot in std::mem::take(&mut self.tool_order) {
            let Some(acc) = self.tool_accumulators.remove(&slot) else {
                continue;
            };
            if acc.id.is_empty() || acc.name.is_empty() {
                warn!(slot, id = %acc.id, name = %acc.name, "Discarding incomplete tool call");
                continue;
            }
            if let Some(record) = acc.finish() {
                events.push(ResponseEvent::ToolCall(record));
            }
        }
        self.tool_accumulators.clear();
        events
    }

    fn done(&mut self) -> ResponseEvent {
        ResponseEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take(),
        }
    }

    fn slot_for_id(&self, id: &str) -> Option<usize> {
        self.tool_order
            .iter()
            .copied()
            .find(|slot| self.tool_accumulators.get(slot).is_some_and(|a| a.id == id))
    }

    fn next_free_slot(&self) -> usize {
        self.tool_accumulators
            .keys()
            .next_back()
            .map_or(0, |last| last + 1)
    }

    /// Route one `tool_calls[]` fragment to its accumulator
    fn route_fragment(&mut self, fragment: &Value) {
        let claimed = fragment
            .get("index")
            .and_then(Value::as_u64)
            .map(|i| i as usize);
        let id = str_field(fragment, "id").filter(|s| !s.is_empty());
        let function = fragment.get("function");
        let name = function
            .and_then(|f| str_field(f, "name"))
            .filter(|s| !s.is_empty());
        let arguments = function
            .and_then(|f| str_field(f, "arguments"))
            .unwrap_or("");

        if let Some(id) = id {
            // Some servers repeat the id on every fragment of the same call
            let slot = match self.slot_for_id(id) {
                Some(slot) => slot,
                None => {
                    let slot = match claimed {
                        Some(i) if !self.tool_accumulators.contains_key(&i) => i,
                        _ => self.next_free_slot(),
                    };
                    debug!(slot, id, "Tool call header");
                    self.tool_accumulators
                        .insert(slot, ToolCallAccumulator::new(id, name.unwrap_or("")));
                    self.tool_order.push(slot);
                    slot
                }
            };
            if let Some(acc) = self.tool_accumulators.get_mut(&slot) {
                if acc.name.is_empty() {
                    if let Some(name) = name {
                        acc.name = name.to_string();
                    }
                }
                acc.push_arguments(arguments);
            }
            return;
        }

        let Some(slot) = self.continuation_slot(claimed) else {
            warn!(?claimed, "Tool call fragment arrived before any header");
            return;
        };
        if let Some(acc) = self.tool_accumulators.get_mut(&slot) {
            if acc.name.is_empty() {
                if let Some(name) = name {
                    acc.name = name.to_string();
                }
            }
            acc.push_arguments(arguments);
        }
    }

    /// Oldest accumulator still waiting for arguments, then the claimed
    /// index, then the newest accumulator.
    fn continuation_slot(&self, claimed: Option<usize>) -> Option<usize> {
        self.tool_order
            .iter()
            .copied()
            .find(|slot| {
                self.tool_accumulators
                    .get(slot)
                    .is_some_and(|a| !a.has_arguments())
            })
            .or_else(|| claimed.filter(|i| self.tool_accumulators.contains_key(i)))
            .or_else(|| self.tool_order.last().copied())
    }

    fn parse_chunk(&mut self, json: &Value) -> Vec<ResponseEvent> {
        if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
            let message = match error {
                Value::String(s) => s.clone(),
                other => str_field(other, "message")
                    .unwrap_or("Unknown provider error")
                    .to_string(),
            };
            let code = error
                .get("code")
                .and_then(|c| match c {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .or_else(|| str_field(error, "type").map(str::to_string));
            let retryable = is_transient_message(&message)
                || code.as_deref().is_some_and(is_transient_message);
            return vec![ResponseEvent::Error {
                message,
                code,
                retryable,
            }];
        }

        if let Some(usage) = json.get("usage").filter(|u| u.is_object()) {
            self.usage = Some(parse_usage(usage));
        }

        let mut events = Vec::new();
        let Some(choice) = json
            .get("choices")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            return events;
        };

        if let Some(delta) = choice.get("delta") {
            if let Some(text) = str_field(delta, "content").filter(|t| !t.is_empty()) {
                events.push(ResponseEvent::text(text));
            }
            for fragment in delta
                .get("tool_calls")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
            {
                self.route_fragment(fragment);
            }
        }

        if let Some(reason) = str_field(choice, "finish_reason") {
            let reason = FinishReason::parse(reason);
            if reason == FinishReason::ToolCalls {
                events.extend(self.drain_tool_calls());
            }
            self.finish_reason = Some(reason);
        }
        events
    }
}

impl SseHandler for OpenAIParser {
    fn on_frame(&mut self, frame: SseFrame) -> Vec<ResponseEvent> {
        if frame.is_done_sentinel() {
            let mut events = self.drain_tool_calls();
            events.push(self.done());
            return events;
        }
        match serde_json::from_str::<Value>(&frame.data) {
            Ok(json) => self.parse_chunk(&json),
            Err(e) => {
                warn!("Dropping malformed OpenAI chunk: {} ({})", e, frame.data);
                Vec::new()
            }
        }
    }

    fn on_end(&mut self) -> Vec<ResponseEvent> {
        let mut events = self.drain_tool_calls();
        events.push(self.done());
        events
    }

    fn on_abort(&mut self, failure: StreamFailure) -> Vec<ResponseEvent> {
        // Some servers close without enumerating the final chunk; keep what we have
        let mut events = self.drain_tool_calls();
        if !events.is_empty() {
            warn!(
                count = events.len(),
                "Flushed pending tool calls before connection error"
            );
        }
        events.push(failure.into_event());
        events
    }
}

fn parse_usage(usage: &Value) -> TokenUsage {
    TokenUsage {
        input_tokens: usage
            .get("prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
        output_tokens: usage
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0),
    }
}

/// Decode a non-streaming chat/completions response
pub fn decode_completion(json: Value) -> Vec<ResponseEvent> {
    let mut parser = OpenAIParser::new();
    if json.get("error").is_some_and(|e| !e.is_null()) {
        return parser.parse_chunk(&json);
    }

    let mut events = Vec::new();
    let choice = json
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first());
    if let Some(message) = choice.and_then(|c| c.get("message")) {
        if let Some(text) = str_field(message, "content").filter(|t| !t.is_empty()) {
            events.push(ResponseEvent::text(text));
        }
        for call in message
            .get("tool_calls")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            let function = call.get("function");
            let name = function.and_then(|f| str_field(f, "name")).unwrap_or("");
            if name.trim().is_empty() {
                continue;
            }
            let raw = function
                .and_then(|f| str_field(f, "arguments"))
                .unwrap_or("");
            events.push(ResponseEvent::ToolCall(ToolCallRecord::new(
                str_field(call, "id").unwrap_or(""),
                name,
                parse_arguments(raw, name),
            )));
        }
    }

    events.push(ResponseEvent::Done {
        usage: json.get("usage").filter(|u| u.is_object()).map(parse_usage),
        finish_reason: choice
            .and_then(|c| str_field(c, "finish_reason"))
            .map(FinishReason::parse),
    });
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chunk(delta: Value, finish: Option<&str>) -> SseFrame {
        SseFrame {
            event: None,
            data: json!({"choices": [{"index": 0, "delta": delta, "finish_reason": finish}]})
                .to_string(),
        }
    }

    fn done() -> SseFrame {
        SseFrame {
            event: None,
            data: "[DONE]".to_string(),
        }
    }

    fn tool_calls(events: &[ResponseEvent]) -> Vec<&ToolCallRecord> {
        events
            .iter()
            .filter_map(|e| match e {
                ResponseEvent::ToolCall(call) => Some(call),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_standard_indexed_stream() {
        let mut parser = OpenAIParser::new();
        let mut events = Vec::new();
        events.extend(parser.on_frame(chunk(json!({"content": "Let me look."}), None)));
        events.extend(parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "id": "call_a", "type": "function", "function": {"name": "read_file", "arguments": ""}}]}),
            None,
        )));
        events.extend(parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"path\":"}}]}),
            None,
        )));
        events.extend(parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "function": {"arguments": "\"a.rs\"}"}}]}),
            None,
        )));
        events.extend(parser.on_frame(chunk(json!({}), Some("tool_calls"))));
        events.extend(parser.on_frame(done()));

        assert_eq!(events[0], ResponseEvent::text("Let me look."));
        let calls = tool_calls(&events);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments["path"], "a.rs");
        let dones = events
            .iter()
            .filter(|e| matches!(e, ResponseEvent::Done { .. }))
            .count();
        assert_eq!(dones, 1);
    }

    #[test]
    fn test_unindexed_fragments_follow_header_arrival_order() {
        let mut parser = OpenAIParser::new();
        parser.on_frame(chunk(
            json!({"tool_calls": [
                {"index": 0, "id": "call_a", "function": {"name": "read_file"}},
                {"index": 1, "id": "call_b", "function": {"name": "list_files"}}
            ]}),
            None,
        ));
        // Both continuations claim index 0
        parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"path\":\"a.rs\"}"}}]}),
            None,
        ));
        parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "function": {"arguments": "{\"dir\":\"src\"}"}}]}),
            None,
        ));
        let events = parser.on_frame(done());

        let calls = tool_calls(&events);
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments["path"], "a.rs");
        assert_eq!(calls[1].id, "call_b");
        assert_eq!(calls[1].arguments["dir"], "src");
        assert!(matches!(events.last(), Some(ResponseEvent::Done { .. })));
    }

    #[test]
    fn test_reused_header_index_gets_next_slot() {
        let mut parser = OpenAIParser::new();
        parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "id": "call_a", "function": {"name": "one", "arguments": "{}"}}]}),
            None,
        ));
        parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "id": "call_b", "function": {"name": "two", "arguments": "{}"}}]}),
            None,
        ));
        let events = parser.on_frame(chunk(json!({}), Some("tool_calls")));
        let names: Vec<_> = tool_calls(&events).iter().map(|c| c.name.clone()).collect();
        assert_eq!(names, vec!["one", "two"]);
    }

    #[test]
    fn test_abnormal_close_flushes_pending_calls() {
        let mut parser = OpenAIParser::new();
        parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 0, "id": "call_a", "function": {"name": "read_file", "arguments": "{\"path\":\"a\"}"}}]}),
            None,
        ));
        parser.on_frame(chunk(
            json!({"tool_calls": [{"index": 1, "id": "call_b", "function": {"name": "read_file", "arguments": "{\"path\":\"b\"}"}}]}),
            None,
        ));
        let events = parser.on_abort(StreamFailure::new("connection reset", "NETWORK_ERROR", true));
        assert_eq!(tool_calls(&events).len(), 2);
        assert!(matches!(
            events.last(),
            Some(ResponseEvent::Error { retryable: true, .. })
        ));
    }

    #[test]
    fn test_error_chunk_and_usage() {
        let mut parser = OpenAIParser::new();
        let events = parser.on_frame(SseFrame {
            event: None,
            data: json!({"error": {"message": "Rate limit reached", "code": 429}}).to_string(),
        });
        assert_eq!(
            events,
            vec![ResponseEvent::Error {
                message: "Rate limit reached".to_string(),
                code: Some("429".to_string()),
                retryable: true,
            }]
        );

        let mut parser = OpenAIParser::new();
        parser.on_frame(chunk(json!({"content": "hi"}), Some("stop")));
        parser.on_frame(SseFrame {
            event: None,
            data: json!({"choices": [], "usage": {"prompt_tokens": 3, "completion_tokens": 4}})
                .to_string(),
        });
        let events = parser.on_frame(done());
        assert_eq!(
            events,
            vec![ResponseEvent::Done {
                usage: Some(TokenUsage {
                    input_tokens: 3,
                    output_tokens: 4
                }),
                finish_reason: Some(FinishReason::Stop),
            }]
        );
    }

    #[test]
    fn test_decode_non_streaming_completion() {
        let events = decode_completion(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{"id": "call_1", "type": "function", "function": {"name": "list_files", "arguments": "{\"path\":\".\"}"}}]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2}
        }));
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], ResponseEvent::ToolCall(c) if c.arguments["path"] == "."));
    }
}
