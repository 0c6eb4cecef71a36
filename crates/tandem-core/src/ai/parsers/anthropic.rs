//! Anthropic-specific SSE parser

use std::collections::HashMap;

use serde_json::Value;
use tracing::{debug, warn};

use super::{parse_arguments, str_field, ToolCallAccumulator};
use crate::ai::client::transport::StreamFailure;
use crate::ai::sse::{SseFrame, SseHandler};
use crate::ai::types::{FinishReason, ResponseEvent, TokenUsage, ToolCallRecord};

/// Error types Anthropic documents as transient
const RETRYABLE_ERROR_TYPES: &[&str] = &["overloaded_error", "rate_limit_error", "api_error"];

/// Anthropic-specific SSE parser
#[derive(Debug, Default)]
pub struct AnthropicParser {
    /// Track tool calls by content block index
    tool_accumulators: HashMap<usize, ToolCallAccumulator>,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
}

impl AnthropicParser {
    pub fn new() -> Self {
        Self::default()
    }

    fn done(&mut self) -> ResponseEvent {
        ResponseEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take(),
        }
    }

    fn parse_event(&mut self, json: &Value) -> Vec<ResponseEvent> {
        let event_type = str_field(json, "type").unwrap_or("");
        let index = json.get("index").and_then(Value::as_u64).unwrap_or(0) as usize;

        match event_type {
            "message_start" => {
                if let Some(usage) = json.get("message").and_then(|m| m.get("usage")) {
                    let entry = self.usage.get_or_insert_with(TokenUsage::default);
                    entry.input_tokens = token_count(usage, "input_tokens");
                    entry.output_tokens = token_count(usage, "output_tokens");
                }
                Vec::new()
            }
            "content_block_start" => {
                let Some(block) = json.get("content_block") else {
                    return Vec::new();
                };
                match str_field(block, "type") {
                    Some("tool_use") => {
                        let id = str_field(block, "id").unwrap_or("");
                        let name = str_field(block, "name").unwrap_or("");
                        debug!(index, id, name, "Tool use block started");
                        self.tool_accumulators
                            .insert(index, ToolCallAccumulator::new(id, name));
                        Vec::new()
                    }
                    Some("text") => match str_field(block, "text") {
                        Some(text) if !text.is_empty() => vec![ResponseEvent::text(text)],
                        _ => Vec::new(),
                    },
                    _ => Vec::new(),
                }
            }
            "content_block_delta" => {
                let Some(delta) = json.get("delta") else {
                    return Vec::new();
                };
                match str_field(delta, "type") {
                    Some("text_delta") => match str_field(delta, "text") {
                        Some(text) if !text.is_empty() => vec![ResponseEvent::text(text)],
                        _ => Vec::new(),
                    },
                    Some("input_json_delta") => {
                        let fragment = str_field(delta, "partial_json").unwrap_or("");
                        match self.tool_accumulators.get_mut(&index) {
                            Some(acc) => acc.push_arguments(fragment),
                            None => warn!(index, "input_json_delta for unknown block"),
                        }
                        Vec::new()
                    }
                    _ => Vec::new(),
                }
            }
            "content_block_stop" => self
                .tool_accumulators
                .remove(&index)
                .and_then(ToolCallAccumulator::finish)
                .map(ResponseEvent::ToolCall)
                .into_iter()
                .collect(),
            "message_delta" => {
                if let Some(reason) = json
                    .get("delta")
                    .and_then(|d| str_field(d, "stop_reason"))
                {
                    self.finish_reason = Some(FinishReason::parse(reason));
                }
                if let Some(usage) = json.get("usage") {
                    let entry = self.usage.get_or_insert_with(TokenUsage::default);
                    entry.output_tokens = token_count(usage, "output_tokens");
                }
                Vec::new()
            }
            "message_stop" => vec![self.done()],
            "error" => {
                let error = json.get("error").unwrap_or(json);
                let message = str_field(error, "message").unwrap_or("Unknown Anthropic error");
                let kind = str_field(error, "type").unwrap_or("error");
                vec![ResponseEvent::error(
                    message,
                    Some(kind),
                    RETRYABLE_ERROR_TYPES.contains(&kind),
                )]
            }
            _ => Vec::new(),
        }
    }
}

impl SseHandler for AnthropicParser {
    fn on_frame(&mut self, frame: SseFrame) -> Vec<ResponseEvent> {
        if frame.is_done_sentinel() {
            return vec![self.done()];
        }
        match serde_json::from_str::<Value>(&frame.data) {
            Ok(json) => self.parse_event(&json),
            Err(e) => {
                warn!("Dropping malformed Anthropic event: {} ({})", e, frame.data);
                Vec::new()
            }
        }
    }

    fn on_end(&mut self) -> Vec<ResponseEvent> {
        // No message_stop: keep whatever blocks already hold complete JSON
        let mut indices: Vec<usize> = self.tool_accumulators.keys().copied().collect();
        indices.sort_unstable();
        let mut events: Vec<ResponseEvent> = indices
            .into_iter()
            .filter_map(|i| self.tool_accumulators.remove(&i))
            .filter(ToolCallAccumulator::arguments_complete)
            .filter_map(ToolCallAccumulator::finish)
            .map(ResponseEvent::ToolCall)
            .collect();
        events.push(self.done());
        events
    }

    fn on_abort(&mut self, failure: StreamFailure) -> Vec<ResponseEvent> {
        self.tool_accumulators.clear();
        vec![failure.into_event()]
    }
}

fn token_count(usage: &Value, key: &str) -> u64 {
    usage.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Decode a non-streaming Messages API response
pub fn decode_message(json: Value) -> Vec<ResponseEvent> {
    if str_field(&json, "type") == Some("error") {
        let mut parser = AnthropicParser::new();
        return parser.parse_event(&json);
    }

    let mut events = Vec::new();
    for block in json
        .get("content")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
    {
        match str_field(block, "type") {
            Some("text") => {
                if let Some(text) = str_field(block, "text").filter(|t| !t.is_empty()) {
                    events.push(ResponseEvent::text(text));
                }
            }
            Some("tool_use") => {
                let name = str_field(block, "name").unwrap_or("");
                if name.trim().is_empty() {
                    continue;
                }
                let arguments = match block.get("input") {
                    Some(Value::Object(map)) => map.clone(),
                    Some(other) => parse_arguments(&other.to_string(), name),
                    None => Default::default(),
                };
                events.push(ResponseEvent::ToolCall(ToolCallRecord::new(
                    str_field(block, "id").unwrap_or(""),
                    name,
                    arguments,
                )));
            }
            _ => {}
        }
    }

    let usage = json.get("usage").map(|u| TokenUsage {
        input_tokens: token_count(u, "input_tokens"),
        output_tokens: token_count(u, "output_tokens"),
    });
    events.push(ResponseEvent::Done {
        usage,
        finish_reason: str_field(&json, "stop_reason").map(FinishReason::parse),
    });
    events
}
