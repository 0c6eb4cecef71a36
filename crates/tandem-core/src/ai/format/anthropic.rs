//! Anthropic Messages API request encoding
//!
//! Tool results become `tool_result` blocks inside a user message. Runs of
//! consecutive results are merged into one message so roles keep alternating.

use std::collections::HashSet;

use serde_json::{json, Value};
use tracing::debug;

use super::{combined_system_text, tool_description, FormatHandler};
use crate::ai::types::{ChatMessage, ChatRequest, Role, ToolDefinition};

/// Anthropic format handler
#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicFormat;

impl AnthropicFormat {
    pub fn new() -> Self {
        Self
    }
}

impl FormatHandler for AnthropicFormat {
    fn convert_messages(&self, messages: &[ChatMessage]) -> Vec<Value> {
        let mut result: Vec<Value> = Vec::new();
        let mut last_was_tool_result = false;

        for msg in messages {
            match msg.role() {
                Role::System => continue,
                Role::User => {
                    result.push(json!({
                        "role": "user",
                        "content": [{"type": "text", "text": msg.content().unwrap_or_default()}]
                    }));
                    last_was_tool_result = false;
                }
                Role::Assistant => {
                    let mut blocks = Vec::new();
                    if let Some(text) = msg.content().filter(|t| !t.is_empty()) {
                        blocks.push(json!({"type": "text", "text": text}));
                    }
                    for call in msg.tool_calls() {
                        blocks.push(json!({
                            "type": "tool_use",
                            "id": call.id,
                            "name": call.name,
                            "input": Value::Object(call.arguments.clone()),
                        }));
                    }
                    if blocks.is_empty() {
                        debug!("Skipping empty assistant message");
                        continue;
                    }
                    result.push(json!({"role": "assistant", "content": blocks}));
                    last_was_tool_result = false;
                }
                Role::Tool => {
                    let Some(tool_result) = msg.tool_result() else {
                        continue;
                    };
                    let block = json!({
                        "type": "tool_result",
                        "tool_use_id": tool_result.tool_call_id,
                        "content": tool_result.content,
                        "is_error": tool_result.is_error,
                    });
                    let merged = last_was_tool_result
                        && result
                            .last_mut()
                            .and_then(|last| last["content"].as_array_mut())
                            .map(|content| content.push(block.clone()))
                            .is_some();
                    if !merged {
                        result.push(json!({"role": "user", "content": [block]}));
                    }
                    last_was_tool_result = true;
                }
            }
        }

        sanitize_tool_results(&mut result);
        result
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool_description(&tool.description),
                    "input_schema": tool.input_schema(),
                })
            })
            .collect()
    }

    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": self.convert_messages(&request.messages),
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
        });

        if request.stream {
            body["stream"] = json!(true);
        }

        if let Some(system) = combined_system_text(request) {
            body["system"] = json!(system);
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(self.convert_tools(&request.tools));
        }

        body
    }
}

/// Ensure every `tool_use` is answered by a `tool_result` in the following
/// user message, and strip results whose `tool_use` is gone. A cancelled turn
/// can leave either behind, and the API rejects both.
fn sanitize_tool_results(messages: &mut Vec<Value>) {
    let mut i = 0;

    while i < messages.len() {
        if messages[i]["role"].as_str() != Some("assistant") {
            i += 1;
            continue;
        }

        let mut tool_use_ids: Vec<String> = Vec::new();
        let mut tool_use_lookup: HashSet<String> = HashSet::new();
        for block in messages[i]["content"].as_array().into_iter().flatten() {
            if block["type"].as_str() == Some("tool_use") {
                if let Some(id) = block["id"].as_str() {
                    if tool_use_lookup.insert(id.to_string()) {
                        tool_use_ids.push(id.to_string());
                    }
                }
            }
        }

        if tool_use_ids.is_empty() {
            i += 1;
            continue;
        }

        let next_is_user =
            i + 1 < messages.len() && messages[i + 1]["role"].as_str() == Some("user");

        if next_is_user {
            let user_msg = &mut messages[i + 1];
            let content = user_msg["content"].as_array().cloned().unwrap_or_default();

            let mut filtered: Vec<Value> = Vec::with_capacity(content.len() + tool_use_ids.len());
            let mut result_ids: HashSet<String> = HashSet::new();
            for block in content {
                if block["type"].as_str() == Some("tool_result") {
                    let id = block["tool_use_id"].as_str().unwrap_or("");
                    if tool_use_lookup.contains(id) {
                        result_ids.insert(id.to_string());
                        filtered.push(block);
                    } else {
                        debug!("Stripping orphaned tool_result for tool_use_id={}", id);
                    }
                } else {
                    filtered.push(block);
                }
            }

            for id in &tool_use_ids {
                if !result_ids.contains(id) {
                    debug!("Injecting stub tool_result for tool_use_id={}", id);
                    filtered.push(stub_tool_result(id));
                }
            }
            user_msg["content"] = Value::Array(filtered);
        } else {
            let stubs: Vec<Value> = tool_use_ids.iter().map(|id| stub_tool_result(id)).collect();
            messages.insert(i + 1, json!({"role": "user", "content": stubs}));
        }

        i += 1;
    }
}

fn stub_tool_result(tool_use_id: &str) -> Value {
    json!({
        "type": "tool_result",
        "tool_use_id": tool_use_id,
        "content": "Tool execution was interrupted",
        "is_error": true
    })
}
