//! OpenAI chat/completions request encoding

use serde_json::{json, Value};

use super::{tool_description, FormatHandler};
use crate::ai::types::{ChatMessage, ChatRequest, Role, ToolDefinition};

/// OpenAI format handler
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAIFormat;

impl OpenAIFormat {
    pub fn new() -> Self {
        Self
    }
}

impl FormatHandler for OpenAIFormat {
    fn convert_messages(&self, messages: &[ChatMessage]) -> Vec<Value> {
        let mut result = Vec::with_capacity(messages.len());

        for msg in messages {
            match msg.role() {
                Role::System => continue,
                Role::User => result.push(json!({
                    "role": "user",
                    "content": msg.content().unwrap_or_default(),
                })),
                Role::Assistant => {
                    if msg.tool_calls().is_empty() {
                        result.push(json!({
                            "role": "assistant",
                            "content": msg.content().unwrap_or_default(),
                        }));
                        continue;
                    }
                    let tool_calls: Vec<Value> = msg
                        .tool_calls()
                        .iter()
                        .map(|call| {
                            json!({
                                "id": call.id,
                                "type": "function",
                                "function": {
                                    "name": call.name,
                                    "arguments": Value::Object(call.arguments.clone()).to_string(),
                                }
                            })
                        })
                        .collect();
                    // Several compatible servers reject a null content here
                    result.push(json!({
                        "role": "assistant",
                        "content": msg.content().unwrap_or_default(),
                        "tool_calls": tool_calls,
                    }));
                }
                Role::Tool => {
                    if let Some(tool_result) = msg.tool_result() {
                        result.push(json!({
                            "role": "tool",
                            "tool_call_id": tool_result.tool_call_id,
                            "content": tool_result.content,
                        }));
                    }
                }
            }
        }

        result
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        tools
            .iter()
            .map(|tool| {
                json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool_description(&tool.description),
                        "parameters": tool.input_schema(),
                    }
                })
            })
            .collect()
    }

    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let mut messages = Vec::new();
        if let Some(system) = request
            .system_prompt
            .as_deref()
            .filter(|s| !s.trim().is_empty())
        {
            messages.push(json!({"role": "system", "content": system}));
        }
        // System messages from history stay in place, after the prompt
        for msg in &request.messages {
            if msg.role() == Role::System {
                if let Some(text) = msg.content() {
                    messages.push(json!({"role": "system", "content": text}));
                }
            }
        }
        messages.extend(self.convert_messages(&request.messages));

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "max_tokens": request.max_tokens,
            "temperature": request.temperature,
            "stream": request.stream,
        });

        if request.stream {
            body["stream_options"] = json!({"include_usage": true});
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(self.convert_tools(&request.tools));
        }

        body
    }
}
