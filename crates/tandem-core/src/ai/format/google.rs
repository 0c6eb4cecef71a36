//! Gemini generateContent request encoding
//!
//! The assistant role is `model`. Function calls carry their thought
//! signature back in the same part; function responses are named from the
//! result's `toolName` metadata.

use serde_json::{json, Value};

use super::{combined_system_text, tool_description, FormatHandler};
use crate::ai::types::{ChatMessage, ChatRequest, Role, ToolDefinition, META_THOUGHT_SIGNATURE};

/// Google format handler
#[derive(Debug, Default, Clone, Copy)]
pub struct GoogleFormat;

impl GoogleFormat {
    pub fn new() -> Self {
        Self
    }
}

impl FormatHandler for GoogleFormat {
    fn convert_messages(&self, messages: &[ChatMessage]) -> Vec<Value> {
        let mut contents: Vec<Value> = Vec::new();
        let mut last_was_function_response = false;

        for msg in messages {
            match msg.role() {
                Role::System => continue,
                Role::User => {
                    contents.push(json!({
                        "role": "user",
                        "parts": [{"text": msg.content().unwrap_or_default()}]
                    }));
                    last_was_function_response = false;
                }
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if let Some(text) = msg.content().filter(|t| !t.is_empty()) {
                        parts.push(json!({"text": text}));
                    }
                    for call in msg.tool_calls() {
                        let mut part = json!({
                            "functionCall": {
                                "name": call.name,
                                "args": Value::Object(call.arguments.clone()),
                            }
                        });
                        if let Some(signature) = call.metadata.get(META_THOUGHT_SIGNATURE) {
                            part["thoughtSignature"] = json!(signature);
                        }
                        parts.push(part);
                    }
                    if parts.is_empty() {
                        continue;
                    }
                    contents.push(json!({"role": "model", "parts": parts}));
                    last_was_function_response = false;
                }
                Role::Tool => {
                    let Some(tool_result) = msg.tool_result() else {
                        continue;
                    };
                    let name = tool_result
                        .tool_name()
                        .unwrap_or(tool_result.tool_call_id.as_str());
                    let part = json!({
                        "functionResponse": {
                            "name": name,
                            "response": {"result": tool_result.content},
                        }
                    });
                    // One user turn answers every call of the preceding model turn
                    let merged = last_was_function_response
                        && contents
                            .last_mut()
                            .and_then(|last| last["parts"].as_array_mut())
                            .map(|parts| parts.push(part.clone()))
                            .is_some();
                    if !merged {
                        contents.push(json!({"role": "user", "parts": [part]}));
                    }
                    last_was_function_response = true;
                }
            }
        }

        contents
    }

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<Value> {
        let declarations: Vec<Value> = tools
            .iter()
            .map(|tool| {
                json!({
                    "name": tool.name,
                    "description": tool_description(&tool.description),
                    "parameters": tool.parameters.to_json(true),
                })
            })
            .collect();
        vec![json!({"functionDeclarations": declarations})]
    }

    fn build_request_body(&self, request: &ChatRequest) -> Value {
        let mut body = json!({
            "contents": self.convert_messages(&request.messages),
            "generationConfig": {
                "maxOutputTokens": request.max_tokens,
                "temperature": request.temperature,
            }
        });

        if let Some(system) = combined_system_text(request) {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        if !request.tools.is_empty() {
            body["tools"] = json!(self.convert_tools(&request.tools));
        }

        body
    }
}
