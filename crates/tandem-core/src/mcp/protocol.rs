//! MCP protocol types (JSON-RPC 2.0)

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ai::sse::SseLineBuffer;

/// JSON-RPC request
#[derive(Debug, Serialize)]
pub struct McpRequest {
    pub jsonrpc: &'static str,
    pub id: i64,
    pub method: String,
    pub params: Value,
}

impl McpRequest {
    pub fn new(id: i64, method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response
#[derive(Debug, Deserialize)]
pub struct McpResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<RpcError>,
}

impl McpResponse {
    /// Answers a request, as opposed to a notification
    fn is_reply(&self) -> bool {
        self.result.is_some() || self.error.is_some()
    }
}

/// JSON-RPC error object
#[derive(Debug, Deserialize)]
pub struct RpcError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// MCP tool definition from tools/list
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct McpToolDef {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(rename = "inputSchema", default)]
    pub input_schema: Value,
}

/// Tools list response
#[derive(Debug, Deserialize)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<McpToolDef>,
}

/// Tool call params
#[derive(Debug, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Value,
}

/// Tool call result (from server)
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub structured_content: Option<Value>,
}

/// Content blocks returned by MCP tools
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    Text {
        text: String,
    },
    Image {
        #[serde(rename = "mimeType", default)]
        mime_type: String,
    },
    Resource {
        #[serde(default)]
        resource: Value,
    },
    #[serde(other)]
    Unknown,
}

impl ToolCallResult {
    /// Text parts joined by newlines, trimmed
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                McpContent::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
            .trim()
            .to_string()
    }

    /// What the model sees: text parts, else the structured content, else `OK`
    pub fn output(&self) -> String {
        let text = self.text();
        if !text.is_empty() {
            return text;
        }
        match &self.structured_content {
            Some(value) if !value.is_null() => value.to_string(),
            _ => "OK".to_string(),
        }
    }
}

/// Decode a response body that is either a bare JSON-RPC message or an SSE
/// stream of them. From a stream, the last reply wins over notifications.
pub fn parse_response_body(body: &str) -> Option<McpResponse> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(response) = serde_json::from_str::<McpResponse>(trimmed) {
        return Some(response);
    }

    let mut lines = SseLineBuffer::new();
    let mut frames = lines.push(trimmed.as_bytes());
    frames.extend(lines.finish());

    let mut last = None;
    let mut last_reply = None;
    for frame in frames.into_iter().filter(|f| !f.is_done_sentinel()) {
        let Ok(message) = serde_json::from_str::<McpResponse>(frame.data.trim()) else {
            continue;
        };
        if message.is_reply() {
            last_reply = Some(message);
        } else {
            last = Some(message);
        }
    }
    last_reply.or(last)
}
