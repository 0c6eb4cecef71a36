//! Request encoders, one per provider wire format

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicFormat;
pub use google::GoogleFormat;
pub use openai::OpenAIFormat;

use serde_json::Value;

use crate::ai::types::{ChatMessage, ChatRequest, Role, ToolDefinition};

/// Longest tool description any provider accepts without complaint
pub const MAX_TOOL_DESCRIPTION_CHARS: usize = 1024;

pub trait FormatHandler {
    /// Convert history (system messages excluded) to provider messages
    fn convert_messages(&self, messages: &[ChatMessage]) -> Vec<Value>;

    fn convert_tools(&self, tools: &[ToolDefinition]) -> Vec<Value>;

    fn build_request_body(&self, request: &ChatRequest) -> Value;
}

pub(crate) fn tool_description(description: &str) -> String {
    description.chars().take(MAX_TOOL_DESCRIPTION_CHARS).collect()
}

/// System prompt plus any system-role messages, for providers that take a
/// single out-of-band system field
pub(crate) fn combined_system_text(request: &ChatRequest) -> Option<String> {
    let parts: Vec<&str> = request
        .system_prompt
        .as_deref()
        .into_iter()
        .chain(
            request
                .messages
                .iter()
                .filter(|m| m.role() == Role::System)
                .filter_map(ChatMessage::content),
        )
        .filter(|s| !s.trim().is_empty())
        .collect();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join("\n\n"))
    }
}
