//! Stream parsers for the three provider wire formats
//!
//! Every parser owns its accumulator state for exactly one response body and
//! is dropped with it. Nothing here is shared between streams.

mod anthropic;
mod google;
mod openai;

pub use anthropic::{decode_message as decode_anthropic_message, AnthropicParser};
pub use google::{GoogleParser, GoogleParserOptions};
pub use openai::{decode_completion as decode_openai_completion, OpenAIParser};

use serde_json::Value;
use tracing::warn;

use crate::ai::client::transport::StreamFailure;
use crate::ai::types::{Arguments, Metadata, ResponseEvent, ToolCallRecord};

/// Byte-level decoder driven by the transport
///
/// `finish` and `abort` must each yield a terminal event (Done or Error).
pub trait StreamDecoder: Send + 'static {
    fn decode(&mut self, chunk: &[u8]) -> Vec<ResponseEvent>;

    /// Body ended cleanly
    fn finish(&mut self) -> Vec<ResponseEvent>;

    /// Body failed before completion
    fn abort(&mut self, failure: StreamFailure) -> Vec<ResponseEvent>;
}

/// Tool call being assembled from streamed fragments
#[derive(Debug, Clone, Default)]
pub struct ToolCallAccumulator {
    pub id: String,
    pub name: String,
    pub arguments: String,
    pub metadata: Metadata,
}

impl ToolCallAccumulator {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn has_arguments(&self) -> bool {
        !self.arguments.is_empty()
    }

    pub fn push_arguments(&mut self, fragment: &str) {
        self.arguments.push_str(fragment);
    }

    /// Whether the buffered arguments already form a complete JSON value
    pub fn arguments_complete(&self) -> bool {
        self.arguments.trim().is_empty() || serde_json::from_str::<Value>(&self.arguments).is_ok()
    }

    /// Finalize into a record. Blank names are dropped; unparseable
    /// arguments degrade to an empty mapping.
    pub fn finish(self) -> Option<ToolCallRecord> {
        if self.name.trim().is_empty() {
            warn!(id = %self.id, "Dropping tool call with empty name");
            return None;
        }
        let arguments = parse_arguments(&self.arguments, &self.name);
        Some(ToolCallRecord::new(self.id, self.name, arguments).with_metadata(self.metadata))
    }
}

/// Parse an argument buffer, falling back to an empty mapping
pub(crate) fn parse_arguments(raw: &str, tool: &str) -> Arguments {
    if raw.trim().is_empty() {
        return Arguments::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(tool, "Tool arguments were not an object: {}", other);
            Arguments::new()
        }
        Err(e) => {
            warn!(tool, "Failed to parse tool arguments: {} (raw: {})", e, raw);
            Arguments::new()
        }
    }
}

/// Heuristic for provider error messages that are worth retrying
pub(crate) fn is_transient_message(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    ["rate limit", "429", "overloaded", "timeout", "timed out", "temporarily", "unavailable"]
        .iter()
        .any(|needle| lower.contains(needle))
}

pub(crate) fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

/// Buffers a whole non-streaming response body and decodes it at the end
pub struct BufferedJsonDecoder<F> {
    body: Vec<u8>,
    decode: F,
}

impl<F> BufferedJsonDecoder<F>
where
    F: FnMut(Value) -> Vec<ResponseEvent> + Send + 'static,
{
    pub fn new(decode: F) -> Self {
        Self {
            body: Vec::new(),
            decode,
        }
    }
}

impl<F> StreamDecoder for BufferedJsonDecoder<F>
where
    F: FnMut(Value) -> Vec<ResponseEvent> + Send + 'static,
{
    fn decode(&mut self, chunk: &[u8]) -> Vec<ResponseEvent> {
        self.body.extend_from_slice(chunk);
        Vec::new()
    }

    fn finish(&mut self) -> Vec<ResponseEvent> {
        match serde_json::from_slice::<Value>(&self.body) {
            Ok(json) => (self.decode)(json),
            Err(e) => vec![ResponseEvent::error(
                format!("Invalid response body: {}", e),
                Some("PARSE_ERROR"),
                false,
            )],
        }
    }

    fn abort(&mut self, failure: StreamFailure) -> Vec<ResponseEvent> {
        vec![failure.into_event()]
    }
}
