//! Google Gemini stream parser
//!
//! Gemini's `streamGenerateContent` is not SSE; records are delimited only by
//! balanced braces, so the body goes through [`JsonObjectScanner`] first.

use serde_json::Value;
use tracing::{debug, warn};

use super::{str_field, StreamDecoder};
use crate::ai::client::transport::StreamFailure;
use crate::ai::json_stream::JsonObjectScanner;
use crate::ai::types::{
    Arguments, FinishReason, Metadata, ResponseEvent, TokenUsage, ToolCallRecord,
    META_THOUGHT_SIGNATURE,
};

const RETRYABLE_CODES: &[u64] = &[429, 500, 503, 504];

#[derive(Debug, Clone, Copy)]
pub struct GoogleParserOptions {
    /// Swallow empty text parts that only carry a thought signature. The
    /// signature is still attached to the next emission from the record.
    pub suppress_signature_only_text: bool,
}

impl Default for GoogleParserOptions {
    fn default() -> Self {
        Self {
            suppress_signature_only_text: true,
        }
    }
}

/// Gemini response decoder, used for both streaming and one-shot bodies
#[derive(Debug, Default)]
pub struct GoogleParser {
    scanner: JsonObjectScanner,
    options: GoogleParserOptions,
    usage: Option<TokenUsage>,
    finish_reason: Option<FinishReason>,
    failed: bool,
}

impl GoogleParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: GoogleParserOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    fn parse_record(&mut self, json: &Value) -> Vec<ResponseEvent> {
        if let Some(error) = json.get("error") {
            self.failed = true;
            let message = str_field(error, "message").unwrap_or("Unknown Gemini error");
            let code = error.get("code").and_then(Value::as_u64);
            let status = str_field(error, "status")
                .map(str::to_string)
                .or_else(|| code.map(|c| c.to_string()));
            let retryable = code.is_some_and(|c| RETRYABLE_CODES.contains(&c));
            let message = match code {
                Some(code) => format!("{} ({})", message, code),
                None => message.to_string(),
            };
            return vec![ResponseEvent::Error {
                message,
                code: status,
                retryable,
            }];
        }

        if let Some(usage) = json.get("usageMetadata") {
            self.usage = Some(TokenUsage {
                input_tokens: usage
                    .get("promptTokenCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
                output_tokens: usage
                    .get("candidatesTokenCount")
                    .and_then(Value::as_u64)
                    .unwrap_or(0),
            });
        }

        let Some(candidate) = json
            .get("candidates")
            .and_then(Value::as_array)
            .and_then(|c| c.first())
        else {
            return Vec::new();
        };
        if let Some(reason) = str_field(candidate, "finishReason") {
            self.finish_reason = Some(FinishReason::parse(reason));
        }

        let parts = candidate
            .get("content")
            .and_then(|c| c.get("parts"))
            .and_then(Value::as_array);
        let mut events = Vec::new();
        let mut signature: Option<String> = None;

        for part in parts.into_iter().flatten() {
            if let Some(token) = str_field(part, "thoughtSignature") {
                signature = Some(token.to_string());
            }

            if let Some(call) = part.get("functionCall") {
                let name = str_field(call, "name").unwrap_or("");
                if name.trim().is_empty() {
                    warn!("Dropping Gemini functionCall without a name");
                    continue;
                }
                let arguments = match call.get("args") {
                    Some(Value::Object(map)) => map.clone(),
                    _ => Arguments::new(),
                };
                let id = str_field(call, "id")
                    .filter(|id| !id.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("call_{}", uuid::Uuid::new_v4().simple()));
                debug!(id = %id, name, "Gemini function call");
                events.push(ResponseEvent::ToolCall(
                    ToolCallRecord::new(id, name, arguments)
                        .with_metadata(signature_metadata(signature.take())),
                ));
                continue;
            }

            if let Some(text) = str_field(part, "text") {
                if text.is_empty()
                    && signature.is_some()
                    && self.options.suppress_signature_only_text
                {
                    continue;
                }
                if text.is_empty() && signature.is_none() {
                    continue;
                }
                events.push(ResponseEvent::TextDelta {
                    text: text.to_string(),
                    metadata: signature_metadata(signature.take()),
                });
            }
        }
        events
    }
}

fn signature_metadata(signature: Option<String>) -> Metadata {
    let mut metadata = Metadata::new();
    if let Some(signature) = signature {
        metadata.insert(META_THOUGHT_SIGNATURE.to_string(), signature);
    }
    metadata
}

impl StreamDecoder for GoogleParser {
    fn decode(&mut self, chunk: &[u8]) -> Vec<ResponseEvent> {
        let mut events = Vec::new();
        for record in self.scanner.push(chunk) {
            if self.failed {
                break;
            }
            match serde_json::from_str::<Value>(&record) {
                Ok(json) => events.extend(self.parse_record(&json)),
                Err(e) => warn!("Dropping malformed Gemini record: {}", e),
            }
        }
        events
    }

    fn finish(&mut self) -> Vec<ResponseEvent> {
        if self.scanner.has_partial() {
            warn!("Gemini body ended inside an unterminated record");
        }
        vec![ResponseEvent::Done {
            usage: self.usage.take(),
            finish_reason: self.finish_reason.take(),
        }]
    }

    fn abort(&mut self, failure: StreamFailure) -> Vec<ResponseEvent> {
        vec![failure.into_event()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(records: &[Value]) -> String {
        let inner: Vec<String> = records.iter().map(Value::to_string).collect();
        format!("[{}]", inner.join(",\r\n"))
    }

    fn parts(parts: Value) -> Value {
        json!({"candidates": [{"content": {"role": "model", "parts": parts}}]})
    }

    #[test]
    fn test_text_and_function_call_records() {
        let mut parser = GoogleParser::new();
        let raw = body(&[
            parts(json!([{"text": "Looking {at} it"}])),
            json!({
                "candidates": [{
                    "content": {"parts": [{"functionCall": {"name": "read_file", "args": {"path": "x.rs"}}}]},
                    "finishReason": "STOP"
                }],
                "usageMetadata": {"promptTokenCount": 10, "candidatesTokenCount": 4}
            }),
        ]);
        // Split mid-record to exercise the scanner
        let (a, b) = raw.split_at(raw.len() / 2);
        let mut events = parser.decode(a.as_bytes());
        events.extend(parser.decode(b.as_bytes()));
        events.extend(parser.finish());

        assert_eq!(events.len(), 3);
        assert_eq!(events[0], ResponseEvent::text("Looking {at} it"));
        let ResponseEvent::ToolCall(call) = &events[1] else {
            panic!("expected tool call");
        };
        assert!(call.id.starts_with("call_"));
        assert_eq!(call.arguments["path"], "x.rs");
        assert_eq!(
            events[2],
            ResponseEvent::Done {
                usage: Some(TokenUsage {
                    input_tokens: 10,
                    output_tokens: 4
                }),
                finish_reason: Some(FinishReason::Stop),
            }
        );
    }

    #[test]
    fn test_signature_only_text_is_suppressed_and_carried() {
        let mut parser = GoogleParser::new();
        let events = parser.decode(
            body(&[parts(json!([
                {"text": "", "thoughtSignature": "sig-1"},
                {"functionCall": {"name": "list_files", "args": {}}}
            ]))])
            .as_bytes(),
        );
        assert_eq!(events.len(), 1);
        let ResponseEvent::ToolCall(call) = &events[0] else {
            panic!("expected tool call");
        };
        assert_eq!(
            call.metadata.get(META_THOUGHT_SIGNATURE).map(String::as_str),
            Some("sig-1")
        );
    }

    #[test]
    fn test_signature_only_text_can_be_surfaced() {
        let mut parser = GoogleParser::with_options(GoogleParserOptions {
            suppress_signature_only_text: false,
        });
        let events = parser.decode(
            body(&[parts(json!([{"text": "", "thoughtSignature": "sig-2"}]))]).as_bytes(),
        );
        assert_eq!(events.len(), 1);
        let ResponseEvent::TextDelta { text, metadata } = &events[0] else {
            panic!("expected text");
        };
        assert!(text.is_empty());
        assert_eq!(metadata[META_THOUGHT_SIGNATURE], "sig-2");
    }

    #[test]
    fn test_error_record() {
        let mut parser = GoogleParser::new();
        let events = parser.decode(
            json!({"error": {"code": 429, "message": "Resource exhausted", "status": "RESOURCE_EXHAUSTED"}})
                .to_string()
                .as_bytes(),
        );
        assert_eq!(
            events,
            vec![ResponseEvent::Error {
                message: "Resource exhausted (429)".to_string(),
                code: Some("RESOURCE_EXHAUSTED".to_string()),
                retryable: true,
            }]
        );
    }

    #[test]
    fn test_server_supplied_call_id_is_kept() {
        let mut parser = GoogleParser::new();
        let events = parser.decode(
            parts(json!([{"functionCall": {"id": "fc-7", "name": "grep", "args": {"q": "x"}}}]))
                .to_string()
                .as_bytes(),
        );
        assert!(matches!(&events[0], ResponseEvent::ToolCall(c) if c.id == "fc-7"));
    }
}
