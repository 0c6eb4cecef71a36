//! End-to-end decoding of recorded provider bodies, fed in small chunks, and
//! re-encoding of the reconstructed history for the same provider.

use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, Stream, StreamExt};
use serde_json::{json, Value};

use tandem_core::ai::client::transport::decode_body;
use tandem_core::ai::client::StreamFailure;
use tandem_core::ai::format::{AnthropicFormat, FormatHandler, GoogleFormat, OpenAIFormat};
use tandem_core::ai::parsers::{AnthropicParser, GoogleParser, OpenAIParser, StreamDecoder};
use tandem_core::ai::sse::SseDecoder;
use tandem_core::ai::types::{
    ChatMessage, ChatRequest, FinishReason, ResponseEvent, TokenUsage, ToolCallRecord,
    ToolResultRecord, META_THOUGHT_SIGNATURE,
};

type Body = Vec<Result<Bytes, StreamFailure>>;

fn chunked(text: &str, size: usize) -> Body {
    text.as_bytes()
        .chunks(size)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

fn body_stream(body: Body) -> impl Stream<Item = Result<Bytes, StreamFailure>> + Send + 'static {
    stream::iter(body)
}

async fn decode<D: StreamDecoder>(body: Body, decoder: D) -> Vec<ResponseEvent> {
    decode_body("test", body_stream(body), decoder, Duration::from_secs(5))
        .collect()
        .await
}

/// Fold decoded events back into the assistant message they describe
fn assistant_message(events: &[ResponseEvent]) -> ChatMessage {
    let mut text = String::new();
    let mut calls = Vec::new();
    for event in events {
        match event {
            ResponseEvent::TextDelta { text: t, .. } => text.push_str(t),
            ResponseEvent::ToolCall(call) => calls.push(call.clone()),
            _ => {}
        }
    }
    ChatMessage::assistant(Some(text), calls)
}

fn args(value: Value) -> serde_json::Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => serde_json::Map::new(),
    }
}

const ANTHROPIC_BODY: &str = r#"event: message_start
data: {"type":"message_start","message":{"usage":{"input_tokens":12,"output_tokens":1}}}

event: content_block_start
data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"Reading "}}

event: content_block_delta
data: {"type":"content_block_delta","index":0,"delta":{"type":"text_delta","text":"it now."}}

event: content_block_stop
data: {"type":"content_block_stop","index":0}

event: content_block_start
data: {"type":"content_block_start","index":1,"content_block":{"type":"tool_use","id":"toolu_1","name":"read_file","input":{}}}

event: content_block_delta
data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"path\": \"src/"}}

event: content_block_delta
data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"main.rs\"}"}}

event: content_block_stop
data: {"type":"content_block_stop","index":1}

event: message_delta
data: {"type":"message_delta","delta":{"stop_reason":"tool_use"},"usage":{"output_tokens":30}}

event: message_stop
data: {"type":"message_stop"}

"#;

#[tokio::test]
async fn anthropic_reply_round_trips() {
    let events = decode(
        chunked(ANTHROPIC_BODY, 7),
        SseDecoder::new(AnthropicParser::new()),
    )
    .await;

    let expected_call = ToolCallRecord::new(
        "toolu_1",
        "read_file",
        args(json!({"path": "src/main.rs"})),
    );
    assert_eq!(
        events,
        vec![
            ResponseEvent::text("Reading "),
            ResponseEvent::text("it now."),
            ResponseEvent::ToolCall(expected_call.clone()),
            ResponseEvent::Done {
                usage: Some(TokenUsage {
                    input_tokens: 12,
                    output_tokens: 30,
                }),
                finish_reason: Some(FinishReason::ToolCalls),
            },
        ]
    );

    let assistant = assistant_message(&events);
    assert_eq!(
        assistant,
        ChatMessage::assistant(Some("Reading it now.".to_string()), vec![expected_call.clone()])
    );

    let history = vec![
        ChatMessage::user("Show me main.rs"),
        assistant,
        ChatMessage::tool(ToolResultRecord::for_call(&expected_call, "fn main() {}", false)),
    ];
    let body = AnthropicFormat::new().build_request_body(&ChatRequest::new("claude", history));
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[1]["content"][0]["text"], "Reading it now.");
    assert_eq!(messages[1]["content"][1]["type"], "tool_use");
    assert_eq!(messages[1]["content"][1]["input"]["path"], "src/main.rs");
    assert_eq!(messages[2]["role"], "user");
    assert_eq!(messages[2]["content"][0]["tool_use_id"], "toolu_1");
    assert_eq!(messages[2]["content"][0]["content"], "fn main() {}");
}

const OPENAI_HEADERS: &str = r#"data: {"choices":[{"delta":{"role":"assistant","content":"Checking both."}}]}

data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_a","type":"function","function":{"name":"read_file","arguments":""}}]}}]}

data: {"choices":[{"delta":{"tool_calls":[{"index":1,"id":"call_b","type":"function","function":{"name":"list_files","arguments":""}}]}}]}

data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"path\":\"a.rs\"}"}}]}}]}

data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"dir\":\"src\"}"}}]}}]}

"#;

const OPENAI_TAIL: &str = r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}

data: {"choices":[],"usage":{"prompt_tokens":20,"completion_tokens":8}}

data: [DONE]

"#;

fn openai_calls() -> (ToolCallRecord, ToolCallRecord) {
    (
        ToolCallRecord::new("call_a", "read_file", args(json!({"path": "a.rs"}))),
        ToolCallRecord::new("call_b", "list_files", args(json!({"dir": "src"}))),
    )
}

#[tokio::test]
async fn openai_unindexed_fragments_follow_header_order() {
    let body = format!("{}{}", OPENAI_HEADERS, OPENAI_TAIL);
    let events = decode(chunked(&body, 11), SseDecoder::new(OpenAIParser::new())).await;
    let (a, b) = openai_calls();

    assert_eq!(
        events,
        vec![
            ResponseEvent::text("Checking both."),
            ResponseEvent::ToolCall(a.clone()),
            ResponseEvent::ToolCall(b.clone()),
            ResponseEvent::Done {
                usage: Some(TokenUsage {
                    input_tokens: 20,
                    output_tokens: 8,
                }),
                finish_reason: Some(FinishReason::ToolCalls),
            },
        ]
    );

    let history = vec![
        ChatMessage::user("Look around"),
        assistant_message(&events),
        ChatMessage::tool(ToolResultRecord::for_call(&a, "// a.rs", false)),
        ChatMessage::tool(ToolResultRecord::for_call(&b, "main.rs", false)),
    ];
    let body = OpenAIFormat::new()
        .build_request_body(&ChatRequest::new("gpt-4o", history).with_system_prompt("Be brief"));
    let messages = body["messages"].as_array().unwrap();
    assert_eq!(messages[0]["role"], "system");
    let tool_calls = messages[2]["tool_calls"].as_array().unwrap();
    assert_eq!(tool_calls.len(), 2);
    let encoded_args: Value =
        serde_json::from_str(tool_calls[1]["function"]["arguments"].as_str().unwrap()).unwrap();
    assert_eq!(encoded_args, json!({"dir": "src"}));
    assert_eq!(messages[4]["role"], "tool");
    assert_eq!(messages[4]["tool_call_id"], "call_b");
}

#[tokio::test]
async fn openai_abnormal_close_flushes_buffered_calls() {
    let mut body = chunked(OPENAI_HEADERS, 13);
    body.push(Err(StreamFailure::new(
        "connection reset by peer",
        "NETWORK_ERROR",
        true,
    )));
    let events = decode(body, SseDecoder::new(OpenAIParser::new())).await;
    let (a, b) = openai_calls();

    assert_eq!(events.len(), 4);
    assert_eq!(events[1], ResponseEvent::ToolCall(a));
    assert_eq!(events[2], ResponseEvent::ToolCall(b));
    match &events[3] {
        ResponseEvent::Error {
            message,
            code,
            retryable,
        } => {
            assert!(message.contains("connection reset"));
            assert_eq!(code.as_deref(), Some("NETWORK_ERROR"));
            assert!(*retryable);
        }
        other => panic!("expected terminal error, got {:?}", other),
    }
}

const GOOGLE_BODY: &str = r#"[{"candidates":[{"content":{"role":"model","parts":[{"text":"Looking at {braces} in \"quotes\""}]}}]}
,
{"candidates":[{"content":{"role":"model","parts":[{"functionCall":{"name":"read_file","args":{"path":"a}b.rs"}},"thoughtSignature":"sig-1"}]},"finishReason":"STOP"}],"usageMetadata":{"promptTokenCount":9,"candidatesTokenCount":5}}
]"#;

#[tokio::test]
async fn google_reply_round_trips_with_signature() {
    let events = decode(chunked(GOOGLE_BODY, 5), GoogleParser::new()).await;
    assert_eq!(events.len(), 3);
    assert_eq!(
        events[0],
        ResponseEvent::text("Looking at {braces} in \"quotes\"")
    );

    let call = match &events[1] {
        ResponseEvent::ToolCall(call) => call.clone(),
        other => panic!("expected tool call, got {:?}", other),
    };
    assert_eq!(call.name, "read_file");
    assert!(call.id.starts_with("call_"));
    assert_eq!(Value::Object(call.arguments.clone()), json!({"path": "a}b.rs"}));
    assert_eq!(
        call.metadata.get(META_THOUGHT_SIGNATURE).map(String::as_str),
        Some("sig-1")
    );
    assert_eq!(
        events[2],
        ResponseEvent::Done {
            usage: Some(TokenUsage {
                input_tokens: 9,
                output_tokens: 5,
            }),
            finish_reason: Some(FinishReason::Stop),
        }
    );

    let history = vec![
        ChatMessage::user("Open the odd file"),
        assistant_message(&events),
        ChatMessage::tool(ToolResultRecord::for_call(&call, "contents", false)),
    ];
    let body = GoogleFormat::new().build_request_body(&ChatRequest::new("gemini", history));
    let contents = body["contents"].as_array().unwrap();
    assert_eq!(contents[1]["role"], "model");
    assert_eq!(contents[1]["parts"][1]["thoughtSignature"], "sig-1");
    assert_eq!(contents[1]["parts"][1]["functionCall"]["args"]["path"], "a}b.rs");
    assert_eq!(
        contents[2]["parts"][0]["functionResponse"]["name"],
        "read_file"
    );
}
