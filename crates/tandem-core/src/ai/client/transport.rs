//! HTTP transport shared by all adapters
//!
//! Sends the request lazily on first poll, checks the status, and feeds body
//! chunks through a [`StreamDecoder`]. The returned stream owns the response
//! body, so dropping it releases the connection.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use futures::stream::{self, BoxStream, StreamExt};
use futures::Stream;
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::ai::parsers::StreamDecoder;
use crate::ai::types::ResponseEvent;

/// Lazy, cancellable sequence of response events
pub type ResponseStream = BoxStream<'static, ResponseEvent>;

/// Maximum silence between body chunks before the stream is abandoned
pub const STREAM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

const MAX_ERROR_BODY_CHARS: usize = 500;

/// Why a body stopped before the decoder saw a clean end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFailure {
    pub message: String,
    pub code: &'static str,
    pub retryable: bool,
}

impl StreamFailure {
    pub fn new(message: impl Into<String>, code: &'static str, retryable: bool) -> Self {
        Self {
            message: message.into(),
            code,
            retryable,
        }
    }

    /// Connection-level failures are transient unless the request itself was malformed.
    /// The URL is stripped from the message; some endpoints carry credentials in it.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        let err = err.without_url();
        if err.is_timeout() {
            return Self::new(format!("Request timed out: {}", err), "TIMEOUT", true);
        }
        let retryable = err.is_connect() || err.is_request() || err.is_body() || err.is_decode();
        Self::new(format!("Connection error: {}", err), "NETWORK_ERROR", retryable)
    }

    pub fn idle_timeout(after: Duration) -> Self {
        Self::new(
            format!("Stream timed out after {}s without data", after.as_secs()),
            "TIMEOUT",
            true,
        )
    }

    pub fn into_event(self) -> ResponseEvent {
        ResponseEvent::error(self.message, Some(self.code), self.retryable)
    }
}

/// Whether a non-success HTTP status is worth retrying
pub fn status_is_retryable(status: u16, has_body: bool) -> bool {
    match status {
        401 | 403 => false,
        408 | 429 => true,
        s if s >= 500 => true,
        _ => has_body,
    }
}

pub(crate) fn single_event(event: ResponseEvent) -> ResponseStream {
    stream::iter([event]).boxed()
}

/// Send `request` when first polled and decode the response body
pub(crate) fn send_and_decode<D: StreamDecoder>(
    label: &'static str,
    request: reqwest::RequestBuilder,
    decoder: D,
) -> ResponseStream {
    stream::once(async move {
        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => {
                let failure = StreamFailure::from_reqwest(e);
                error!("{} request failed: {}", label, failure.message);
                return single_event(failure.into_event());
            }
        };

        let status = response.status();
        if !status.is_success() {
            return single_event(http_error_event(label, response).await);
        }

        debug!("{} response status {}", label, status);
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(StreamFailure::from_reqwest));
        decode_body(label, body, decoder, STREAM_IDLE_TIMEOUT)
    })
    .flatten()
    .boxed()
}

async fn http_error_event(label: &str, response: reqwest::Response) -> ResponseEvent {
    let status = response.status().as_u16();
    let retry_after = response
        .headers()
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = response.text().await.unwrap_or_default();
    let event = http_error(status, &body, retry_after.as_deref());
    warn!("{} API error {}: {}", label, status, body);
    event
}

/// Build the terminal error for a non-2xx response
pub fn http_error(status: u16, body: &str, retry_after: Option<&str>) -> ResponseEvent {
    let detail = error_detail(body);
    let mut message = if detail.is_empty() {
        format!("API error {}", status)
    } else {
        format!("API error {}: {}", status, detail)
    };
    if let Some(seconds) = retry_after {
        message.push_str(&format!(" (retry-after: {})", seconds.trim()));
    }

    let code = match status {
        401 | 403 => "AUTH_ERROR".to_string(),
        429 => "RATE_LIMITED".to_string(),
        other => format!("HTTP_{}", other),
    };
    ResponseEvent::Error {
        message,
        code: Some(code),
        retryable: status_is_retryable(status, !body.trim().is_empty()),
    }
}

/// Pull the human-readable message out of a JSON error body when there is one
fn error_detail(body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    let from_json = parsed.as_ref().and_then(|json| {
        let error = json.get("error").unwrap_or(json);
        match error {
            Value::String(s) => Some(s.clone()),
            other => other
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string),
        }
    });
    let detail = from_json.unwrap_or_else(|| body.trim().to_string());
    detail.chars().take(MAX_ERROR_BODY_CHARS).collect()
}

struct DecodeState<S, D> {
    body: Option<std::pin::Pin<Box<S>>>,
    decoder: D,
    queue: VecDeque<ResponseEvent>,
    terminal_sent: bool,
    chunks: u64,
}

/// Drive `decoder` over a body stream.
///
/// Exactly one terminal event is yielded. Once it is, the body is dropped
/// and nothing further is read.
pub fn decode_body<S, D>(
    label: &'static str,
    body: S,
    decoder: D,
    idle_timeout: Duration,
) -> ResponseStream
where
    S: Stream<Item = Result<Bytes, StreamFailure>> + Send + 'static,
    D: StreamDecoder,
{
    let state = DecodeState {
        body: Some(Box::pin(body)),
        decoder,
        queue: VecDeque::new(),
        terminal_sent: false,
        chunks: 0,
    };

    stream::unfold(state, move |mut state| async move {
        loop {
            if state.terminal_sent {
                return None;
            }
            if let Some(event) = state.queue.pop_front() {
                if event.is_terminal() {
                    state.terminal_sent = true;
                    state.queue.clear();
                    state.body = None;
                }
                return Some((event, state));
            }

            let Some(body) = state.body.as_mut() else {
                // Decoder ended without a terminal event
                state.terminal_sent = true;
                return Some((
                    ResponseEvent::Done {
                        usage: None,
                        finish_reason: None,
                    },
                    state,
                ));
            };

            match tokio::time::timeout(idle_timeout, body.next()).await {
                Ok(Some(Ok(chunk))) => {
                    state.chunks += 1;
                    let events = state.decoder.decode(&chunk);
                    state.queue.extend(events);
                }
                Ok(Some(Err(failure))) => {
                    error!(
                        "{} read error at chunk #{}: {}",
                        label, state.chunks, failure.message
                    );
                    state.body = None;
                    let events = state.decoder.abort(failure);
                    state.queue.extend(events);
                }
                Ok(None) => {
                    info!("{} stream ended after {} chunks", label, state.chunks);
                    state.body = None;
                    let events = state.decoder.finish();
                    state.queue.extend(events);
                }
                Err(_) => {
                    warn!("{} stream idle for {:?}", label, idle_timeout);
                    state.body = None;
                    let events = state
                        .decoder
                        .abort(StreamFailure::idle_timeout(idle_timeout));
                    state.queue.extend(events);
                }
            }
        }
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::parsers::BufferedJsonDecoder;

    fn json_decoder() -> BufferedJsonDecoder<impl FnMut(Value) -> Vec<ResponseEvent> + Send> {
        BufferedJsonDecoder::new(|json: Value| {
            vec![
                ResponseEvent::text(json["text"].as_str().unwrap_or_default()),
                ResponseEvent::Done {
                    usage: None,
                    finish_reason: None,
                },
            ]
        })
    }

    #[tokio::test]
    async fn test_decode_body_stops_after_terminal() {
        let chunks: Vec<Result<Bytes, StreamFailure>> = vec![
            Ok(Bytes::from_static(b"{\"text\":")),
            Ok(Bytes::from_static(b"\"hi\"}")),
        ];
        let events: Vec<_> = decode_body(
            "test",
            stream::iter(chunks),
            json_decoder(),
            STREAM_IDLE_TIMEOUT,
        )
        .collect()
        .await;
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ResponseEvent::text("hi"));
        assert!(matches!(events[1], ResponseEvent::Done { .. }));
    }

    #[tokio::test]
    async fn test_decode_body_abort_yields_error() {
        let chunks: Vec<Result<Bytes, StreamFailure>> = vec![
            Ok(Bytes::from_static(b"{\"text\":")),
            Err(StreamFailure::new("connection reset", "NETWORK_ERROR", true)),
        ];
        let events: Vec<_> = decode_body(
            "test",
            stream::iter(chunks),
            json_decoder(),
            STREAM_IDLE_TIMEOUT,
        )
        .collect()
        .await;
        assert_eq!(
            events,
            vec![ResponseEvent::error(
                "connection reset",
                Some("NETWORK_ERROR"),
                true
            )]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_timeout_is_retryable() {
        let body = stream::pending::<Result<Bytes, StreamFailure>>();
        let events: Vec<_> = decode_body("test", body, json_decoder(), Duration::from_secs(5))
            .collect()
            .await;
        assert_eq!(events.len(), 1);
        match &events[0] {
            ResponseEvent::Error {
                code, retryable, ..
            } => {
                assert_eq!(code.as_deref(), Some("TIMEOUT"));
                assert!(retryable);
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[test]
    fn test_http_error_classification() {
        let event = http_error(
            429,
            r#"{"error":{"message":"Too many requests"}}"#,
            Some("12"),
        );
        assert_eq!(
            event,
            ResponseEvent::Error {
                message: "API error 429: Too many requests (retry-after: 12)".to_string(),
                code: Some("RATE_LIMITED".to_string()),
                retryable: true,
            }
        );

        let ResponseEvent::Error { retryable, .. } = http_error(401, "bad key", None) else {
            panic!("expected error");
        };
        assert!(!retryable);
        let ResponseEvent::Error { retryable, .. } = http_error(400, "", None) else {
            panic!("expected error");
        };
        assert!(!retryable);
        let ResponseEvent::Error { retryable, .. } = http_error(400, "context too long", None)
        else {
            panic!("expected error");
        };
        assert!(retryable);
    }
}
