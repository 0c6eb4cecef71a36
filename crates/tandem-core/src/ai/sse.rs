//! Server-sent event framing
//!
//! Turns raw body chunks into `data:` payloads. Each `data:` line is handed
//! to the handler as soon as its newline arrives; some OpenAI-compatible
//! servers never send the blank separator line, so frames are not held back
//! waiting for one.

use tracing::debug;

use crate::ai::client::transport::StreamFailure;
use crate::ai::parsers::StreamDecoder;
use crate::ai::types::ResponseEvent;

/// Sentinel payload some providers send as the final `data:` line
pub const DONE_SENTINEL: &str = "[DONE]";

/// One `data:` payload, with the most recent `event:` name if any
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseFrame {
    pub event: Option<String>,
    pub data: String,
}

impl SseFrame {
    pub fn is_done_sentinel(&self) -> bool {
        self.data.trim() == DONE_SENTINEL
    }
}

/// Incremental line splitter. Works on bytes so a chunk boundary inside a
/// multi-byte character never corrupts the text.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    pending: Vec<u8>,
    event: Option<String>,
}

impl SseLineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        self.pending.extend_from_slice(chunk);
        let mut frames = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            if let Some(frame) = self.process_line(line.trim_end_matches('\r')) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush a trailing line that had no terminating newline
    pub fn finish(&mut self) -> Option<SseFrame> {
        if self.pending.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.pending);
        let line = String::from_utf8_lossy(&rest);
        self.process_line(line.trim_end_matches('\r'))
    }

    fn process_line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            self.event = None;
            return None;
        }
        if line.starts_with(':') {
            return None;
        }
        if let Some(name) = field_value(line, "event") {
            self.event = Some(name.to_string());
            return None;
        }
        if let Some(data) = field_value(line, "data") {
            return Some(SseFrame {
                event: self.event.clone(),
                data: data.to_string(),
            });
        }
        debug!("Ignoring SSE line: {}", line);
        None
    }
}

fn field_value<'a>(line: &'a str, field: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(field)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

/// Vendor-specific interpretation of SSE payloads
pub trait SseHandler: Send + 'static {
    fn on_frame(&mut self, frame: SseFrame) -> Vec<ResponseEvent>;

    /// Body ended cleanly without a terminal event
    fn on_end(&mut self) -> Vec<ResponseEvent>;

    /// Body failed mid-stream
    fn on_abort(&mut self, failure: StreamFailure) -> Vec<ResponseEvent>;
}

/// Adapts an [`SseHandler`] to the byte-level [`StreamDecoder`] contract
pub struct SseDecoder<H> {
    lines: SseLineBuffer,
    handler: H,
}

impl<H: SseHandler> SseDecoder<H> {
    pub fn new(handler: H) -> Self {
        Self {
            lines: SseLineBuffer::new(),
            handler,
        }
    }
}

impl<H: SseHandler> StreamDecoder for SseDecoder<H> {
    fn decode(&mut self, chunk: &[u8]) -> Vec<ResponseEvent> {
        self.lines
            .push(chunk)
            .into_iter()
            .flat_map(|frame| self.handler.on_frame(frame))
            .collect()
    }

    fn finish(&mut self) -> Vec<ResponseEvent> {
        let mut events = match self.lines.finish() {
            Some(frame) => self.handler.on_frame(frame),
            None => Vec::new(),
        };
        if !events.iter().any(ResponseEvent::is_terminal) {
            events.extend(self.handler.on_end());
        }
        events
    }

    fn abort(&mut self, failure: StreamFailure) -> Vec<ResponseEvent> {
        self.handler.on_abort(failure)
    }
}
