//! Canonical event protocol for the agentic loop.
//!
//! `AgentEvent` is everything the orchestrator, the tool executor and the
//! subagent pool report while a turn runs. Front ends map these to their own
//! presentation.

use serde::Serialize;
use tokio::sync::mpsc;

use crate::agent::subagent::SubagentUpdate;
use crate::ai::types::ChatMessage;
use crate::tools::RiskLevel;

/// Events emitted while a chat turn runs.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    // ── Streaming ──────────────────────────────────────────────────────
    /// Text content delta from the model.
    TextDelta { delta: String },

    /// Token usage reported at the end of one provider call.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },

    // ── Tool lifecycle ─────────────────────────────────────────────────
    /// The model asked for a tool call.
    ToolCallStart {
        id: String,
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool passed validation and is running.
    ToolExecuting { id: String, name: String },

    /// Tool execution finished.
    ToolResult {
        id: String,
        name: String,
        output: String,
        is_error: bool,
    },

    /// A human decision is pending.
    ConfirmationRequested {
        tool_name: String,
        reason: String,
        risk: RiskLevel,
    },

    /// Status change of one subagent.
    SubagentUpdate(SubagentUpdate),

    // ── Turn lifecycle ─────────────────────────────────────────────────
    /// A new model round-trip started (iterations after the first).
    NewIteration { iteration: usize },

    Error { message: String, retryable: bool },

    /// Always the last event of a turn.
    Done { history: Vec<ChatMessage> },
}

/// Fire-and-forget event channel. Emitting never blocks and never fails.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<AgentEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self::default()
    }

    /// New sink plus the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<AgentEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(event);
        }
    }
}
