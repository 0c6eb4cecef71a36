//! Tool registry for managing available tools
//!
//! The registry is a plain name → tool table. It is filled once at startup,
//! wrapped in an `Arc`, and shared read-only by every loop and subagent.

use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::agent::loop_events::EventSink;
use crate::ai::providers::ModelSelection;
use crate::ai::types::{Arguments, Metadata, ParamSchema, ToolDefinition};
use crate::tools::confirmation::{AutoDecline, Confirmer};

/// Tool category, used for argument defaults and permission display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCategory {
    /// Read-only tools that never modify state.
    ReadOnly,
    /// Write tools that modify files.
    Write,
    /// Tools that run shell commands; they get a default `working_dir`.
    Shell,
    /// Tools that drive other agent loops.
    Orchestration,
    /// Tools served by a remote MCP server.
    External,
}

/// Failure taxonomy for tool calls
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Malformed or missing caller input
    ValidationError,
    /// Denied by policy
    SecurityViolation,
    /// User declined confirmation
    PermissionError,
    NotFound,
    SizeLimit,
    Timeout,
    /// Failure inside the tool
    ExecutionError,
    /// Missing credentials or wiring
    ConfigurationError,
    /// Transient provider throttling
    RateLimited,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::SecurityViolation => "SECURITY_VIOLATION",
            ErrorKind::PermissionError => "PERMISSION_ERROR",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::SizeLimit => "SIZE_LIMIT",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::ExecutionError => "EXECUTION_ERROR",
            ErrorKind::ConfigurationError => "CONFIGURATION_ERROR",
            ErrorKind::RateLimited => "RATE_LIMITED",
        }
    }

    /// Whether the model can reasonably fix the problem and try again
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            ErrorKind::SecurityViolation
                | ErrorKind::PermissionError
                | ErrorKind::ConfigurationError
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tool execution result
#[derive(Debug, Clone, PartialEq)]
pub enum ToolResult {
    Success {
        output: String,
        metadata: Metadata,
    },
    Error {
        message: String,
        kind: ErrorKind,
        recoverable: bool,
    },
    /// The tool inspected its arguments and wants a human to approve first
    RequiresConfirmation { reason: String, details: String },
}

impl ToolResult {
    /// Create a success result
    pub fn success(output: impl Into<String>) -> Self {
        Self::Success {
            output: output.into(),
            metadata: Metadata::new(),
        }
    }

    pub fn success_with(output: impl Into<String>, metadata: Metadata) -> Self {
        Self::Success {
            output: output.into(),
            metadata,
        }
    }

    /// Create an error result; recoverability follows the kind
    pub fn error(kind: ErrorKind, msg: impl fmt::Display) -> Self {
        Self::Error {
            message: msg.to_string(),
            kind,
            recoverable: kind.is_recoverable(),
        }
    }

    /// Create an invalid-parameters error.
    pub fn invalid_parameters(msg: impl fmt::Display) -> Self {
        Self::error(ErrorKind::ValidationError, msg)
    }

    pub fn requires_confirmation(reason: impl Into<String>, details: impl Into<String>) -> Self {
        Self::RequiresConfirmation {
            reason: reason.into(),
            details: details.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        !matches!(self, Self::Success { .. })
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Error { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Text handed back to the model
    pub fn to_content(&self) -> String {
        match self {
            Self::Success { output, .. } => output.clone(),
            Self::Error { message, .. } => format!("Error: {}", message),
            Self::RequiresConfirmation { reason, .. } => {
                format!("Skipped (requires confirmation): {}", reason)
            }
        }
    }
}

/// Parse tool parameters, returning a ToolResult error on failure
pub fn parse_params<T: serde::de::DeserializeOwned>(arguments: &Arguments) -> Result<T, ToolResult> {
    serde_json::from_value(serde_json::Value::Object(arguments.clone()))
        .map_err(|e| ToolResult::invalid_parameters(format!("Invalid parameters: {}", e)))
}

/// Context for tool execution
#[derive(Clone)]
pub struct ToolContext {
    /// Workspace root; shell tools default their `working_dir` to it
    pub workspace: Option<PathBuf>,
    /// Id of the model's tool call being served
    pub tool_call_id: Option<String>,
    pub confirmer: Arc<dyn Confirmer>,
    pub events: EventSink,
    /// Cancelled when the surrounding turn is torn down
    pub cancel: CancellationToken,
    /// Provider and model driving the current loop
    pub model: Option<ModelSelection>,
    /// Set on the single re-invocation after a tool-requested confirmation
    pub pre_confirmed: bool,
    /// True inside a subagent loop
    pub nested: bool,
}

impl Default for ToolContext {
    fn default() -> Self {
        Self {
            workspace: None,
            tool_call_id: None,
            confirmer: Arc::new(AutoDecline),
            events: EventSink::disabled(),
            cancel: CancellationToken::new(),
            model: None,
            pre_confirmed: false,
            nested: false,
        }
    }
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace(mut self, workspace: impl Into<PathBuf>) -> Self {
        self.workspace = Some(workspace.into());
        self
    }

    pub fn with_confirmer(mut self, confirmer: Arc<dyn Confirmer>) -> Self {
        self.confirmer = confirmer;
        self
    }

    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_model(mut self, model: ModelSelection) -> Self {
        self.model = Some(model);
        self
    }

    pub fn with_tool_call_id(mut self, id: impl Into<String>) -> Self {
        self.tool_call_id = Some(id.into());
        self
    }

    pub fn nested(mut self) -> Self {
        self.nested = true;
        self
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("workspace", &self.workspace)
            .field("tool_call_id", &self.tool_call_id)
            .field("model", &self.model)
            .field("pre_confirmed", &self.pre_confirmed)
            .field("nested", &self.nested)
            .finish()
    }
}

/// Tool trait - implement this for each tool
#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    /// Input schema; must be an object schema
    fn parameters(&self) -> ParamSchema;

    fn category(&self) -> ToolCategory {
        ToolCategory::Write
    }

    /// Override the executor's default timeout
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, arguments: Arguments, ctx: &ToolContext) -> ToolResult;

    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters(),
        }
    }
}

/// Registry of available tools
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tool. A later registration under the same name wins.
    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            warn!(tool = %name, "Replacing previously registered tool");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Definitions of every tool, sorted by name
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.definitions_excluding(&[])
    }

    pub fn definitions_excluding(&self, excluded: &[&str]) -> Vec<ToolDefinition> {
        let mut defs: Vec<ToolDefinition> = self
            .tools
            .values()
            .filter(|t| !excluded.iter().any(|e| *e == t.name()))
            .map(|t| t.definition())
            .collect();
        defs.sort_by(|a, b| a.name.cmp(&b.name));
        defs
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
