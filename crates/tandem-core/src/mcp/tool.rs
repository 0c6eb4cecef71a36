//! MCP tool wrapper
//!
//! Wraps each remote tool in the [`Tool`] trait so the executor treats it
//! like any built-in tool.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::client::McpClient;
use super::config::McpConfig;
use super::protocol::McpToolDef;
use crate::ai::types::{Arguments, ParamSchema, ParamType};
use crate::tools::registry::{ErrorKind, Tool, ToolCategory, ToolContext, ToolRegistry, ToolResult};

/// Prefix shared by every MCP tool name
pub const TOOL_PREFIX: &str = "mcp__";

const DEFAULT_DESCRIPTION: &str = "MCP tool";

pub fn is_mcp_tool(name: &str) -> bool {
    name.starts_with(TOOL_PREFIX)
}

/// One remote tool, registered as `mcp__<server>__<tool>`
pub struct McpTool {
    tool_name: String,
    full_name: String,
    description: String,
    parameters: ParamSchema,
    client: Arc<McpClient>,
}

impl McpTool {
    pub fn new(definition: McpToolDef, client: Arc<McpClient>) -> Self {
        let full_name = format!("{}{}__{}", TOOL_PREFIX, client.name(), definition.name);
        let description = definition
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DESCRIPTION.to_string());

        // Tool inputs are always objects, whatever the server claims
        let mut parameters = ParamSchema::from_json_schema(&definition.input_schema);
        if parameters.kind != ParamType::Object {
            parameters = ParamSchema::object();
        }

        Self {
            tool_name: definition.name,
            full_name,
            description,
            parameters,
            client,
        }
    }

    /// Name on the server, without the prefix
    pub fn remote_name(&self) -> &str {
        &self.tool_name
    }
}

#[async_trait]
impl Tool for McpTool {
    fn name(&self) -> &str {
        &self.full_name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> ParamSchema {
        self.parameters.clone()
    }

    fn category(&self) -> ToolCategory {
        ToolCategory::External
    }

    async fn execute(&self, arguments: Arguments, _ctx: &ToolContext) -> ToolResult {
        match self
            .client
            .call_tool(&self.tool_name, Value::Object(arguments))
            .await
        {
            Ok(result) if result.is_error => {
                let text = result.text();
                let message = if text.is_empty() {
                    "MCP tool error".to_string()
                } else {
                    text
                };
                ToolResult::error(ErrorKind::ExecutionError, message)
            }
            Ok(result) => ToolResult::success(result.output()),
            Err(e) => {
                warn!(tool = %self.full_name, error = %e, "MCP call failed");
                ToolResult::error(ErrorKind::ExecutionError, e)
            }
        }
    }
}

/// List tools on every usable server and register them. A server that
/// cannot be reached is logged and skipped. Returns how many were added.
pub async fn register_mcp_tools(
    config: &McpConfig,
    http: &reqwest::Client,
    registry: &mut ToolRegistry,
) -> usize {
    let mut registered = 0;
    for (name, server) in config.active_servers() {
        let client = match McpClient::new(name, server, http.clone()) {
            Ok(client) => Arc::new(client),
            Err(e) => {
                warn!(server = %name, error = %e, "Skipping MCP server");
                continue;
            }
        };
        let tools = match client.list_tools().await {
            Ok(tools) => tools,
            Err(e) => {
                warn!(server = %name, error = %e, "Failed to list MCP tools");
                continue;
            }
        };
        info!(server = %name, count = tools.len(), "Registered MCP tools");
        for definition in tools {
            registry.register(Arc::new(McpTool::new(definition, client.clone())));
            registered += 1;
        }
    }
    registered
}
