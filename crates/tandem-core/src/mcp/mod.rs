//! MCP (Model Context Protocol) tool servers
//!
//! Remote servers listed under `[mcp.servers.<name>]` are queried once with
//! `tools/list`. Each tool they report is registered as `mcp__<server>__<tool>`
//! and calls are forwarded with `tools/call` over JSON-RPC on HTTP.

pub mod client;
pub mod config;
pub mod protocol;
pub mod tool;

pub use client::{McpClient, McpError};
pub use config::{McpConfig, McpServerConfig};
pub use protocol::{McpContent, McpToolDef, ToolCallResult};
pub use tool::{is_mcp_tool, register_mcp_tools, McpTool, TOOL_PREFIX};
