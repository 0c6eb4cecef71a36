//! MCP client for remote HTTP servers
//!
//! Every request is a single POST carrying one JSON-RPC message. Servers may
//! answer with plain JSON or with a short SSE stream; both are accepted.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use super::config::McpServerConfig;
use super::protocol::{
    parse_response_body, McpRequest, McpToolDef, ToolCallParams, ToolCallResult, ToolsListResult,
};

const ACCEPT_TYPES: &str = "application/json, text/event-stream";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum McpError {
    #[error("invalid header {0:?}")]
    InvalidHeader(String),

    /// Transport failure; the URL is stripped before it gets here
    #[error("request failed: {0}")]
    Http(reqwest::Error),

    #[error("server returned HTTP {0}")]
    Status(u16),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// JSON-RPC `error` member
    #[error("{message}")]
    Rpc { code: i64, message: String },

    #[error("Missing MCP result")]
    MissingResult,
}

impl From<reqwest::Error> for McpError {
    fn from(err: reqwest::Error) -> Self {
        Self::Http(err.without_url())
    }
}

/// Client for one configured server
pub struct McpClient {
    name: String,
    url: String,
    headers: HeaderMap,
    http: reqwest::Client,
    next_id: AtomicI64,
}

impl McpClient {
    pub fn new(
        name: impl Into<String>,
        config: &McpServerConfig,
        http: reqwest::Client,
    ) -> Result<Self, McpError> {
        let mut headers = HeaderMap::new();
        for (key, value) in &config.headers {
            let header = HeaderName::from_bytes(key.as_bytes())
                .map_err(|_| McpError::InvalidHeader(key.clone()))?;
            let value =
                HeaderValue::from_str(value).map_err(|_| McpError::InvalidHeader(key.clone()))?;
            headers.insert(header, value);
        }
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_TYPES));

        Ok(Self {
            name: name.into(),
            url: config.url.trim().to_string(),
            headers,
            http,
            next_id: AtomicI64::new(1),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// List available tools
    pub async fn list_tools(&self) -> Result<Vec<McpToolDef>, McpError> {
        let result: ToolsListResult = self.request("tools/list", json!({})).await?;
        debug!(server = %self.name, count = result.tools.len(), "Listed MCP tools");
        Ok(result.tools)
    }

    /// Call a tool. A result with `isError` set is still `Ok`.
    pub async fn call_tool(&self, name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let params = ToolCallParams {
            name: name.to_string(),
            arguments,
        };
        let params =
            serde_json::to_value(params).map_err(|e| McpError::InvalidResponse(e.to_string()))?;
        self.request("tools/call", params).await
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R, McpError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        debug!(server = %self.name, id, method, "MCP request");

        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .timeout(REQUEST_TIMEOUT)
            .json(&McpRequest::new(id, method, params))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(McpError::Status(status.as_u16()));
        }

        let body = response.text().await?;
        let message = parse_response_body(&body)
            .ok_or_else(|| McpError::InvalidResponse("no JSON-RPC message in body".to_string()))?;
        if let Some(error) = message.error {
            return Err(McpError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        let result = message.result.ok_or(McpError::MissingResult)?;
        serde_json::from_value(result).map_err(|e| McpError::InvalidResponse(e.to_string()))
    }
}
