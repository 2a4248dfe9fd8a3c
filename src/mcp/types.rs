//! MCP JSON-RPC envelope types. Shaped after the teacher's `mcp::types`
//! module (`MCPRequest`/`MCPResponse`/`MCPError`/`RequestId`); the payload
//! types below it are specific to this catalog rather than to a document store.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: RequestId,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: RequestId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpError>,
}

impl McpResponse {
    pub fn ok(id: RequestId, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: RequestId, error: McpError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    String(String),
    Number(u64),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl From<&crate::error::AppError> for McpError {
    fn from(err: &crate::error::AppError) -> Self {
        Self {
            code: err.mcp_rpc_code(),
            message: format!("MCP error {}: {}", err.mcp_rpc_code(), err.kind),
            data: Some(err.to_mcp_payload()),
        }
    }
}

/// A single content item inside a resource/tool result, per the MCP content
/// item shape (`application/json`, `text/plain`, or a `resource` wrapper).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    pub text: String,
}

impl ContentItem {
    pub fn json(uri: impl Into<String>, value: &serde_json::Value) -> Self {
        Self {
            content_type: "application/json".to_string(),
            uri: Some(uri.into()),
            text: value.to_string(),
        }
    }

    pub fn text(uri: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain".to_string(),
            uri: Some(uri.into()),
            text: text.into(),
        }
    }

    pub fn plain_text(text: impl Into<String>) -> Self {
        Self {
            content_type: "text/plain".to_string(),
            uri: None,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceResult {
    pub contents: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub content: Vec<ContentItem>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    pub fn success(content: ContentItem) -> Self {
        Self {
            content: vec![content],
            is_error: false,
        }
    }

    pub fn error(content: ContentItem) -> Self {
        Self {
            content: vec![content],
            is_error: true,
        }
    }
}
