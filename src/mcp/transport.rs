//! Streamable-HTTP MCP transport (spec §6): a single `POST /mcp` endpoint
//! accepting a JSON-RPC request body and returning a JSON-RPC response.
//! Methods are dispatched by name rather than through `jsonrpc-derive`'s
//! static trait macro, since the resource/tool surface here is catalog-driven
//! (dynamic URIs, per-project data) rather than a small fixed method set.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

use super::types::{McpError, McpRequest, McpResponse, RequestId};
use super::{prompts, resources, tools};

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/mcp", post(handle_rpc))
        .with_state(state)
}

async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<McpRequest>,
) -> Json<McpResponse> {
    crate::observability::record_request();
    let id = request.id.clone();
    let response = dispatch(&state, &request).await;
    Json(match response {
        Ok(result) => McpResponse::ok(id, result),
        Err(err) => McpResponse::err(id, McpError::from(&err)),
    })
}

async fn dispatch(state: &AppState, request: &McpRequest) -> Result<serde_json::Value, AppError> {
    match request.method.as_str() {
        "initialize" => Ok(json!({
            "protocolVersion": "2024-11-05",
            "capabilities": { "resources": {}, "tools": {}, "prompts": {} },
            "serverInfo": { "name": "publisher", "version": env!("CARGO_PKG_VERSION") },
        })),
        "ping" => Ok(json!({})),
        "resources/read" => {
            let uri = require_str(&request.params, "uri")?;
            let result = resources::read_resource(state, uri).await;
            Ok(serde_json::to_value(result).unwrap())
        }
        "tools/list" => Ok(json!({ "tools": tool_definitions() })),
        "tools/call" => dispatch_tool_call(state, request).await,
        "prompts/list" => Ok(json!({ "prompts": prompt_definitions() })),
        "prompts/get" => dispatch_prompt_get(state, request).await,
        other => Err(AppError::bad_request(format!("unknown method: {other}"))),
    }
}

async fn dispatch_tool_call(
    state: &AppState,
    request: &McpRequest,
) -> Result<serde_json::Value, AppError> {
    let name = require_str(&request.params, "name")?;
    let arguments = request
        .params
        .get("arguments")
        .cloned()
        .unwrap_or(serde_json::Value::Null);

    let result = match name {
        "malloy_executeQuery" => {
            let params = serde_json::from_value(arguments)
                .map_err(|e| AppError::bad_request(format!("invalid parameters: {e}")))?;
            tools::execute_query(state, params).await
        }
        "malloy_projectList" => tools::project_list(state).await,
        "malloy_packageList" => {
            let project_name = arguments
                .get("projectName")
                .and_then(|v| v.as_str())
                .ok_or_else(|| AppError::bad_request("missing required field: projectName"))?;
            tools::package_list(state, project_name).await
        }
        "malloy_packageGet" => {
            let params = serde_json::from_value(arguments)
                .map_err(|e| AppError::bad_request(format!("invalid parameters: {e}")))?;
            tools::package_get(state, params).await
        }
        "malloy_modelGetText" => {
            let params = serde_json::from_value(arguments)
                .map_err(|e| AppError::bad_request(format!("invalid parameters: {e}")))?;
            tools::model_get_text(state, params).await
        }
        other => return Err(AppError::bad_request(format!("unknown tool: {other}"))),
    };

    Ok(serde_json::to_value(result).unwrap())
}

async fn dispatch_prompt_get(
    state: &AppState,
    request: &McpRequest,
) -> Result<serde_json::Value, AppError> {
    let name = require_str(&request.params, "name")?;
    let arguments: HashMap<String, String> = request
        .params
        .get("arguments")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let rendered = prompts::render(state, name, &arguments).await?;
    Ok(json!({ "messages": [{ "role": "user", "content": { "type": "text", "text": rendered } }] }))
}

fn require_str<'a>(params: &'a serde_json::Value, field: &str) -> Result<&'a str, AppError> {
    params
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::bad_request(format!("missing required field: {field}")))
}

fn tool_definitions() -> serde_json::Value {
    json!([
        { "name": "malloy_executeQuery", "description": "Execute an ad-hoc or named query against a model." },
        { "name": "malloy_projectList", "description": "List all projects." },
        { "name": "malloy_packageList", "description": "List packages within a project." },
        { "name": "malloy_packageGet", "description": "Get a package's models and notebooks." },
        { "name": "malloy_modelGetText", "description": "Get the raw source text of a model or notebook." },
    ])
}

fn prompt_definitions() -> serde_json::Value {
    prompts::registry()
        .iter()
        .map(|def| json!({ "id": prompts::versioned_id(def), "arguments": def.arguments }))
        .collect()
}
