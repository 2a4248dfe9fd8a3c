//! MCP tools (spec §4.11): `malloy_executeQuery` plus four discovery tools.
//! Parameter validation that fails before a handler can run (missing required
//! top-level fields) is the caller's job — `transport.rs` rejects those as a
//! protocol-level `InvalidParams` before dispatching here.

use serde::Deserialize;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::executor::{self, ExecuteQueryRequest};
use crate::state::AppState;

use super::types::{ContentItem, ToolResult};
use super::uri::MalloyUri;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteQueryParams {
    pub project_name: String,
    pub package_name: String,
    pub model_path: String,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub source_name: Option<String>,
    #[serde(default)]
    pub query_name: Option<String>,
}

pub async fn execute_query(state: &AppState, params: ExecuteQueryParams) -> ToolResult {
    match execute_query_inner(state, params).await {
        Ok(result) => result,
        Err(err) => ToolResult::error(ContentItem::plain_text(format!(
            "MCP error {}: {}",
            err.mcp_rpc_code(),
            err.kind
        ))),
    }
}

async fn execute_query_inner(
    state: &AppState,
    params: ExecuteQueryParams,
) -> Result<ToolResult, AppError> {
    let handle = state.store.project_handle(&params.project_name).await?;
    let guard = handle.lock().await;
    let package = guard.get_package(&params.package_name)?;
    let model = package.get_model(&params.model_path)?;

    let query_name = match (&params.source_name, &params.query_name) {
        (Some(source), Some(name)) => Some(format!("{source}->{name}")),
        (None, Some(name)) => Some(name.clone()),
        (Some(_), None) => {
            return Err(AppError::bad_request(
                "sourceName requires queryName to name the view to run",
            ))
        }
        (None, None) => None,
    };

    let request = ExecuteQueryRequest {
        query: params.query.clone(),
        query_name,
    };

    let result = executor::execute(
        model,
        state.runtime.as_ref(),
        &guard.connections,
        request,
        CancellationToken::new(),
    )
    .await?;

    let uri = MalloyUri::Model {
        project: params.project_name,
        package: params.package_name,
        model_path: params.model_path,
    }
    .build();
    let uri = format!("{uri}#result");

    let payload = json!({
        "data": { "array_value": result.rows },
        "totalRowsReturned": result.total_rows_returned,
        "truncated": result.truncated,
    });

    Ok(ToolResult::success(ContentItem::json(uri, &payload)))
}

pub async fn project_list(state: &AppState) -> ToolResult {
    let projects = state.store.list_projects().await;
    ToolResult::success(ContentItem::json(
        "malloy://projects",
        &json!({ "projects": projects }),
    ))
}

pub async fn package_list(state: &AppState, project_name: &str) -> ToolResult {
    match state
        .store
        .with_project(project_name, |p| Ok(p.list_packages().into_iter().map(str::to_string).collect::<Vec<_>>()))
        .await
    {
        Ok(packages) => ToolResult::success(ContentItem::json(
            MalloyUri::Project { project: project_name.to_string() }.build(),
            &json!({ "packages": packages }),
        )),
        Err(err) => ToolResult::error(ContentItem::json("malloy://error", &err.to_mcp_payload())),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageGetParams {
    pub project_name: String,
    pub package_name: String,
}

pub async fn package_get(state: &AppState, params: PackageGetParams) -> ToolResult {
    let uri = MalloyUri::Package {
        project: params.project_name.clone(),
        package: params.package_name.clone(),
    }
    .build();
    super::resources::read_resource(state, &uri)
        .await
        .into()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelGetTextParams {
    pub project_name: String,
    pub package_name: String,
    pub model_path: String,
}

pub async fn model_get_text(state: &AppState, params: ModelGetTextParams) -> ToolResult {
    match model_get_text_inner(state, &params).await {
        Ok(text) => ToolResult::success(ContentItem::text(
            MalloyUri::Model {
                project: params.project_name,
                package: params.package_name,
                model_path: params.model_path,
            }
            .build(),
            text,
        )),
        Err(err) => ToolResult::error(ContentItem::json("malloy://error", &err.to_mcp_payload())),
    }
}

async fn model_get_text_inner(state: &AppState, params: &ModelGetTextParams) -> Result<String, AppError> {
    let handle = state.store.project_handle(&params.project_name).await?;
    let guard = handle.lock().await;
    let package = guard.get_package(&params.package_name)?;
    package.get_model_file_text(&params.model_path).map(str::to_string)
}

impl From<super::types::ResourceResult> for ToolResult {
    fn from(value: super::types::ResourceResult) -> Self {
        ToolResult {
            content: value.contents,
            is_error: value.is_error,
        }
    }
}
