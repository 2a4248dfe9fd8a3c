//! HTTP handler functions. Every handler returns `Result<Json<T>, AppError>`;
//! `AppError`'s `IntoResponse` impl maps it to `{ code, message }` per spec §7.
//! `?versionId=` is handled once, at the top of every handler, via
//! [`reject_version_id`] — spec §4.10 "uniformly 501".

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::config::{PackageManifest, ProjectManifest};
use crate::connection::QueryOptions;
use crate::error::AppError;
use crate::executor::{self, ExecuteQueryRequest};
use crate::observability::Counters;
use crate::state::AppState;
use crate::watcher::ReloadEvent;

type Params = HashMap<String, String>;

fn reject_version_id(params: &Params) -> Result<(), AppError> {
    reject_version_id_opt(params.get("versionId").map(String::as_str))
}

fn reject_version_id_opt(version_id: Option<&str>) -> Result<(), AppError> {
    if version_id.is_some() {
        return Err(AppError::not_implemented("versionId is reserved and not implemented"));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub name: String,
}

pub async fn list_projects(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<ProjectSummary>>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let names = state.store.list_projects().await;
    Ok(Json(names.into_iter().map(|name| ProjectSummary { name }).collect()))
}

#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    pub name: String,
    pub packages: Vec<String>,
    pub readme: String,
}

pub async fn get_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<ProjectDetail>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let reload = params.get("reload").map(String::as_str) == Some("true");
    if reload {
        reload_project_from_manifest(&state, &project).await?;
    }
    state
        .store
        .with_project(&project, |p| {
            Ok(ProjectDetail {
                name: project.clone(),
                packages: p.list_packages().into_iter().map(str::to_string).collect(),
                readme: p.readme(),
            })
        })
        .await
        .map(Json)
}

async fn reload_project_from_manifest(state: &AppState, project_name: &str) -> Result<(), AppError> {
    let config = crate::config::PublisherConfig::load(&state.server_root)
        .map_err(|e| AppError::internal(e.to_string()))?;
    let manifest = config
        .projects
        .into_iter()
        .find(|p| p.name == project_name)
        .ok_or_else(|| AppError::project_not_found(project_name))?;
    for package in manifest.packages {
        state
            .store
            .reload_package(project_name, &package.name, &package.location)
            .await?;
    }
    Ok(())
}

pub async fn add_project(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Params>,
    Json(manifest): Json<ProjectManifest>,
) -> Result<Json<()>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state.store.add_project(manifest).await?;
    Ok(Json(()))
}

pub async fn update_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<Params>,
    Json(manifest): Json<ProjectManifest>,
) -> Result<Json<()>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state.store.delete_project(&project).await.ok();
    state.store.add_project(manifest).await?;
    Ok(Json(()))
}

pub async fn delete_project(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<()>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state.store.delete_project(&project).await?;
    Ok(Json(()))
}

pub async fn list_connections(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<String>>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state
        .store
        .with_project(&project, |p| {
            Ok(p.connections.list().into_iter().map(|c| c.name().to_string()).collect())
        })
        .await
        .map(Json)
}

pub async fn get_connection(
    State(state): State<Arc<AppState>>,
    Path((project, connection)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state
        .store
        .with_project(&project, |p| {
            let conn = p.connections.get(&connection)?;
            Ok(serde_json::json!({ "name": conn.name(), "type": conn.type_name() }))
        })
        .await
        .map(Json)
}

pub async fn test_connection(
    State(state): State<Arc<AppState>>,
    Path((project, connection)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    guard.connections.test(&connection).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct SqlSourceParams {
    #[serde(rename = "sqlStatement")]
    pub sql_statement: String,
    #[serde(default, rename = "versionId")]
    pub version_id: Option<String>,
}

pub async fn sql_source(
    State(state): State<Arc<AppState>>,
    Path((project, connection)): Path<(String, String)>,
    Query(params): Query<SqlSourceParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id_opt(params.version_id.as_deref())?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let rows = guard.connections.sql_source(&connection, &params.sql_statement).await?;
    Ok(Json(serde_json::json!({ "rows": rows })))
}

#[derive(Debug, Deserialize)]
pub struct TableSourceParams {
    #[serde(rename = "tableKey")]
    pub table_key: String,
    #[serde(rename = "tablePath")]
    pub table_path: String,
    #[serde(default, rename = "versionId")]
    pub version_id: Option<String>,
}

pub async fn table_source(
    State(state): State<Arc<AppState>>,
    Path((project, connection)): Path<(String, String)>,
    Query(params): Query<TableSourceParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id_opt(params.version_id.as_deref())?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let rows = guard
        .connections
        .table_source(&connection, &params.table_key, &params.table_path)
        .await?;
    Ok(Json(serde_json::json!({ "rows": rows })))
}

#[derive(Debug, Deserialize)]
pub struct QueryDataParams {
    #[serde(rename = "sqlStatement")]
    pub sql_statement: String,
    #[serde(default)]
    pub options: Option<String>,
    #[serde(default, rename = "versionId")]
    pub version_id: Option<String>,
}

pub async fn query_data(
    State(state): State<Arc<AppState>>,
    Path((project, connection)): Path<(String, String)>,
    Query(params): Query<QueryDataParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id_opt(params.version_id.as_deref())?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let rows = guard
        .connections
        .query_data((&connection[..]).into(), &params.sql_statement, QueryOptions::default())
        .await?;
    Ok(Json(serde_json::json!({ "rows": rows })))
}

pub async fn temporary_table(
    State(state): State<Arc<AppState>>,
    Path((project, connection)): Path<(String, String)>,
    Query(params): Query<SqlSourceParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id_opt(params.version_id.as_deref())?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let name = guard.connections.temporary_table(&connection, &params.sql_statement).await?;
    Ok(Json(serde_json::json!({ "tableName": name })))
}

pub async fn list_packages(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<String>>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state
        .store
        .with_project(&project, |p| Ok(p.list_packages().into_iter().map(str::to_string).collect()))
        .await
        .map(Json)
}

#[derive(Debug, Serialize)]
pub struct PackageDetail {
    pub name: String,
    pub models: Vec<String>,
    pub notebooks: Vec<String>,
}

pub async fn get_package(
    State(state): State<Arc<AppState>>,
    Path((project, package)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<PackageDetail>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let reload = params.get("reload").map(String::as_str) == Some("true");
    if reload {
        reload_project_from_manifest(&state, &project).await?;
    }
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let pkg = guard.get_package(&package)?;
    Ok(Json(PackageDetail {
        name: package,
        models: pkg.list_model_paths().into_iter().map(str::to_string).collect(),
        notebooks: pkg.list_notebook_paths().into_iter().map(str::to_string).collect(),
    }))
}

pub async fn add_package(
    State(state): State<Arc<AppState>>,
    Path(project): Path<String>,
    Query(params): Query<Params>,
    Json(manifest): Json<PackageManifest>,
) -> Result<Json<()>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state.store.reload_package(&project, &manifest.name, &manifest.location).await?;
    Ok(Json(()))
}

pub async fn update_package(
    State(state): State<Arc<AppState>>,
    Path((project, package)): Path<(String, String)>,
    Query(params): Query<Params>,
    Json(manifest): Json<PackageManifest>,
) -> Result<Json<()>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    state.store.reload_package(&project, &package, &manifest.location).await?;
    Ok(Json(()))
}

pub async fn delete_package(
    State(state): State<Arc<AppState>>,
    Path((project, package)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<()>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let handle = state.store.project_handle(&project).await?;
    let mut guard = handle.lock().await;
    guard.remove_package(&package)?;
    Ok(Json(()))
}

pub async fn list_models(
    State(state): State<Arc<AppState>>,
    Path((project, package)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<Vec<String>>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let pkg = guard.get_package(&package)?;
    Ok(Json(pkg.list_model_paths().into_iter().map(str::to_string).collect()))
}

pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path((project, package, model_path)): Path<(String, String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let pkg = guard.get_package(&package)?;
    let model = pkg.get_model(&model_path)?;
    let compiled = model.compiled(state.runtime.as_ref()).await?;
    Ok(Json(serde_json::json!({
        "sources": compiled.sources,
        "queries": compiled.queries,
        "dialect": compiled.dialect,
    })))
}

#[derive(Debug, Deserialize)]
pub struct QueryResultsParams {
    #[serde(default, rename = "sourceName")]
    pub source_name: Option<String>,
    #[serde(default, rename = "queryName")]
    pub query_name: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default, rename = "versionId")]
    pub version_id: Option<String>,
}

pub async fn query_results(
    State(state): State<Arc<AppState>>,
    Path((project, package, model_path)): Path<(String, String, String)>,
    Query(params): Query<QueryResultsParams>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id_opt(params.version_id.as_deref())?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let pkg = guard.get_package(&package)?;
    let model = pkg.get_model(&model_path)?;

    let query_name = match (params.source_name, params.query_name) {
        (Some(source), Some(name)) => Some(format!("{source}->{name}")),
        (None, Some(name)) => Some(name),
        (Some(_), None) => {
            return Err(AppError::bad_request("sourceName requires queryName"));
        }
        (None, None) => None,
    };

    let result = executor::execute(
        model,
        state.runtime.as_ref(),
        &guard.connections,
        ExecuteQueryRequest {
            query: params.query,
            query_name,
        },
        CancellationToken::new(),
    )
    .await?;

    Ok(Json(serde_json::json!({
        "rows": result.rows,
        "totalRowsReturned": result.total_rows_returned,
        "truncated": result.truncated,
    })))
}

pub async fn list_databases(
    State(state): State<Arc<AppState>>,
    Path((project, package)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let pkg = guard.get_package(&package)?;
    Ok(Json(serde_json::json!(pkg.list_databases().await)))
}

pub async fn list_schedules(
    State(state): State<Arc<AppState>>,
    Path((project, package)): Path<(String, String)>,
    Query(params): Query<Params>,
) -> Result<Json<serde_json::Value>, AppError> {
    crate::observability::record_request();
    reject_version_id(&params)?;
    let handle = state.store.project_handle(&project).await?;
    let guard = handle.lock().await;
    let pkg = guard.get_package(&package)?;
    Ok(Json(serde_json::json!(pkg.list_schedules())))
}

#[derive(Debug, Deserialize)]
pub struct WatchStartRequest {
    #[serde(rename = "projectName")]
    pub project_name: String,
}

pub async fn watch_start(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WatchStartRequest>,
) -> Result<Json<()>, AppError> {
    crate::observability::record_request();
    let handle = state.store.project_handle(&request.project_name).await?;
    let root = {
        let guard = handle.lock().await;
        guard.root.clone()
    };

    let (tx, mut rx) = tokio::sync::mpsc::channel::<ReloadEvent>(32);
    let store_state = state.clone();
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            if store_state.pending_reloads.mark(&event).await {
                // The watcher fires per project, not per package, so a reload
                // event rebuilds every package declared for that project.
                if let Ok(config) = crate::config::PublisherConfig::load(&store_state.server_root) {
                    if let Some(manifest) = config.projects.into_iter().find(|p| p.name == event.project_name) {
                        for pkg in manifest.packages {
                            let _ = store_state
                                .store
                                .reload_package(&event.project_name, &pkg.name, &pkg.location)
                                .await;
                        }
                    }
                }
                store_state.pending_reloads.clear(&event).await;
            }
        }
    });

    state
        .watcher
        .start(root, request.project_name.clone(), String::new(), tx)
        .await?;
    Ok(Json(()))
}

pub async fn watch_stop(State(state): State<Arc<AppState>>) -> Json<()> {
    crate::observability::record_request();
    state.watcher.stop().await;
    Json(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WatchStatus {
    pub enabled: bool,
    pub watching_path: Option<String>,
    pub project_name: Option<String>,
}

pub async fn watch_status(State(state): State<Arc<AppState>>) -> Json<WatchStatus> {
    crate::observability::record_request();
    let status = state.watcher.status().await;
    Json(WatchStatus {
        enabled: status.enabled,
        watching_path: status.watching_path,
        project_name: status.project_name,
    })
}

pub async fn health() -> Json<Counters> {
    Json(crate::observability::snapshot())
}
