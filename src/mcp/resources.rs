//! MCP resource providers (spec §4.11). Every resource except
//! `package-contents` is wrapped `{ definition, metadata }`; `package-contents`
//! is the bare array. Errors are never raw text — always the structured
//! `{ error, suggestions }` payload from [`crate::error::AppError::to_mcp_payload`].

use serde_json::json;

use crate::error::AppError;
use crate::state::AppState;

use super::types::{ContentItem, ResourceResult};
use super::uri::MalloyUri;

pub async fn read_resource(state: &AppState, uri: &str) -> ResourceResult {
    match read_resource_inner(state, uri).await {
        Ok(item) => ResourceResult {
            contents: vec![item],
            is_error: false,
        },
        Err(err) => ResourceResult {
            contents: vec![ContentItem::json(uri, &err.to_mcp_payload())],
            is_error: true,
        },
    }
}

async fn read_resource_inner(state: &AppState, uri: &str) -> Result<ContentItem, AppError> {
    let parsed = MalloyUri::parse(uri)?;

    match parsed {
        MalloyUri::Project { project } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let definition = json!({ "name": project, "packages": guard.list_packages() });
            Ok(ContentItem::json(uri, &wrapped(definition)))
        }
        MalloyUri::Package { project, package } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let definition = json!({
                "name": package,
                "models": pkg.list_model_paths(),
                "notebooks": pkg.list_notebook_paths(),
            });
            Ok(ContentItem::json(uri, &wrapped(definition)))
        }
        MalloyUri::PackageContents { project, package } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let mut items = Vec::new();
            for path in pkg.list_model_paths() {
                items.push(json!({ "type": "model", "uri": MalloyUri::Model {
                    project: project.clone(), package: package.clone(), model_path: path.to_string(),
                }.build() }));
            }
            for path in pkg.list_notebook_paths() {
                items.push(json!({ "type": "notebook", "uri": MalloyUri::Notebook {
                    project: project.clone(), package: package.clone(), notebook_path: path.to_string(),
                }.build() }));
            }
            Ok(ContentItem::json(uri, &serde_json::Value::Array(items)))
        }
        MalloyUri::Model {
            project,
            package,
            model_path,
        } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let model = pkg.get_model(&model_path)?;
            let compiled = model.compiled(state.runtime.as_ref()).await?;
            let definition = json!({
                "sources": compiled.sources,
                "queries": compiled.queries,
                "dialect": compiled.dialect,
            });
            Ok(ContentItem::json(uri, &wrapped(definition)))
        }
        MalloyUri::Notebook {
            project,
            package,
            notebook_path,
        } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let notebook = pkg.get_notebook(&notebook_path)?;
            let compiled = notebook.compiled(state.runtime.as_ref()).await?;
            let definition = json!({ "cells": compiled.cells });
            Ok(ContentItem::json(uri, &wrapped(definition)))
        }
        MalloyUri::Source {
            project,
            package,
            model_path,
            source,
        } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let model = pkg.get_model(&model_path)?;
            let compiled = model.compiled(state.runtime.as_ref()).await?;
            let found = compiled
                .sources
                .iter()
                .find(|s| s.name == source)
                .ok_or_else(|| AppError::malloy_error(format!("Source not found: {source}")))?;
            Ok(ContentItem::json(uri, &wrapped(json!(found))))
        }
        MalloyUri::Query {
            project,
            package,
            model_path,
            query,
        } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let model = pkg.get_model(&model_path)?;
            let compiled = model.compiled(state.runtime.as_ref()).await?;
            if !compiled.queries.iter().any(|q| q == &query) {
                return Err(AppError::malloy_error(format!("Query not found: {query}")));
            }
            Ok(ContentItem::json(uri, &wrapped(json!({ "name": query }))))
        }
        MalloyUri::View {
            project,
            package,
            model_path,
            source,
            view,
        } => {
            let handle = state.store.project_handle(&project).await?;
            let guard = handle.lock().await;
            let pkg = guard.get_package(&package)?;
            let model = pkg.get_model(&model_path)?;
            let compiled = model.compiled(state.runtime.as_ref()).await?;
            let found = compiled
                .sources
                .iter()
                .find(|s| s.name == source)
                .ok_or_else(|| AppError::malloy_error(format!("Source not found: {source}")))?;
            if !found.views.iter().any(|v| v == &view) {
                return Err(AppError::malloy_error(format!("View not found: {view}")));
            }
            Ok(ContentItem::json(uri, &wrapped(json!({ "name": view }))))
        }
    }
}

fn wrapped(definition: serde_json::Value) -> serde_json::Value {
    json!({ "definition": definition, "metadata": {} })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malloy::FakeMalloyRuntime;
    use std::sync::Arc;

    async fn state_with_package() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let pkg_dir = dir.path().join("home").join("faa");
        std::fs::create_dir_all(&pkg_dir).unwrap();
        std::fs::write(
            pkg_dir.join("flights.malloy"),
            "source: flights is duckdb.table('f')\nview: by_carrier is x",
        )
        .unwrap();
        let config = serde_json::json!({
            "frozenConfig": false,
            "projects": [{
                "name": "home",
                "packages": [{ "name": "faa", "location": pkg_dir.to_str().unwrap() }],
            }],
        });
        std::fs::write(dir.path().join("publisher.config.json"), config.to_string()).unwrap();
        let state = AppState::init(dir.path().to_path_buf(), Arc::new(FakeMalloyRuntime::new()))
            .await
            .unwrap();
        (dir, state)
    }

    #[tokio::test]
    async fn reads_package_resource() {
        let (_dir, state) = state_with_package().await;
        let result = read_resource(&state, "malloy://project/home/package/faa").await;
        assert!(!result.is_error);
    }

    #[tokio::test]
    async fn nonexistent_package_is_error_with_suggestions() {
        let (_dir, state) = state_with_package().await;
        let result = read_resource(&state, "malloy://project/home/package/nonexistent").await;
        assert!(result.is_error);
        let payload: serde_json::Value = serde_json::from_str(&result.contents[0].text).unwrap();
        assert!(payload["error"].as_str().unwrap().starts_with("Resource not found: Package"));
    }
}
