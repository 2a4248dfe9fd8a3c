//! Query Executor (spec §4.9, C9): resolves an ad-hoc or named query against
//! a model, compiles it through the Malloy runtime boundary, runs it against
//! the target connection, and truncates the result to [`crate::types::ROW_LIMIT`]
//! rows. Every execution accepts a [`CancellationToken`] so an HTTP client
//! disconnect or an MCP request cancellation can abort mid-flight.

use tokio_util::sync::CancellationToken;

use crate::connection::{ConnectionRegistry, QueryOptions};
use crate::error::AppError;
use crate::malloy::{MalloyRuntime, QueryResult};
use crate::model::Model;
use crate::types::ROW_LIMIT;

#[derive(Debug, Clone, Default)]
pub struct ExecuteQueryRequest {
    pub query: Option<String>,
    pub query_name: Option<String>,
}

impl ExecuteQueryRequest {
    /// Exactly one of `query`/`queryName` must be set (spec §4.9 "XOR").
    fn validate(&self) -> Result<(), AppError> {
        match (&self.query, &self.query_name) {
            (Some(_), Some(_)) => Err(AppError::bad_request(
                "Cannot provide both 'query' and 'queryName'",
            )),
            (None, None) => Err(AppError::bad_request(
                "Must provide either 'query' or 'queryName'",
            )),
            _ => Ok(()),
        }
    }
}

pub async fn execute(
    model: &Model,
    runtime: &dyn MalloyRuntime,
    connections: &ConnectionRegistry,
    request: ExecuteQueryRequest,
    cancellation: CancellationToken,
) -> Result<QueryResult, AppError> {
    request.validate()?;

    if cancellation.is_cancelled() {
        return Err(AppError::bad_request("query cancelled before execution"));
    }

    let compiled = tokio::select! {
        result = model.compile_query(runtime, request.query.as_deref(), request.query_name.as_deref()) => result?,
        _ = cancellation.cancelled() => return Err(AppError::bad_request("query cancelled during compilation")),
    };

    let rows = tokio::select! {
        result = connections.query_data(
            (&compiled.connection_name[..]).into(),
            &compiled.sql,
            QueryOptions { row_limit: Some(ROW_LIMIT + 1) },
        ) => result?,
        _ = cancellation.cancelled() => return Err(AppError::bad_request("query cancelled during execution")),
    };

    let truncated = rows.len() > ROW_LIMIT;
    let rows = if truncated {
        rows.into_iter().take(ROW_LIMIT).collect()
    } else {
        rows
    };
    let total_rows_returned = rows.len();

    Ok(QueryResult {
        rows,
        total_rows_returned,
        truncated,
    })
}
