//! Error taxonomy shared by the catalog, the query executor, the HTTP surface and
//! the MCP surface (spec §7). Every fallible catalog operation returns
//! `Result<T, AppError>`; the HTTP and MCP routers are the only places that map a
//! `Kind` to a transport-specific envelope.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json};
use serde::Serialize;

/// The error taxonomy. Each variant names exactly one table row in spec §7.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Kind {
    #[error("{0}")]
    BadRequest(String),

    #[error("Server configuration is frozen; mutating operations are disabled")]
    FrozenConfig,

    #[error("Resource not found: project '{0}'")]
    ProjectNotFound(String),

    #[error("Resource not found: Package '{0}'")]
    PackageNotFound(String),

    #[error("Resource not found: Model '{0}'")]
    ModelNotFound(String),

    #[error("Resource not found: Connection '{0}'")]
    ConnectionNotFound(String),

    #[error("Model compilation failed: {0}")]
    ModelCompilationError(String),

    #[error("{0}")]
    MalloyError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Not implemented: {0}")]
    NotImplemented(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// An error carrying its `Kind` plus curated remediation suggestions. The
/// suggestions list is populated by [`classify_suggestions`] for the kinds that
/// wrap a Malloy compile/run failure; it is empty for plain catalog errors.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}")]
pub struct AppError {
    pub kind: Kind,
    pub suggestions: Vec<String>,
}

impl AppError {
    pub fn new(kind: Kind) -> Self {
        let suggestions = match &kind {
            Kind::ModelCompilationError(msg) | Kind::MalloyError(msg) => {
                classify_suggestions(msg)
            }
            Kind::ProjectNotFound(_) => {
                vec!["Check the project name against GET /api/v0/projects.".to_string()]
            }
            Kind::PackageNotFound(_) => {
                vec!["Check the package name against the project's package list.".to_string()]
            }
            Kind::ModelNotFound(_) => {
                vec!["Check the model path and that it has the expected .malloy/.malloynb extension.".to_string()]
            }
            Kind::ConnectionNotFound(_) => {
                vec!["Check the connection name against the project's connection list.".to_string()]
            }
            _ => Vec::new(),
        };
        Self { kind, suggestions }
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(Kind::BadRequest(msg.into()))
    }

    pub fn frozen_config() -> Self {
        Self::new(Kind::FrozenConfig)
    }

    pub fn project_not_found(name: impl Into<String>) -> Self {
        Self::new(Kind::ProjectNotFound(name.into()))
    }

    pub fn package_not_found(name: impl Into<String>) -> Self {
        Self::new(Kind::PackageNotFound(name.into()))
    }

    pub fn model_not_found(path: impl Into<String>) -> Self {
        Self::new(Kind::ModelNotFound(path.into()))
    }

    pub fn connection_not_found(name: impl Into<String>) -> Self {
        Self::new(Kind::ConnectionNotFound(name.into()))
    }

    pub fn model_compilation_error(msg: impl Into<String>) -> Self {
        Self::new(Kind::ModelCompilationError(msg.into()))
    }

    pub fn malloy_error(msg: impl Into<String>) -> Self {
        Self::new(Kind::MalloyError(msg.into()))
    }

    pub fn connection_error(msg: impl Into<String>) -> Self {
        Self::new(Kind::ConnectionError(msg.into()))
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self::new(Kind::NotImplemented(msg.into()))
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(Kind::Internal(msg.into()))
    }

    /// HTTP status code per the spec §7 mapping table.
    pub fn http_status(&self) -> StatusCode {
        match &self.kind {
            Kind::BadRequest(_) => StatusCode::BAD_REQUEST,
            Kind::FrozenConfig => StatusCode::FORBIDDEN,
            Kind::ProjectNotFound(_)
            | Kind::PackageNotFound(_)
            | Kind::ModelNotFound(_)
            | Kind::ConnectionNotFound(_) => StatusCode::NOT_FOUND,
            Kind::ModelCompilationError(_) => StatusCode::from_u16(424).unwrap(),
            Kind::MalloyError(_) => StatusCode::BAD_REQUEST,
            Kind::ConnectionError(_) => StatusCode::BAD_GATEWAY,
            Kind::NotImplemented(_) => StatusCode::NOT_IMPLEMENTED,
            Kind::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The numeric `code` field of the HTTP error body.
    pub fn http_code(&self) -> u16 {
        self.http_status().as_u16()
    }

    /// MCP JSON-RPC code. Only `BadRequest` (protocol-level parameter violations)
    /// maps to the standard `InvalidParams`; everything else is an application
    /// error surfaced through the resource/tool error payload, not the RPC
    /// envelope, so it carries `InternalError` when an RPC code is required at all.
    pub fn mcp_rpc_code(&self) -> i32 {
        match &self.kind {
            Kind::BadRequest(_) => mcp_error_codes::INVALID_PARAMS,
            _ => mcp_error_codes::INTERNAL_ERROR,
        }
    }

    /// The `{error, suggestions}` JSON payload used by MCP resource/tool error
    /// responses (spec §7 "MCP resource get").
    pub fn to_mcp_payload(&self) -> serde_json::Value {
        serde_json::json!({
            "error": self.kind.to_string(),
            "suggestions": self.suggestions,
        })
    }
}

pub mod mcp_error_codes {
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
}

#[derive(Debug, Serialize)]
struct HttpErrorBody {
    code: u16,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        crate::observability::record_error();
        let status = self.http_status();
        let body = HttpErrorBody {
            code: status.as_u16(),
            message: self.kind.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Curate remediation suggestions from common Malloy compile/run failure
/// patterns (spec §7 "suggestions array curated from common patterns").
fn classify_suggestions(message: &str) -> Vec<String> {
    let lower = message.to_lowercase();
    let mut suggestions = Vec::new();

    if lower.contains("view not found") || lower.contains("unknown view") {
        suggestions.push("Check that the view name matches one defined on the source.".into());
    }
    if lower.contains("source not found") || lower.contains("unknown source") {
        suggestions.push("Check that the source name matches one exported by the model.".into());
    }
    if lower.contains("field not found") || lower.contains("unknown field") {
        suggestions.push("Verify the field name against the source's column list.".into());
    }
    if lower.contains("reference") && lower.contains("undefined") {
        suggestions.push("Check for typos in referenced names and that imports are correct.".into());
    }
    if lower.contains("syntax error") || lower.contains("parse error") {
        suggestions.push("Review the Malloy syntax near the reported line and column.".into());
    }
    if lower.contains("connection") {
        suggestions.push("Verify the connection name and credentials configured for this project.".into());
    }
    if lower.contains("invalid request") || lower.contains("bad request") {
        suggestions.push("Double-check the request parameters against the API documentation.".into());
    }

    if suggestions.is_empty() {
        suggestions.push("Review the model source for the reported error.".into());
    }
    suggestions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_mapping_matches_spec_table() {
        assert_eq!(AppError::bad_request("x").http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::frozen_config().http_status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::project_not_found("p").http_status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::package_not_found("p").http_status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::model_not_found("p").http_status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::connection_not_found("p").http_status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::model_compilation_error("x").http_status().as_u16(), 424);
        assert_eq!(AppError::malloy_error("x").http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(AppError::connection_error("x").http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(AppError::not_implemented("x").http_status(), StatusCode::NOT_IMPLEMENTED);
        assert_eq!(AppError::internal("x").http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn suggestions_are_curated_for_view_not_found() {
        let err = AppError::malloy_error("View not found: by_carrier");
        assert!(!err.suggestions.is_empty());
        assert!(err.suggestions[0].to_lowercase().contains("view"));
    }

    #[test]
    fn bad_request_maps_to_invalid_params_rpc_code() {
        assert_eq!(AppError::bad_request("x").mcp_rpc_code(), mcp_error_codes::INVALID_PARAMS);
    }
}
