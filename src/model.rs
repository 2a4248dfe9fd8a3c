//! Model (spec §4.4, C4): a `.malloy` source or `.malloynb` notebook file plus
//! its lazily-compiled, cached artifact. Compilation is single-flight per model
//! so concurrent readers during a cold cache only pay for one compile, mirroring
//! the teacher's `once_cell`-backed lazy-init patterns used throughout `factory.rs`.

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::error::AppError;
use crate::malloy::{
    CompiledModelArtifact, CompiledNotebookArtifact, CompiledQuery, MalloyRuntime,
};
use crate::types::{ModelKind, ModelPath};

#[derive(Debug, Clone)]
enum CompileState<T> {
    Uncompiled,
    Compiled(T),
    Failed(String),
}

/// A single `.malloy` model file tracked by a package.
#[derive(Debug)]
pub struct Model {
    pub path: ModelPath,
    source: String,
    state: Mutex<CompileState<Arc<CompiledModelArtifact>>>,
}

impl Model {
    pub fn new(path: ModelPath, source: String) -> Self {
        Self {
            path,
            source,
            state: Mutex::new(CompileState::Uncompiled),
        }
    }

    pub fn source_text(&self) -> &str {
        &self.source
    }

    pub fn kind(&self) -> ModelKind {
        self.path.kind()
    }

    /// Compile on first access, cache on the model for the lifetime of this
    /// package snapshot. A prior failure is remembered rather than retried on
    /// every read — a new compile only happens after the file changes and the
    /// package is reloaded, producing a fresh `Model`.
    pub async fn compiled(
        &self,
        runtime: &dyn MalloyRuntime,
    ) -> Result<Arc<CompiledModelArtifact>, AppError> {
        let mut state = self.state.lock().await;
        match &*state {
            CompileState::Compiled(artifact) => return Ok(artifact.clone()),
            CompileState::Failed(message) => return Err(AppError::model_compilation_error(message.clone())),
            CompileState::Uncompiled => {}
        }

        match runtime.compile_model(&self.source, self.path.as_str()).await {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                *state = CompileState::Compiled(artifact.clone());
                Ok(artifact)
            }
            Err(err) => {
                *state = CompileState::Failed(err.kind.to_string());
                Err(err)
            }
        }
    }

    pub async fn compile_query(
        &self,
        runtime: &dyn MalloyRuntime,
        query_text: Option<&str>,
        query_name: Option<&str>,
    ) -> Result<CompiledQuery, AppError> {
        runtime
            .compile_query(&self.source, query_text, query_name)
            .await
    }
}

/// A `.malloynb` notebook, compiled the same way but producing a sequence of
/// markdown/code cells rather than a flat source/query list.
pub struct Notebook {
    pub path: ModelPath,
    source: String,
    state: Mutex<CompileState<Arc<CompiledNotebookArtifact>>>,
}

impl Notebook {
    pub fn new(path: ModelPath, source: String) -> Self {
        Self {
            path,
            source,
            state: Mutex::new(CompileState::Uncompiled),
        }
    }

    pub fn source_text(&self) -> &str {
        &self.source
    }

    pub async fn compiled(
        &self,
        runtime: &dyn MalloyRuntime,
    ) -> Result<Arc<CompiledNotebookArtifact>, AppError> {
        let mut state = self.state.lock().await;
        match &*state {
            CompileState::Compiled(artifact) => return Ok(artifact.clone()),
            CompileState::Failed(message) => return Err(AppError::model_compilation_error(message.clone())),
            CompileState::Uncompiled => {}
        }

        match runtime.compile_notebook(&self.source, self.path.as_str()).await {
            Ok(artifact) => {
                let artifact = Arc::new(artifact);
                *state = CompileState::Compiled(artifact.clone());
                Ok(artifact)
            }
            Err(err) => {
                *state = CompileState::Failed(err.kind.to_string());
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::malloy::FakeMalloyRuntime;

    #[tokio::test]
    async fn compiles_once_and_caches() {
        let path = ModelPath::new("flights.malloy").unwrap();
        let model = Model::new(path, "source: flights is duckdb.table('f')".to_string());
        let runtime = FakeMalloyRuntime::new();
        let first = model.compiled(&runtime).await.unwrap();
        let second = model.compiled(&runtime).await.unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn failed_compile_is_remembered() {
        let path = ModelPath::new("broken.malloy").unwrap();
        let model = Model::new(path, "syntax error here".to_string());
        let runtime = FakeMalloyRuntime::new();
        let err1 = model.compiled(&runtime).await.unwrap_err();
        let err2 = model.compiled(&runtime).await.unwrap_err();
        assert_eq!(err1.kind.to_string(), err2.kind.to_string());
    }
}
