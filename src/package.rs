//! Package (spec §4.5, C5): a directory rooted at a fetched package location,
//! holding discovered `.malloy`/`.malloynb` models plus an optional
//! `publisher.json` manifest describing databases and schedules. Discovery
//! walks the tree once at load time; nothing here watches the filesystem —
//! that is the watcher's job (`watcher.rs`).

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::connection::{inspect_data_file, DatabaseInfo};
use crate::error::AppError;
use crate::model::{Model, Notebook};
use crate::types::{ModelKind, ModelPath, PackageName};

const MANIFEST_FILE_NAME: &str = "publisher.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PackageManifestFile {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub databases: Vec<DatabaseEntry>,
    #[serde(default)]
    pub schedules: Vec<ScheduleEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseEntry {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub connection_name: Option<String>,
}

/// A database as reported by `listDatabases` (spec §3): the manifest entry
/// plus schema and row count derived by actually reading the file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Database {
    pub name: String,
    pub path: String,
    pub info: DatabaseInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEntry {
    pub resource: String,
    pub cron: String,
    #[serde(default)]
    pub connection_name: Option<String>,
}

/// A loaded package: its models/notebooks keyed by their relative path, plus
/// the parsed manifest (or the default, empty one, if `publisher.json` is
/// absent — manifests are optional per spec §4.5).
pub struct Package {
    pub name: PackageName,
    pub root: std::path::PathBuf,
    pub manifest: PackageManifestFile,
    models: BTreeMap<String, Model>,
    notebooks: BTreeMap<String, Notebook>,
}

impl Package {
    /// Discover models/notebooks under `root` and parse `publisher.json` if present.
    pub fn load(name: PackageName, root: std::path::PathBuf) -> Result<Self, AppError> {
        let manifest = load_manifest(&root)?;
        let mut models = BTreeMap::new();
        let mut notebooks = BTreeMap::new();

        for entry in walk_files(&root) {
            let relative = entry
                .strip_prefix(&root)
                .unwrap_or(&entry)
                .to_string_lossy()
                .replace('\\', "/");

            let path = match ModelPath::new(relative.clone()) {
                Ok(p) => p,
                Err(_) => continue,
            };

            let is_model = relative.ends_with(".malloy");
            let is_notebook = relative.ends_with(".malloynb");
            if !is_model && !is_notebook {
                continue;
            }

            let source = std::fs::read_to_string(&entry)
                .map_err(|e| AppError::internal(format!("reading {relative}: {e}")))?;

            match path.kind() {
                ModelKind::Model => {
                    models.insert(relative, Model::new(path, source));
                }
                ModelKind::Notebook => {
                    notebooks.insert(relative, Notebook::new(path, source));
                }
            }
        }

        Ok(Self {
            name,
            root,
            manifest,
            models,
            notebooks,
        })
    }

    pub fn list_model_paths(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }

    pub fn list_notebook_paths(&self) -> Vec<&str> {
        self.notebooks.keys().map(String::as_str).collect()
    }

    pub fn get_model(&self, path: &str) -> Result<&Model, AppError> {
        self.models.get(path).ok_or_else(|| AppError::model_not_found(path))
    }

    pub fn get_notebook(&self, path: &str) -> Result<&Notebook, AppError> {
        self.notebooks
            .get(path)
            .ok_or_else(|| AppError::model_not_found(path))
    }

    /// Raw file text for any tracked model or notebook, used by the
    /// `malloy_modelGetText` MCP tool and the matching HTTP endpoint.
    pub fn get_model_file_text(&self, path: &str) -> Result<&str, AppError> {
        if let Some(model) = self.models.get(path) {
            return Ok(model.source_text());
        }
        if let Some(notebook) = self.notebooks.get(path) {
            return Ok(notebook.source_text());
        }
        Err(AppError::model_not_found(path))
    }

    /// Walk the manifest's declared database entries and read each file's
    /// schema and row count (spec §4.5: "walks embedded `.parquet`/sqlite/etc.
    /// and collects schema+rowCount"). Entries whose file is missing or whose
    /// format this server can't introspect are logged and skipped rather than
    /// failing the whole listing.
    pub async fn list_databases(&self) -> Vec<Database> {
        let mut out = Vec::with_capacity(self.manifest.databases.len());
        for entry in &self.manifest.databases {
            let full_path = self.root.join(&entry.path);
            match inspect_data_file(full_path).await {
                Ok(info) => out.push(Database {
                    name: entry.name.clone(),
                    path: entry.path.clone(),
                    info,
                }),
                Err(e) => {
                    tracing::warn!(database = %entry.name, path = %entry.path, error = %e, "skipping database entry");
                }
            }
        }
        out
    }

    pub fn list_schedules(&self) -> &[ScheduleEntry] {
        &self.manifest.schedules
    }
}

fn load_manifest(root: &Path) -> Result<PackageManifestFile, AppError> {
    let manifest_path = root.join(MANIFEST_FILE_NAME);
    if !manifest_path.exists() {
        return Ok(PackageManifestFile::default());
    }
    let raw = std::fs::read_to_string(&manifest_path)
        .map_err(|e| AppError::internal(format!("reading {MANIFEST_FILE_NAME}: {e}")))?;
    serde_json::from_str(&raw)
        .map_err(|e| AppError::bad_request(format!("invalid {MANIFEST_FILE_NAME}: {e}")))
}

fn walk_files(root: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PackageName;

    #[test]
    fn discovers_models_and_notebooks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("flights.malloy"), "source: flights is x").unwrap();
        std::fs::write(dir.path().join("analysis.malloynb"), "# hi").unwrap();

        let pkg = Package::load(PackageName::new("flights").unwrap(), dir.path().to_path_buf()).unwrap();
        assert_eq!(pkg.list_model_paths(), vec!["flights.malloy"]);
        assert_eq!(pkg.list_notebook_paths(), vec!["analysis.malloynb"]);
    }

    #[tokio::test]
    async fn missing_manifest_yields_default() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = Package::load(PackageName::new("p").unwrap(), dir.path().to_path_buf()).unwrap();
        assert!(pkg.list_databases().await.is_empty());
        assert!(pkg.list_schedules().is_empty());
    }

    #[tokio::test]
    async fn parses_manifest_databases_and_schedules() {
        let dir = tempfile::tempdir().unwrap();
        let path_str = dir.path().join("flights.parquet").to_str().unwrap().to_string();
        tokio::task::spawn_blocking(move || {
            let conn = duckdb::Connection::open_in_memory().unwrap();
            conn.execute(
                &format!("COPY (SELECT 1 AS id, 'AA' AS carrier) TO '{path_str}' (FORMAT PARQUET)"),
                [],
            )
            .unwrap();
        })
        .await
        .unwrap();
        std::fs::write(
            dir.path().join("publisher.json"),
            r#"{"databases": [{"name": "flights", "path": "flights.parquet"}], "schedules": [{"resource": "flights.malloy", "cron": "0 * * * *"}]}"#,
        )
        .unwrap();
        let pkg = Package::load(PackageName::new("p").unwrap(), dir.path().to_path_buf()).unwrap();
        let databases = pkg.list_databases().await;
        assert_eq!(databases.len(), 1);
        assert_eq!(databases[0].info.row_count, 1);
        assert_eq!(databases[0].info.columns.len(), 2);
        assert_eq!(pkg.list_schedules()[0].cron, "0 * * * *");
    }

    #[tokio::test]
    async fn unreadable_database_entry_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("publisher.json"),
            r#"{"databases": [{"name": "missing", "path": "does_not_exist.parquet"}]}"#,
        )
        .unwrap();
        let pkg = Package::load(PackageName::new("p").unwrap(), dir.path().to_path_buf()).unwrap();
        assert!(pkg.list_databases().await.is_empty());
    }

    #[test]
    fn unknown_model_path_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = Package::load(PackageName::new("p").unwrap(), dir.path().to_path_buf()).unwrap();
        let err = pkg.get_model("missing.malloy").unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::ModelNotFound(_)));
    }
}
