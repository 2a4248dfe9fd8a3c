//! Project Store (spec §4.7, C7): the root catalog. Holds every loaded
//! project behind a per-project mutex so mutating operations against
//! different projects proceed concurrently while mutations against the same
//! project serialize, mirroring the teacher's per-resource locking in
//! `coordinated_deletion.rs`. All mutating operations are rejected outright
//! when the server is running with `frozenConfig: true`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::config::{ProjectManifest, PublisherConfig};
use crate::error::AppError;
use crate::fetcher::PackageFetcher;
use crate::project::Project;
use crate::types::ProjectName;

pub struct ProjectStore {
    server_root: PathBuf,
    frozen: bool,
    fetcher: Arc<dyn PackageFetcher>,
    projects: tokio::sync::RwLock<BTreeMap<String, Arc<Mutex<Project>>>>,
}

impl ProjectStore {
    /// Load every project declared in `publisher.config.json` up front.
    pub async fn init(
        server_root: PathBuf,
        fetcher: Arc<dyn PackageFetcher>,
    ) -> Result<Self, AppError> {
        let config = PublisherConfig::load(&server_root)
            .map_err(|e| AppError::internal(e.to_string()))?;

        let mut projects = BTreeMap::new();
        for manifest in config.projects {
            let name = manifest.name.clone();
            let project = Project::load(manifest, &server_root, fetcher.as_ref()).await?;
            projects.insert(name, Arc::new(Mutex::new(project)));
        }

        Ok(Self {
            server_root,
            frozen: config.frozen_config,
            fetcher,
            projects: tokio::sync::RwLock::new(projects),
        })
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    fn ensure_mutable(&self) -> Result<(), AppError> {
        if self.frozen {
            return Err(AppError::frozen_config());
        }
        Ok(())
    }

    pub async fn list_projects(&self) -> Vec<String> {
        self.projects.read().await.keys().cloned().collect()
    }

    /// The shared handle for one project's mutex. Callers lock it themselves,
    /// which lets async work (compiling a model, running a query) happen while
    /// holding the guard without this method's future owning it.
    pub async fn project_handle(&self, name: &str) -> Result<Arc<Mutex<Project>>, AppError> {
        self.projects
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::project_not_found(name))
    }

    /// Run `f` against the named project's locked state. The returned future
    /// holds only that project's mutex, so calls against different projects
    /// never block one another.
    pub async fn with_project<F, T>(&self, name: &str, f: F) -> Result<T, AppError>
    where
        F: FnOnce(&Project) -> Result<T, AppError>,
    {
        let handle = self.project_handle(name).await?;
        let project = handle.lock().await;
        f(&project)
    }

    pub async fn add_project(&self, manifest: ProjectManifest) -> Result<(), AppError> {
        self.ensure_mutable()?;
        let name = ProjectName::new(manifest.name.clone())?;
        let mut projects = self.projects.write().await;
        if projects.contains_key(name.as_str()) {
            return Err(AppError::bad_request(format!(
                "project '{}' already exists",
                name
            )));
        }
        let project = Project::load(manifest, &self.server_root, self.fetcher.as_ref()).await?;
        projects.insert(name.as_str().to_string(), Arc::new(Mutex::new(project)));
        Ok(())
    }

    pub async fn delete_project(&self, name: &str) -> Result<(), AppError> {
        self.ensure_mutable()?;
        let mut projects = self.projects.write().await;
        let project = projects.remove(name).ok_or_else(|| AppError::project_not_found(name))?;
        // Close connection handles explicitly (spec §3: "closed on project
        // delete/reload") rather than relying on `Drop` once the last `Arc`
        // reference to this project goes away.
        project.lock().await.connections.close_all().await;
        Ok(())
    }

    pub async fn reload_package(
        &self,
        project_name: &str,
        package_name: &str,
        location: &str,
    ) -> Result<(), AppError> {
        self.ensure_mutable()?;
        let handle = self.project_handle(project_name).await?;
        let mut project = handle.lock().await;
        project
            .reload_package(package_name, location, self.fetcher.as_ref())
            .await?;
        crate::observability::record_reload();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetcher::DefaultPackageFetcher;

    async fn empty_store(frozen_config: bool) -> (tempfile::TempDir, ProjectStore) {
        let dir = tempfile::tempdir().unwrap();
        let config = serde_json::json!({ "frozenConfig": frozen_config, "projects": [] });
        std::fs::write(
            dir.path().join("publisher.config.json"),
            config.to_string(),
        )
        .unwrap();
        let store = ProjectStore::init(
            dir.path().to_path_buf(),
            Arc::new(DefaultPackageFetcher::new()),
        )
        .await
        .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_project_is_rejected_when_frozen() {
        let (_dir, store) = empty_store(true).await;
        let err = store
            .add_project(ProjectManifest {
                name: "p".to_string(),
                path: None,
                packages: vec![],
                connections: vec![],
            })
            .await
            .unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::FrozenConfig));
    }

    #[tokio::test]
    async fn add_and_delete_project_round_trip() {
        let (_dir, store) = empty_store(false).await;
        store
            .add_project(ProjectManifest {
                name: "p".to_string(),
                path: None,
                packages: vec![],
                connections: vec![],
            })
            .await
            .unwrap();
        assert_eq!(store.list_projects().await, vec!["p".to_string()]);
        store.delete_project("p").await.unwrap();
        assert!(store.list_projects().await.is_empty());
    }

    #[tokio::test]
    async fn unknown_project_lookup_is_not_found() {
        let (_dir, store) = empty_store(false).await;
        let err = store.with_project("missing", |_| Ok(())).await.unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::ProjectNotFound(_)));
    }
}
