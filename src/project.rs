//! Project (spec §4.6, C6): owns a connection registry and a map of loaded
//! packages. A project corresponds to one entry in `publisher.config.json`'s
//! `projects` array; its `path` is the filesystem root fetched packages are
//! resolved relative to.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::ProjectManifest;
use crate::connection::ConnectionRegistry;
use crate::error::AppError;
use crate::fetcher::PackageFetcher;
use crate::package::Package;
use crate::types::{PackageName, ProjectName};

pub struct Project {
    pub name: ProjectName,
    pub root: PathBuf,
    pub connections: ConnectionRegistry,
    packages: BTreeMap<String, Arc<Package>>,
}

impl Project {
    /// Build a project from its manifest entry, fetching every declared
    /// package location up front (spec §4.6 "projects load eagerly at
    /// startup"; per-package lazy loading is an explicit non-goal).
    pub async fn load(
        manifest: ProjectManifest,
        server_root: &std::path::Path,
        fetcher: &dyn PackageFetcher,
    ) -> Result<Self, AppError> {
        let name = ProjectName::new(manifest.name)?;
        let root = match manifest.path {
            Some(p) => server_root.join(p),
            None => server_root.join(name.as_str()),
        };

        let mut packages = BTreeMap::new();
        for pkg_manifest in manifest.packages {
            let pkg_name = PackageName::new(pkg_manifest.name)?;
            let dest = fetcher.fetch(&pkg_manifest.location, &root).await?;
            let package = Package::load(pkg_name.clone(), dest)?;
            packages.insert(pkg_name.as_str().to_string(), Arc::new(package));
        }

        Ok(Self {
            name,
            root,
            connections: ConnectionRegistry::new(manifest.connections),
            packages,
        })
    }

    pub fn list_packages(&self) -> Vec<&str> {
        self.packages.keys().map(String::as_str).collect()
    }

    pub fn get_package(&self, name: &str) -> Result<Arc<Package>, AppError> {
        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::package_not_found(name))
    }

    /// Replace one package's contents in place, used by the watcher and by
    /// explicit reload requests. Only the named package is rebuilt; sibling
    /// packages and the connection registry are untouched.
    pub async fn reload_package(
        &mut self,
        name: &str,
        location: &str,
        fetcher: &dyn PackageFetcher,
    ) -> Result<(), AppError> {
        let pkg_name = PackageName::new(name)?;
        let dest = fetcher.fetch(location, &self.root).await?;
        let package = Package::load(pkg_name, dest)?;
        self.packages.insert(name.to_string(), Arc::new(package));
        Ok(())
    }

    pub fn remove_package(&mut self, name: &str) -> Result<(), AppError> {
        self.packages
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AppError::package_not_found(name))
    }

    /// README text read from `<root>/README.md` when present (spec §4.6);
    /// falling back to the first package's manifest `description`, then to a
    /// generated summary, when the project has no README of its own.
    pub fn readme(&self) -> String {
        if let Ok(text) = std::fs::read_to_string(self.root.join("README.md")) {
            return text;
        }
        for package in self.packages.values() {
            if let Some(description) = &package.manifest.description {
                return description.clone();
            }
        }
        format!(
            "# {}\n\n{} package(s): {}",
            self.name,
            self.packages.len(),
            self.list_packages().join(", ")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PackageManifest;
    use crate::fetcher::DefaultPackageFetcher;

    fn manifest(name: &str, packages: Vec<PackageManifest>) -> ProjectManifest {
        ProjectManifest {
            name: name.to_string(),
            path: None,
            packages,
            connections: vec![],
        }
    }

    #[tokio::test]
    async fn loads_packages_eagerly() {
        let server_root = tempfile::tempdir().unwrap();
        let project_dir = server_root.path().join("home");
        let package_dir = project_dir.join("flights");
        std::fs::create_dir_all(&package_dir).unwrap();
        std::fs::write(package_dir.join("flights.malloy"), "source: flights is x").unwrap();

        let fetcher = DefaultPackageFetcher::new();
        let project = Project::load(
            manifest(
                "home",
                vec![PackageManifest {
                    name: "flights".to_string(),
                    location: package_dir.to_str().unwrap().to_string(),
                }],
            ),
            server_root.path(),
            &fetcher,
        )
        .await
        .unwrap();

        assert_eq!(project.list_packages(), vec!["flights"]);
    }

    #[tokio::test]
    async fn readme_prefers_root_markdown_file() {
        let server_root = tempfile::tempdir().unwrap();
        let project_dir = server_root.path().join("home");
        std::fs::create_dir_all(&project_dir).unwrap();
        std::fs::write(project_dir.join("README.md"), "# Home\n\nFlight data.").unwrap();

        let fetcher = DefaultPackageFetcher::new();
        let project = Project::load(manifest("home", vec![]), server_root.path(), &fetcher)
            .await
            .unwrap();
        assert_eq!(project.readme(), "# Home\n\nFlight data.");
    }

    #[tokio::test]
    async fn readme_falls_back_to_generated_summary() {
        let server_root = tempfile::tempdir().unwrap();
        let fetcher = DefaultPackageFetcher::new();
        let project = Project::load(manifest("home", vec![]), server_root.path(), &fetcher)
            .await
            .unwrap();
        assert!(project.readme().contains("0 package(s)"));
    }
}
