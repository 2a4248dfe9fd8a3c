//! Package Fetcher (spec §4.2, C2): resolves a package manifest's `location`
//! string into a local directory the rest of the catalog can read. Local paths
//! and `.zip` archives are fully implemented; `git`/`https` locations clone
//! through `git2`. `gs://`/`s3://` are declared in the scheme dispatch but
//! return `NotImplemented` — the spec treats remote object storage as an
//! interface-only contract, not a feature to vendor cloud SDKs for.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::AppError;

#[async_trait]
pub trait PackageFetcher: Send + Sync {
    /// Fetch `location` into a directory under `dest_root` and return that
    /// directory's path. Implementations are free to reuse a prior checkout
    /// when `location` is unchanged.
    async fn fetch(&self, location: &str, dest_root: &Path) -> Result<PathBuf, AppError>;
}

pub struct DefaultPackageFetcher;

impl DefaultPackageFetcher {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DefaultPackageFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PackageFetcher for DefaultPackageFetcher {
    async fn fetch(&self, location: &str, dest_root: &Path) -> Result<PathBuf, AppError> {
        if let Some(path) = location.strip_prefix("file://") {
            return fetch_local(Path::new(path));
        }
        if location.starts_with("gs://") || location.starts_with("s3://") {
            return Err(AppError::not_implemented(format!(
                "object storage package locations are not supported: {location}"
            )));
        }
        if location.ends_with(".zip") {
            return fetch_zip(location, dest_root).await;
        }
        if location.starts_with("git@")
            || location.starts_with("git://")
            || location.starts_with("https://")
            || location.ends_with(".git")
        {
            return fetch_git(location, dest_root).await;
        }
        fetch_local(Path::new(location))
    }
}

fn fetch_local(path: &Path) -> Result<PathBuf, AppError> {
    if !path.exists() {
        return Err(AppError::bad_request(format!(
            "package location does not exist: {}",
            path.display()
        )));
    }
    Ok(path.to_path_buf())
}

async fn fetch_zip(location: &str, dest_root: &Path) -> Result<PathBuf, AppError> {
    let location = location.to_string();
    let dest_root = dest_root.to_path_buf();
    tokio::task::spawn_blocking(move || fetch_zip_blocking(&location, &dest_root))
        .await
        .map_err(|e| AppError::internal(format!("join error: {e}")))?
}

fn fetch_zip_blocking(location: &str, dest_root: &Path) -> Result<PathBuf, AppError> {
    let archive_path = Path::new(location);
    let file = std::fs::File::open(archive_path)
        .map_err(|e| AppError::bad_request(format!("cannot open zip archive {location}: {e}")))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| AppError::bad_request(format!("invalid zip archive {location}: {e}")))?;

    let dest = dest_root.join(sanitize_dirname(location));
    std::fs::create_dir_all(&dest)
        .map_err(|e| AppError::internal(format!("creating extraction dir: {e}")))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| AppError::bad_request(format!("reading zip entry: {e}")))?;
        let Some(entry_path) = entry.enclosed_name() else {
            continue;
        };
        let out_path = dest.join(entry_path);
        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| AppError::internal(format!("creating dir: {e}")))?;
        } else {
            if let Some(parent) = out_path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| AppError::internal(format!("creating dir: {e}")))?;
            }
            let mut out_file = std::fs::File::create(&out_path)
                .map_err(|e| AppError::internal(format!("writing extracted file: {e}")))?;
            std::io::copy(&mut entry, &mut out_file)
                .map_err(|e| AppError::internal(format!("writing extracted file: {e}")))?;
        }
    }

    Ok(dest)
}

async fn fetch_git(location: &str, dest_root: &Path) -> Result<PathBuf, AppError> {
    let location = location.to_string();
    let dest_root = dest_root.to_path_buf();
    tokio::task::spawn_blocking(move || fetch_git_blocking(&location, &dest_root))
        .await
        .map_err(|e| AppError::internal(format!("join error: {e}")))?
}

fn fetch_git_blocking(location: &str, dest_root: &Path) -> Result<PathBuf, AppError> {
    let dest = dest_root.join(sanitize_dirname(location));
    if dest.exists() {
        let repo = git2::Repository::open(&dest)
            .map_err(|e| AppError::connection_error(format!("opening checkout: {e}")))?;
        let mut remote = repo
            .find_remote("origin")
            .map_err(|e| AppError::connection_error(format!("finding remote: {e}")))?;
        remote
            .fetch(&["HEAD"], None, None)
            .map_err(|e| AppError::connection_error(format!("git fetch failed: {e}")))?;
        return Ok(dest);
    }

    git2::Repository::clone(location, &dest)
        .map_err(|e| AppError::connection_error(format!("git clone failed: {e}")))?;
    Ok(dest)
}

fn sanitize_dirname(location: &str) -> String {
    location
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn local_path_passes_through() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = DefaultPackageFetcher::new();
        let result = fetcher
            .fetch(dir.path().to_str().unwrap(), dir.path())
            .await
            .unwrap();
        assert_eq!(result, dir.path());
    }

    #[tokio::test]
    async fn missing_local_path_is_bad_request() {
        let fetcher = DefaultPackageFetcher::new();
        let err = fetcher
            .fetch("/nonexistent/does/not/exist", Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::BadRequest(_)));
    }

    #[tokio::test]
    async fn object_storage_scheme_is_not_implemented() {
        let fetcher = DefaultPackageFetcher::new();
        let err = fetcher
            .fetch("gs://bucket/path", Path::new("/tmp"))
            .await
            .unwrap_err();
        assert!(matches!(err.kind, crate::error::Kind::NotImplemented(_)));
    }
}
