//! Shared application state wiring the catalog, the Malloy runtime boundary,
//! and the watcher together behind one `Arc`, handed to both the HTTP router
//! and the MCP router at construction (spec §9: "explicit server configuration
//! injected into the HTTP/MCP routers at construction; no process-wide mutable
//! state beyond the Project Store itself").

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::AppError;
use crate::fetcher::{DefaultPackageFetcher, PackageFetcher};
use crate::malloy::MalloyRuntime;
use crate::store::ProjectStore;
use crate::watcher::{PackageWatcher, PendingReloads};

pub struct AppState {
    pub store: ProjectStore,
    pub runtime: Arc<dyn MalloyRuntime>,
    pub watcher: PackageWatcher,
    pub pending_reloads: Arc<PendingReloads>,
    pub server_root: PathBuf,
}

impl AppState {
    pub async fn init(server_root: PathBuf, runtime: Arc<dyn MalloyRuntime>) -> Result<Arc<Self>, AppError> {
        let fetcher: Arc<dyn PackageFetcher> = Arc::new(DefaultPackageFetcher::new());
        let store = ProjectStore::init(server_root.clone(), fetcher).await?;
        Ok(Arc::new(Self {
            store,
            runtime,
            watcher: PackageWatcher::new(),
            pending_reloads: PendingReloads::new(),
            server_root,
        }))
    }
}
