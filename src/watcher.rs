//! Watcher (spec §4.8, C8): one recursive filesystem watch per running
//! server, debounced so a burst of saves collapses into a single reload per
//! package. Grounded on the teacher's declared-but-dormant `notify` dependency;
//! the debounce coalescing loop itself is bespoke to this spec (§5, §8).

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::{mpsc, Mutex};

use crate::error::AppError;
use crate::types::WATCH_DEBOUNCE_MS;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    pub project_name: String,
    pub package_name: String,
}

/// Extensions that trigger a reload; anything else under the watched root is
/// ignored (spec §4.8: "ignoring files that are not `.malloy`, `.malloynb`,
/// or `.md`").
const WATCHED_EXTENSIONS: &[&str] = &["malloy", "malloynb", "md"];

fn touches_watched_extension(event: &notify::Event) -> bool {
    event.paths.iter().any(|path| {
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| WATCHED_EXTENSIONS.contains(&ext))
    })
}

/// A single active watch. Starting a second watch while one is running
/// replaces it, since the spec treats "one active watcher per server" as an
/// invariant rather than supporting overlapping watches.
pub struct PackageWatcher {
    inner: Mutex<Option<WatchHandle>>,
}

struct WatchHandle {
    _watcher: RecommendedWatcher,
    stop: mpsc::Sender<()>,
    root: PathBuf,
    project_name: String,
}

/// Snapshot returned by `getWatchStatus` (spec §4.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchStatus {
    pub enabled: bool,
    pub watching_path: Option<String>,
    pub project_name: Option<String>,
}

impl PackageWatcher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(None),
        }
    }

    pub async fn is_running(&self) -> bool {
        self.inner.lock().await.is_some()
    }

    pub async fn status(&self) -> WatchStatus {
        match self.inner.lock().await.as_ref() {
            Some(handle) => WatchStatus {
                enabled: true,
                watching_path: Some(handle.root.display().to_string()),
                project_name: Some(handle.project_name.clone()),
            },
            None => WatchStatus {
                enabled: false,
                watching_path: None,
                project_name: None,
            },
        }
    }

    /// Start watching `root` recursively. `project_name`/`package_name` are
    /// echoed back on every coalesced reload event so the caller can route it
    /// to the right project/package without re-deriving it from the path.
    pub async fn start(
        &self,
        root: PathBuf,
        project_name: String,
        package_name: String,
        on_reload: mpsc::Sender<ReloadEvent>,
    ) -> Result<(), AppError> {
        let mut guard = self.inner.lock().await;

        let (raw_tx, mut raw_rx) = mpsc::channel::<notify::Result<notify::Event>>(256);
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res| {
            let _ = raw_tx.blocking_send(res);
        })
        .map_err(|e| AppError::internal(format!("creating watcher: {e}")))?;

        watcher
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|e| AppError::internal(format!("watching {}: {e}", root.display())))?;

        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);

        let task_project_name = project_name.clone();
        tokio::spawn(async move {
            let project_name = task_project_name;
            let mut pending = false;
            loop {
                tokio::select! {
                    _ = stop_rx.recv() => break,
                    event = raw_rx.recv() => {
                        match event {
                            Some(Ok(ev)) if touches_watched_extension(&ev) => pending = true,
                            Some(Ok(_)) | Some(Err(_)) => {}
                            None => break,
                        }
                        if !pending {
                            continue;
                        }
                        // Debounce window: drain any further events that land within it,
                        // then fire exactly one reload for this burst.
                        tokio::select! {
                            _ = tokio::time::sleep(Duration::from_millis(WATCH_DEBOUNCE_MS)) => {}
                            _ = stop_rx.recv() => break,
                        }
                        while raw_rx.try_recv().is_ok() {}
                        pending = false;
                        if on_reload
                            .send(ReloadEvent {
                                project_name: project_name.clone(),
                                package_name: package_name.clone(),
                            })
                            .await
                            .is_err()
                        {
                            break;
                        }
                    }
                }
            }
        });

        *guard = Some(WatchHandle {
            _watcher: watcher,
            stop: stop_tx,
            root,
            project_name,
        });
        Ok(())
    }

    pub async fn stop(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(handle) = guard.take() {
            let _ = handle.stop.send(()).await;
        }
    }
}

impl Default for PackageWatcher {
    fn default() -> Self {
        Self::new()
    }
}

/// Tracks which `(project, package)` pairs have an outstanding reload so a
/// store-level dispatcher can fold duplicate events before calling
/// `ProjectStore::reload_package`.
pub struct PendingReloads {
    seen: Mutex<HashSet<(String, String)>>,
}

impl PendingReloads {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            seen: Mutex::new(HashSet::new()),
        })
    }

    pub async fn mark(&self, event: &ReloadEvent) -> bool {
        let mut seen = self.seen.lock().await;
        seen.insert((event.project_name.clone(), event.package_name.clone()))
    }

    pub async fn clear(&self, event: &ReloadEvent) {
        self.seen
            .lock()
            .await
            .remove(&(event.project_name.clone(), event.package_name.clone()));
    }
}
