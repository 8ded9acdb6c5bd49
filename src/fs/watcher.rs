use std::collections::BTreeSet;
use std::future::Future;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};
use tokio::sync::mpsc;
use tracing::warn;

use crate::fs::tree::is_hidden;
use crate::paths;

/// Changed paths per batch above which the whole root is synced instead.
pub const DEFAULT_FLOOD_THRESHOLD: usize = 100;

/// Watches the content root and reports which directories need a sync.
pub struct ContentWatcher {
    /// Cleared while a sync batch runs.
    active: Arc<AtomicBool>,
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl ContentWatcher {
    /// Watch `root` recursively.
    ///
    /// Each debounced batch is reduced to the set of directory ids it touched and sent via
    /// `dirs_tx`. Hidden paths are dropped. A batch larger than `flood_threshold` collapses to
    /// the root directory.
    pub fn new(
        root: &Path,
        debounce_duration: Duration,
        flood_threshold: usize,
        dirs_tx: mpsc::UnboundedSender<Vec<String>>,
    ) -> notify::Result<Self> {
        let active = Arc::new(AtomicBool::new(true));
        let forwarding = active.clone();
        // Events carry canonical paths on some platforms.
        let root_path = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

        let mut debouncer = new_debouncer(
            debounce_duration,
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                if !forwarding.load(Ordering::Relaxed) {
                    return;
                }

                match result {
                    Ok(events) => {
                        let changed: Vec<PathBuf> = events
                            .iter()
                            .filter(|e| e.kind == DebouncedEventKind::Any)
                            .map(|e| e.path.clone())
                            .collect();
                        let dirs = changed_directories(&root_path, &changed, flood_threshold);
                        if !dirs.is_empty() {
                            let _ = dirs_tx.send(dirs);
                        }
                    }
                    Err(e) => warn!(error = %e, "watcher error"),
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;

        Ok(Self {
            active,
            _debouncer: debouncer,
        })
    }

    /// Drop batches until [`resume`](Self::resume) is called.
    pub fn pause(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// Run `sync` for every directory in each batch received on `dirs_rx`.
///
/// The watcher stays paused for the batch and for `settle` afterwards, so the debouncer flushes
/// the batch's own writes while they are still dropped. `settle` should exceed the debounce
/// interval.
pub async fn sync_batches<F, Fut>(
    watcher: &ContentWatcher,
    dirs_rx: &mut mpsc::UnboundedReceiver<Vec<String>>,
    settle: Duration,
    mut sync: F,
) where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(dirs) = dirs_rx.recv().await {
        watcher.pause();
        for dir in dirs {
            sync(dir).await;
        }
        tokio::time::sleep(settle).await;
        watcher.resume();
    }
}

/// Check if a path below `root` is hidden, i.e. any component below the root starts with `.`.
pub fn should_ignore(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return true;
    };
    relative.components().any(|c| match c {
        Component::Normal(name) => is_hidden(&name.to_string_lossy()),
        _ => false,
    })
}

/// Directory ids whose contents changed, sorted and deduplicated.
///
/// A changed directory maps to itself, anything else (including deleted paths) to its parent.
pub fn changed_directories(root: &Path, changed: &[PathBuf], flood_threshold: usize) -> Vec<String> {
    let relevant: Vec<&PathBuf> = changed
        .iter()
        .filter(|p| !should_ignore(root, p))
        .collect();
    if relevant.is_empty() {
        return Vec::new();
    }
    if relevant.len() > flood_threshold {
        return vec![paths::ROOT_ID.to_string()];
    }

    let mut dirs = BTreeSet::new();
    for path in relevant {
        let dir = if path.is_dir() {
            path.as_path()
        } else {
            path.parent().unwrap_or(root)
        };
        dirs.insert(directory_id(root, dir));
    }
    dirs.into_iter().collect()
}

fn directory_id(root: &Path, dir: &Path) -> String {
    let segments: Vec<String> = dir
        .strip_prefix(root)
        .map(|rel| {
            rel.components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    if segments.is_empty() {
        paths::ROOT_ID.to_string()
    } else {
        segments.join("/")
    }
}
