//! Filesystem watcher (spec §4.10).
//!
//! One `notify` observer per project root, non-recursive (depth 0) — the
//! sync engine's own file walk handles recursion and exclusion; the
//! watcher only needs to notice *that something changed* under the root
//! fast enough to mark the project dirty. Heavy directories are skipped
//! at the notify layer too, so a `git gc` or `npm install` doesn't flood
//! the debounce queue. Grounded on the teacher's `watch.rs` debounce-loop
//! shape, adapted to async/tokio instead of a dedicated OS thread.

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use semindex_core::selection;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use crate::state::ServiceState;

const DEBOUNCE: Duration = Duration::from_secs(2);

const HEAVY_DIRS: &[&str] = &[
    ".git", ".hg", ".svn", "node_modules", "dist", "build", "target", ".next", ".cache",
    "__pycache__", ".venv", "venv", ".idea", ".vscode", "Library", "obj", "bin",
];

fn is_under_heavy_dir(path: &Path) -> bool {
    path.components().any(|c| HEAVY_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
}

/// Start watching `root` for `collection_id`. The watcher handle must stay
/// alive for the duration of watching (dropping it stops delivery), so the
/// caller keeps it in `ServiceState` or an equivalent owner.
pub fn watch_project(
    state: Arc<ServiceState>,
    collection_id: String,
    root: PathBuf,
) -> notify::Result<RecommendedWatcher> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();

    let mut watcher = RecommendedWatcher::new(
        move |res: Result<Event, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default(),
    )?;

    watcher.watch(&root, RecursiveMode::NonRecursive)?;
    tracing::info!(root = %root.display(), "watching project root");

    tokio::spawn(async move {
        let mut pending: HashMap<PathBuf, Instant> = HashMap::new();
        let mut timer = tokio::time::interval(DEBOUNCE);

        loop {
            tokio::select! {
                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => handle_event(&state, &collection_id, &root, event, &mut pending),
                        None => break,
                    }
                }
                _ = timer.tick() => {
                    if pending.is_empty() {
                        continue;
                    }
                    pending.clear();
                    if let Some(handle) = state.project_by_collection(&collection_id) {
                        handle.dirty.mark_dirty();
                        state.touch_activity();
                    }
                }
            }
        }
    });

    Ok(watcher)
}

fn handle_event(
    state: &Arc<ServiceState>,
    collection_id: &str,
    root: &Path,
    event: Event,
    pending: &mut HashMap<PathBuf, Instant>,
) {
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)) {
        return;
    }

    let now = Instant::now();
    for path in event.paths {
        if is_under_heavy_dir(&path) {
            continue;
        }

        let rel = path.strip_prefix(root).unwrap_or(&path);
        if rel == Path::new(".gitignore") || rel == Path::new(".indexer/to-index") {
            selection::reset_config_cache(root);
            if let Some(handle) = state.project_by_collection(collection_id) {
                handle.force_full_sync.store(true, std::sync::atomic::Ordering::SeqCst);
            }
            tracing::debug!(path = %path.display(), "selection config changed, cache invalidated");
        }

        pending.insert(path, now);
    }
}
