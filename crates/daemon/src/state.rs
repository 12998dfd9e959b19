//! Ambient service state (spec §9 redesign guidance): an explicit
//! `ServiceState` value owned by `main`, passed to watchers and handlers,
//! replacing the "ambient process-wide state" anti-pattern the original
//! design notes call out.

use dashmap::DashMap;
use semindex_core::config::GlobalConfig;
use semindex_core::db;
use semindex_core::embeddings::EmbeddingsClient;
use semindex_core::graph::GraphStore;
use semindex_core::imports::ImportResolver;
use semindex_core::project::Project;
use semindex_core::snapshot::SnapshotStore;
use semindex_core::sync::DirtyFlag;
use semindex_core::vector_store::VectorStore;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;

/// Everything the sync engine and tool handlers need for one registered
/// project. Stores are internally synchronized, so this is safely shared
/// behind an `Arc` rather than behind one more outer lock.
pub struct ProjectHandle {
    pub project: Project,
    pub snapshot_store: SnapshotStore,
    pub graph_store: GraphStore,
    pub dirty: DirtyFlag,
    /// Set when a watcher observes a selection-config file change
    /// (`.gitignore`, `.indexer/to-index`); consumed (and cleared) by the
    /// next sync pass to force a full re-walk (spec §4.10).
    pub force_full_sync: AtomicBool,
    pub vector_store: VectorStore,
    pub embeddings: EmbeddingsClient,
    pub import_resolver: ImportResolver,
}

impl ProjectHandle {
    pub fn new(project: Project, data_dir: &Path) -> semindex_core::Result<Self> {
        let snapshot_db = data_dir.join(format!("{}-snapshot.db", project.collection_name));
        let graph_db = data_dir.join(format!("{}-graph.db", project.collection_name));
        Ok(ProjectHandle {
            vector_store: VectorStore::new(project.settings.vector_store_url.clone()),
            embeddings: EmbeddingsClient::new(
                project.settings.embeddings_url.clone(),
                project.settings.embed_model.clone(),
            ),
            snapshot_store: SnapshotStore::open(&snapshot_db)?,
            graph_store: GraphStore::new(db::open(&graph_db)?),
            dirty: DirtyFlag::new(true),
            force_full_sync: AtomicBool::new(false),
            import_resolver: ImportResolver::new(),
            project,
        })
    }

    /// Consume the pending force-full-sync request, if any.
    pub fn take_force_full_sync(&self) -> bool {
        self.force_full_sync.swap(false, Ordering::SeqCst)
    }
}

pub struct ServiceState {
    pub projects: DashMap<PathBuf, Arc<ProjectHandle>>,
    pub by_collection: DashMap<String, PathBuf>,
    pub config_path: PathBuf,
    pub data_dir: PathBuf,
    last_activity_unix_ms: AtomicI64,
    pub shutting_down: Arc<AtomicBool>,
}

impl ServiceState {
    pub fn new(config_path: PathBuf, data_dir: PathBuf) -> Self {
        ServiceState {
            projects: DashMap::new(),
            by_collection: DashMap::new(),
            config_path,
            data_dir,
            last_activity_unix_ms: AtomicI64::new(now_unix_ms()),
            shutting_down: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn touch_activity(&self) {
        self.last_activity_unix_ms.store(now_unix_ms(), Ordering::SeqCst);
    }

    pub fn idle_for_ms(&self) -> i64 {
        now_unix_ms() - self.last_activity_unix_ms.load(Ordering::SeqCst)
    }

    pub fn load_config(&self) -> semindex_core::Result<GlobalConfig> {
        GlobalConfig::load(&self.config_path)
    }

    pub fn register_project(&self, handle: Arc<ProjectHandle>) {
        self.by_collection
            .insert(handle.project.collection_name.clone(), handle.project.root.clone());
        self.projects.insert(handle.project.root.clone(), handle);
    }

    pub fn project_by_collection(&self, collection_id: &str) -> Option<Arc<ProjectHandle>> {
        let root = self.by_collection.get(collection_id)?;
        self.projects.get(root.value()).map(|r| r.clone())
    }

    pub fn project_by_root(&self, root: &Path) -> Option<Arc<ProjectHandle>> {
        self.projects.get(root).map(|r| r.clone())
    }

    pub fn all_projects(&self) -> Vec<Arc<ProjectHandle>> {
        self.projects.iter().map(|r| r.value().clone()).collect()
    }
}

fn now_unix_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn touch_activity_resets_idle_time() {
        let dir = tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("config.json"), dir.path().to_path_buf());
        std::thread::sleep(std::time::Duration::from_millis(5));
        assert!(state.idle_for_ms() >= 5);
        state.touch_activity();
        assert!(state.idle_for_ms() < 5);
    }
}
