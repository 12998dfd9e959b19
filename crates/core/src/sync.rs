//! Project sync engine (spec §4.9).

use crate::chunker::{IndexReason, Indexer};
use crate::embeddings::EmbeddingsClient;
use crate::graph::{DependencyEdge, DependencyNode, GraphStore, ImportType};
use crate::imports::{self, ImportResolver, ImportKind};
use crate::project::Project;
use crate::snapshot::SnapshotStore;
use crate::vector_store::VectorStore;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

#[derive(Debug, Default, Clone)]
pub struct SyncReport {
    pub indexed: usize,
    pub unchanged: usize,
    pub too_large: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Per-project dirty flag, set by the watcher and cleared only after a
/// fully successful sync pass (§4.9 step 6).
#[derive(Default)]
pub struct DirtyFlag(AtomicBool);

impl DirtyFlag {
    pub fn new(dirty: bool) -> Self {
        DirtyFlag(AtomicBool::new(dirty))
    }

    pub fn mark_dirty(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_dirty(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn mark_clean(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct SyncEngine<'a> {
    pub snapshot_store: &'a SnapshotStore,
    pub graph_store: &'a GraphStore,
    pub vector_store: &'a VectorStore,
    pub embeddings: &'a EmbeddingsClient,
    pub import_resolver: &'a ImportResolver,
}

impl<'a> SyncEngine<'a> {
    /// Runs the full diff-and-index pass for `project`. Returns `Ok(None)`
    /// if skipped because the project is clean and `force_full_sync` is
    /// false; the project's dirty flag is only cleared when the whole pass
    /// succeeds, so a top-level failure leaves it eligible for retry on the
    /// next event.
    pub async fn sync_project_with_diff(
        &self,
        project: &Project,
        dirty: &DirtyFlag,
        force_full_sync: bool,
    ) -> crate::error::Result<Option<SyncReport>> {
        if !force_full_sync && !dirty.is_dirty() {
            return Ok(None);
        }

        let report = self.run_sync_pass(project).await?;
        dirty.mark_clean();
        Ok(Some(report))
    }

    async fn run_sync_pass(&self, project: &Project) -> crate::error::Result<SyncReport> {
        let collection_name = &project.collection_name;

        self.vector_store
            .ensure_collections(collection_name, false, project.settings.vector_size)
            .await?;

        let (files_to_index, files_to_remove, _is_new, _diff) = self
            .snapshot_store
            .get_files_to_index(&project.root, collection_name)?;

        let mut report = SyncReport::default();

        for path in &files_to_remove {
            if let Err(err) = self.vector_store.delete_points_by_path(collection_name, path).await {
                tracing::warn!(path, error = %err, "failed to delete stale points during sync");
            }
            self.graph_store.delete_file_from_graph(collection_name, path)?;
            report.removed += 1;
        }

        let indexer = Indexer::new(self.vector_store, self.embeddings);
        for file in &files_to_index {
            match indexer
                .index_file(&project.root, &file.path, collection_name, &project.settings)
                .await
            {
                Ok(outcome) => match outcome.reason {
                    IndexReason::Indexed(_) => {
                        report.indexed += 1;
                        if let Err(err) = self.update_graph_for_file(project, &file.path).await {
                            tracing::warn!(path = %file.path, error = %err, "failed to update dependency graph");
                        }
                    }
                    IndexReason::Unchanged => report.unchanged += 1,
                    IndexReason::TooLarge => report.too_large += 1,
                },
                Err(err) => {
                    tracing::warn!(path = %file.path, error = %err, "failed to index file during sync");
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    /// Upsert the node for `path` and replace its outgoing edges.
    async fn update_graph_for_file(&self, project: &Project, path: &str) -> crate::error::Result<()> {
        let abs_path = project.root.join(path);
        let content = std::fs::read_to_string(&abs_path).unwrap_or_default();
        let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        let lang = match ext.as_str() {
            "ts" | "tsx" | "js" | "jsx" | "mjs" | "cjs" => "js",
            "py" => "python",
            "cs" => "csharp",
            _ => return Ok(()),
        };

        let mut hasher = sha1::Sha1::new();
        use sha1::Digest;
        hasher.update(content.as_bytes());
        let hash = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>();

        self.graph_store.upsert_node(
            &project.collection_name,
            &DependencyNode {
                file_path: path.to_string(),
                module_path: path.to_string(),
                lang: lang.to_string(),
                is_external: false,
                package_name: None,
                hash,
            },
        )?;

        let raw_imports = match lang {
            "js" => imports::extract_js_imports(&content),
            "python" => imports::extract_python_imports(&content),
            "csharp" => imports::extract_csharp_imports(&content),
            _ => vec![],
        };

        let mut edges = Vec::new();
        for raw in raw_imports {
            let resolution = match lang {
                "js" => self.import_resolver.resolve_js(&project.root, path, &raw.source),
                "python" => {
                    let level = raw.source.chars().take_while(|c| *c == '.').count();
                    self.import_resolver.resolve_python(&project.root, path, raw.source.trim_start_matches('.'), level)
                }
                "csharp" => self.import_resolver.resolve_csharp(&project.root, &raw.source),
                _ => continue,
            };

            if resolution.is_external {
                self.graph_store.upsert_node(
                    &project.collection_name,
                    &DependencyNode {
                        file_path: resolution.package_name.clone().unwrap_or_else(|| raw.source.clone()),
                        module_path: raw.source.clone(),
                        lang: lang.to_string(),
                        is_external: true,
                        package_name: resolution.package_name.clone(),
                        hash: String::new(),
                    },
                )?;
            }

            edges.push(DependencyEdge {
                source_file: path.to_string(),
                target_module: raw.source.clone(),
                line_number: raw.line as i64,
                target_file: resolution.target_path.clone(),
                import_type: import_type_of(&raw.import_type),
                imported_names: if raw.names.is_empty() { None } else { Some(raw.names.clone()) },
                is_resolved: resolution.resolved,
            });
        }

        self.graph_store.upsert_edges(&project.collection_name, &edges)?;
        Ok(())
    }
}

fn import_type_of(kind: &ImportKind) -> ImportType {
    match kind {
        ImportKind::Default => ImportType::Default,
        ImportKind::Named => ImportType::Named,
        ImportKind::Namespace => ImportType::Namespace,
        ImportKind::Dynamic => ImportType::Dynamic,
        ImportKind::Require => ImportType::Require,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dirty_flag_starts_as_given_and_clears() {
        let flag = DirtyFlag::new(true);
        assert!(flag.is_dirty());
        flag.mark_clean();
        assert!(!flag.is_dirty());
        flag.mark_dirty();
        assert!(flag.is_dirty());
    }
}
