//! Snapshot store (spec §4.2).
//!
//! Per-collection `filePath -> {mtime, size, hash}` table backed by an
//! embedded, write-ahead-logged SQLite database, the same pattern tethys
//! uses for its own file/symbol tables.

use crate::db::SharedConnection;
use crate::error::Result;
use crate::selection;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub mtime_ms: i64,
    pub size: i64,
    pub hash: String,
}

pub type SnapshotMap = BTreeMap<String, FileEntry>;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct Diff {
    pub added: Vec<String>,
    pub modified: Vec<String>,
    pub unchanged: Vec<String>,
    pub removed: Vec<String>,
    pub totals: DiffTotals,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct DiffTotals {
    pub added: usize,
    pub modified: usize,
    pub unchanged: usize,
    pub removed: usize,
}

/// One file queued for (re-)indexing, with whether it is brand new.
#[derive(Debug, Clone)]
pub struct FileToIndex {
    pub path: String,
    pub is_new: bool,
}

pub struct SnapshotStore {
    conn: SharedConnection,
}

impl SnapshotStore {
    pub fn new(conn: SharedConnection) -> Self {
        SnapshotStore { conn }
    }

    pub fn open(path: &Path) -> Result<Self> {
        Ok(SnapshotStore { conn: crate::db::open(path)? })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(SnapshotStore { conn: crate::db::open_in_memory()? })
    }

    /// Enumerate files under `project_root` (per §4.5) and compute
    /// `{mtime, size, SHA-1(content)}` for each. Files that fail to read are
    /// skipped rather than failing the whole scan.
    pub fn create_snapshot(&self, project_root: &Path) -> Result<SnapshotMap> {
        let files = selection::select_files(project_root)?;
        let mut map = SnapshotMap::new();
        for path in files {
            match hash_file(&path) {
                Ok(entry) => {
                    let rel = path
                        .strip_prefix(project_root)
                        .unwrap_or(&path)
                        .to_string_lossy()
                        .replace('\\', "/");
                    map.insert(rel, entry);
                }
                Err(_) => continue,
            }
        }
        Ok(map)
    }

    /// Replace all rows for `collection_name` in one transaction.
    pub fn save_snapshot(
        &self,
        collection_name: &str,
        files: &SnapshotMap,
        version: i64,
        timestamp: i64,
    ) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM snapshots WHERE collection_id = ?1", params![collection_name])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO snapshots (collection_id, file_path, mtime_ms, size, hash) VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (path, entry) in files {
                stmt.execute(params![collection_name, path, entry.mtime_ms, entry.size, entry.hash])?;
            }
        }
        tx.execute(
            "INSERT INTO snapshot_metadata (collection_id, version, timestamp) VALUES (?1, ?2, ?3)
             ON CONFLICT(collection_id) DO UPDATE SET version = excluded.version, timestamp = excluded.timestamp",
            params![collection_name, version, timestamp],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Returns `None` if no metadata row exists for `collection_name`.
    pub fn load_snapshot(&self, collection_name: &str) -> Result<Option<SnapshotMap>> {
        let conn = self.conn.lock().unwrap();
        let exists: Option<i64> = conn
            .query_row(
                "SELECT version FROM snapshot_metadata WHERE collection_id = ?1",
                params![collection_name],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_none() {
            return Ok(None);
        }
        let mut stmt = conn.prepare(
            "SELECT file_path, mtime_ms, size, hash FROM snapshots WHERE collection_id = ?1",
        )?;
        let rows = stmt.query_map(params![collection_name], |row| {
            Ok((
                row.get::<_, String>(0)?,
                FileEntry { mtime_ms: row.get(1)?, size: row.get(2)?, hash: row.get(3)? },
            ))
        })?;
        let mut map = SnapshotMap::new();
        for row in rows {
            let (path, entry) = row?;
            map.insert(path, entry);
        }
        Ok(Some(map))
    }

    /// Compute the new snapshot for `project_root`, diff it against the
    /// prior one, and always persist the new snapshot before returning.
    pub fn get_files_to_index(
        &self,
        project_root: &Path,
        collection_name: &str,
    ) -> Result<(Vec<FileToIndex>, Vec<String>, bool, Diff)> {
        let new_snapshot = self.create_snapshot(project_root)?;
        let prior = self.load_snapshot(collection_name)?;
        let is_new = prior.is_none();

        let diff = match &prior {
            Some(old) => compare_snapshots(old, &new_snapshot),
            None => {
                let mut d = Diff::default();
                d.added = new_snapshot.keys().cloned().collect();
                d.totals.added = d.added.len();
                d
            }
        };

        let files_to_index: Vec<FileToIndex> = if is_new {
            new_snapshot
                .keys()
                .map(|p| FileToIndex { path: p.clone(), is_new: true })
                .collect()
        } else {
            diff.added
                .iter()
                .map(|p| FileToIndex { path: p.clone(), is_new: true })
                .chain(diff.modified.iter().map(|p| FileToIndex { path: p.clone(), is_new: false }))
                .collect()
        };
        let files_to_remove = diff.removed.clone();

        let version = prior.as_ref().map(|_| 1).unwrap_or(1);
        let timestamp = approx_unix_timestamp();
        self.save_snapshot(collection_name, &new_snapshot, version, timestamp)?;

        Ok((files_to_index, files_to_remove, is_new, diff))
    }
}

/// Pairwise-disjoint diff whose union is `keys(old) ∪ keys(new)` (Testable
/// Property 3).
pub fn compare_snapshots(old: &SnapshotMap, new: &SnapshotMap) -> Diff {
    let mut diff = Diff::default();
    for (path, new_entry) in new {
        match old.get(path) {
            None => diff.added.push(path.clone()),
            Some(old_entry) if old_entry.hash != new_entry.hash => diff.modified.push(path.clone()),
            Some(_) => diff.unchanged.push(path.clone()),
        }
    }
    for path in old.keys() {
        if !new.contains_key(path) {
            diff.removed.push(path.clone());
        }
    }
    diff.totals = DiffTotals {
        added: diff.added.len(),
        modified: diff.modified.len(),
        unchanged: diff.unchanged.len(),
        removed: diff.removed.len(),
    };
    diff
}

fn hash_file(path: &Path) -> std::io::Result<FileEntry> {
    let meta = std::fs::metadata(path)?;
    let content = std::fs::read(path)?;
    let mut hasher = Sha1::new();
    hasher.update(&content);
    let hash = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>();
    let mtime_ms = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0);
    Ok(FileEntry { mtime_ms, size: meta.len() as i64, hash })
}

fn approx_unix_timestamp() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[allow(dead_code)]
fn path_buf(s: &str) -> PathBuf {
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(hash: &str) -> FileEntry {
        FileEntry { mtime_ms: 0, size: 0, hash: hash.to_string() }
    }

    #[test]
    fn compare_snapshots_disjoint_union() {
        let mut old = SnapshotMap::new();
        old.insert("a.rs".into(), entry("h1"));
        old.insert("b.rs".into(), entry("h2"));
        old.insert("c.rs".into(), entry("h3"));

        let mut new = SnapshotMap::new();
        new.insert("a.rs".into(), entry("h1")); // unchanged
        new.insert("b.rs".into(), entry("h2-changed")); // modified
        new.insert("d.rs".into(), entry("h4")); // added
        // c.rs removed

        let diff = compare_snapshots(&old, &new);
        assert_eq!(diff.added, vec!["d.rs".to_string()]);
        assert_eq!(diff.modified, vec!["b.rs".to_string()]);
        assert_eq!(diff.unchanged, vec!["a.rs".to_string()]);
        assert_eq!(diff.removed, vec!["c.rs".to_string()]);

        let mut all: Vec<String> = diff
            .added
            .iter()
            .chain(&diff.modified)
            .chain(&diff.unchanged)
            .chain(&diff.removed)
            .cloned()
            .collect();
        all.sort();
        let mut expected: Vec<String> = old.keys().chain(new.keys()).cloned().collect();
        expected.sort();
        expected.dedup();
        assert_eq!(all, expected);
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = SnapshotStore::open(&dir.path().join("snap.db")).unwrap();
        let mut files = SnapshotMap::new();
        files.insert("a.rs".into(), entry("h1"));
        files.insert("b.rs".into(), entry("h2"));

        store.save_snapshot("idx_abc", &files, 1, 1000).unwrap();
        let loaded = store.load_snapshot("idx_abc").unwrap().unwrap();
        assert_eq!(loaded, files);
    }

    #[test]
    fn load_unknown_collection_returns_none() {
        let store = SnapshotStore::open_in_memory().unwrap();
        assert!(store.load_snapshot("idx_missing").unwrap().is_none());
    }

    #[test]
    fn get_files_to_index_marks_everything_new_on_first_sync() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn main() {}").unwrap();
        let store = SnapshotStore::open_in_memory().unwrap();
        let (to_index, to_remove, is_new, diff) =
            store.get_files_to_index(dir.path(), "idx_test").unwrap();
        assert!(is_new);
        assert!(to_index.iter().all(|f| f.is_new));
        assert!(to_remove.is_empty());
        assert_eq!(diff.totals.added, to_index.len());
    }

    #[test]
    fn get_files_to_index_detects_modification_on_second_sync() {
        let dir = tempdir().unwrap();
        let file_path = dir.path().join("a.rs");
        std::fs::write(&file_path, "fn main() {}").unwrap();
        let store = SnapshotStore::open_in_memory().unwrap();
        store.get_files_to_index(dir.path(), "idx_test").unwrap();

        std::fs::write(&file_path, "fn main() { println!(\"hi\"); }").unwrap();
        let (to_index, _, is_new, diff) = store.get_files_to_index(dir.path(), "idx_test").unwrap();
        assert!(!is_new);
        assert_eq!(diff.modified, vec!["a.rs".to_string()]);
        assert!(to_index.iter().any(|f| f.path == "a.rs" && !f.is_new));
    }
}
