//! Shared embedded database (spec §3, §4.2, §4.3).
//!
//! The snapshot store and dependency graph store live in the same
//! WAL-mode SQLite file, the way tethys's `Index` owns one connection for
//! all of its tables.

use crate::error::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};

pub type SharedConnection = Arc<Mutex<Connection>>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS snapshot_metadata (
    collection_id TEXT PRIMARY KEY,
    version       INTEGER NOT NULL,
    timestamp     INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshots (
    collection_id TEXT NOT NULL,
    file_path     TEXT NOT NULL,
    mtime_ms      INTEGER NOT NULL,
    size          INTEGER NOT NULL,
    hash          TEXT NOT NULL,
    PRIMARY KEY (collection_id, file_path)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_collection ON snapshots(collection_id);

CREATE TABLE IF NOT EXISTS dependency_nodes (
    collection_id TEXT NOT NULL,
    file_path     TEXT NOT NULL,
    module_path   TEXT NOT NULL,
    lang          TEXT NOT NULL,
    is_external   INTEGER NOT NULL,
    package_name  TEXT,
    hash          TEXT NOT NULL,
    PRIMARY KEY (collection_id, file_path)
);

CREATE TABLE IF NOT EXISTS dependency_edges (
    collection_id   TEXT NOT NULL,
    source_file     TEXT NOT NULL,
    target_module   TEXT NOT NULL,
    line_number     INTEGER NOT NULL,
    target_file     TEXT,
    import_type     TEXT NOT NULL,
    imported_names  TEXT,
    is_resolved     INTEGER NOT NULL,
    PRIMARY KEY (collection_id, source_file, target_module, line_number)
);

CREATE INDEX IF NOT EXISTS idx_edges_source ON dependency_edges(collection_id, source_file);
CREATE INDEX IF NOT EXISTS idx_edges_target ON dependency_edges(collection_id, target_file);
"#;

/// Open (or create) the database at `path`, applying both the snapshot
/// and dependency-graph schemas.
pub fn open(path: &Path) -> Result<SharedConnection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}

pub fn open_in_memory() -> Result<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    conn.execute_batch(SCHEMA)?;
    Ok(Arc::new(Mutex::new(conn)))
}
