//! Dependency graph store (spec §4.3).
//!
//! Persisted mirror of cross-file import relationships, in the same
//! database as the snapshot store. Unlike the teacher's in-memory
//! `CodeGraph` (which only lives for one process lifetime), this survives
//! restarts — the schema is grounded on tethys's `files`/`imports` tables.

use crate::db::SharedConnection;
use crate::error::Result;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyNode {
    pub file_path: String,
    pub module_path: String,
    pub lang: String,
    pub is_external: bool,
    pub package_name: Option<String>,
    pub hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportType {
    Default,
    Named,
    Namespace,
    Dynamic,
    Require,
}

impl ImportType {
    fn as_str(&self) -> &'static str {
        match self {
            ImportType::Default => "default",
            ImportType::Named => "named",
            ImportType::Namespace => "namespace",
            ImportType::Dynamic => "dynamic",
            ImportType::Require => "require",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "default" => Some(ImportType::Default),
            "named" => Some(ImportType::Named),
            "namespace" => Some(ImportType::Namespace),
            "dynamic" => Some(ImportType::Dynamic),
            "require" => Some(ImportType::Require),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub source_file: String,
    pub target_module: String,
    pub line_number: i64,
    pub target_file: Option<String>,
    pub import_type: ImportType,
    pub imported_names: Option<Vec<String>>,
    pub is_resolved: bool,
}

pub struct GraphStore {
    conn: SharedConnection,
}

impl GraphStore {
    pub fn new(conn: SharedConnection) -> Self {
        GraphStore { conn }
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(GraphStore { conn: crate::db::open_in_memory()? })
    }

    pub fn upsert_node(&self, collection_name: &str, node: &DependencyNode) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO dependency_nodes (collection_id, file_path, module_path, lang, is_external, package_name, hash)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(collection_id, file_path) DO UPDATE SET
                module_path = excluded.module_path,
                lang = excluded.lang,
                is_external = excluded.is_external,
                package_name = excluded.package_name,
                hash = excluded.hash",
            params![
                collection_name,
                node.file_path,
                node.module_path,
                node.lang,
                node.is_external as i64,
                node.package_name,
                node.hash,
            ],
        )?;
        Ok(())
    }

    pub fn upsert_nodes(&self, collection_name: &str, nodes: &[DependencyNode]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for node in nodes {
            tx.execute(
                "INSERT INTO dependency_nodes (collection_id, file_path, module_path, lang, is_external, package_name, hash)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(collection_id, file_path) DO UPDATE SET
                    module_path = excluded.module_path,
                    lang = excluded.lang,
                    is_external = excluded.is_external,
                    package_name = excluded.package_name,
                    hash = excluded.hash",
                params![
                    collection_name,
                    node.file_path,
                    node.module_path,
                    node.lang,
                    node.is_external as i64,
                    node.package_name,
                    node.hash,
                ],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn upsert_edge(&self, collection_name: &str, edge: &DependencyEdge) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        insert_edge(&conn, collection_name, edge)
    }

    pub fn upsert_edges(&self, collection_name: &str, edges: &[DependencyEdge]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for edge in edges {
            insert_edge(&tx, collection_name, edge)?;
        }
        tx.commit()?;
        Ok(())
    }

    pub fn get_nodes_by_collection(&self, collection_name: &str) -> Result<Vec<DependencyNode>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT file_path, module_path, lang, is_external, package_name, hash
             FROM dependency_nodes WHERE collection_id = ?1",
        )?;
        let rows = stmt.query_map(params![collection_name], |row| {
            Ok(DependencyNode {
                file_path: row.get(0)?,
                module_path: row.get(1)?,
                lang: row.get(2)?,
                is_external: row.get::<_, i64>(3)? != 0,
                package_name: row.get(4)?,
                hash: row.get(5)?,
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_edges_by_source(
        &self,
        collection_name: &str,
        source_file: &str,
    ) -> Result<Vec<DependencyEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_file, target_module, line_number, target_file, import_type, imported_names, is_resolved
             FROM dependency_edges WHERE collection_id = ?1 AND source_file = ?2",
        )?;
        let rows = stmt.query_map(params![collection_name, source_file], row_to_edge)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    pub fn get_edges_by_target(
        &self,
        collection_name: &str,
        target_file: &str,
    ) -> Result<Vec<DependencyEdge>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT source_file, target_module, line_number, target_file, import_type, imported_names, is_resolved
             FROM dependency_edges WHERE collection_id = ?1 AND target_file = ?2",
        )?;
        let rows = stmt.query_map(params![collection_name, target_file], row_to_edge)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Pattern match on `source_file` (e.g. `"src/foo/%"`).
    pub fn get_edges_by_path_prefix(
        &self,
        collection_name: &str,
        prefix: &str,
    ) -> Result<Vec<DependencyEdge>> {
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{prefix}%");
        let mut stmt = conn.prepare(
            "SELECT source_file, target_module, line_number, target_file, import_type, imported_names, is_resolved
             FROM dependency_edges WHERE collection_id = ?1 AND source_file LIKE ?2",
        )?;
        let rows = stmt.query_map(params![collection_name, pattern], row_to_edge)?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    /// Removes the node and its outgoing edges; incoming edges are kept so
    /// reverse-deps from other files remain discoverable (spec §4.3).
    pub fn delete_file_from_graph(&self, collection_name: &str, path: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM dependency_nodes WHERE collection_id = ?1 AND file_path = ?2",
            params![collection_name, path],
        )?;
        tx.execute(
            "DELETE FROM dependency_edges WHERE collection_id = ?1 AND source_file = ?2",
            params![collection_name, path],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn clear_graph(&self, collection_name: &str) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM dependency_nodes WHERE collection_id = ?1", params![collection_name])?;
        tx.execute("DELETE FROM dependency_edges WHERE collection_id = ?1", params![collection_name])?;
        tx.commit()?;
        Ok(())
    }

    pub fn get_node(&self, collection_name: &str, file_path: &str) -> Result<Option<DependencyNode>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT file_path, module_path, lang, is_external, package_name, hash
             FROM dependency_nodes WHERE collection_id = ?1 AND file_path = ?2",
            params![collection_name, file_path],
            |row| {
                Ok(DependencyNode {
                    file_path: row.get(0)?,
                    module_path: row.get(1)?,
                    lang: row.get(2)?,
                    is_external: row.get::<_, i64>(3)? != 0,
                    package_name: row.get(4)?,
                    hash: row.get(5)?,
                })
            },
        )
        .optional()
        .map_err(Into::into)
    }
}

fn insert_edge(
    conn: &rusqlite::Connection,
    collection_name: &str,
    edge: &DependencyEdge,
) -> Result<()> {
    let imported_names_json = edge
        .imported_names
        .as_ref()
        .map(|names| serde_json::to_string(names).unwrap_or_default());
    conn.execute(
        "INSERT INTO dependency_edges
            (collection_id, source_file, target_module, line_number, target_file, import_type, imported_names, is_resolved)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(collection_id, source_file, target_module, line_number) DO UPDATE SET
            target_file = excluded.target_file,
            import_type = excluded.import_type,
            imported_names = excluded.imported_names,
            is_resolved = excluded.is_resolved",
        params![
            collection_name,
            edge.source_file,
            edge.target_module,
            edge.line_number,
            edge.target_file,
            edge.import_type.as_str(),
            imported_names_json,
            edge.is_resolved as i64,
        ],
    )?;
    Ok(())
}

fn row_to_edge(row: &rusqlite::Row) -> rusqlite::Result<DependencyEdge> {
    let imported_names_json: Option<String> = row.get(5)?;
    let imported_names = imported_names_json.and_then(|s| serde_json::from_str(&s).ok());
    let import_type_str: String = row.get(4)?;
    Ok(DependencyEdge {
        source_file: row.get(0)?,
        target_module: row.get(1)?,
        line_number: row.get(2)?,
        target_file: row.get(3)?,
        import_type: ImportType::from_str(&import_type_str).unwrap_or(ImportType::Named),
        imported_names,
        is_resolved: row.get::<_, i64>(6)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(path: &str) -> DependencyNode {
        DependencyNode {
            file_path: path.to_string(),
            module_path: path.to_string(),
            lang: "typescript".to_string(),
            is_external: false,
            package_name: None,
            hash: "h".to_string(),
        }
    }

    fn edge(source: &str, target: &str) -> DependencyEdge {
        DependencyEdge {
            source_file: source.to_string(),
            target_module: "./a".to_string(),
            line_number: 1,
            target_file: Some(target.to_string()),
            import_type: ImportType::Named,
            imported_names: Some(vec!["A".to_string()]),
            is_resolved: true,
        }
    }

    #[test]
    fn upsert_and_fetch_nodes() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_nodes("idx_1", &[node("a.ts"), node("b.ts")]).unwrap();
        let nodes = store.get_nodes_by_collection("idx_1").unwrap();
        assert_eq!(nodes.len(), 2);
    }

    #[test]
    fn edge_resolution_invariant() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_node("idx_1", &node("a.ts")).unwrap();
        store.upsert_node("idx_1", &node("b.ts")).unwrap();
        store.upsert_edge("idx_1", &edge("b.ts", "a.ts")).unwrap();

        let edges = store.get_edges_by_source("idx_1", "b.ts").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].import_type, ImportType::Named);
        assert_eq!(edges[0].imported_names, Some(vec!["A".to_string()]));
        assert!(edges[0].is_resolved);

        let node = store.get_node("idx_1", edges[0].target_file.as_ref().unwrap()).unwrap();
        assert!(node.is_some());
    }

    #[test]
    fn delete_file_removes_node_and_outgoing_but_keeps_incoming() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_node("idx_1", &node("a.ts")).unwrap();
        store.upsert_node("idx_1", &node("b.ts")).unwrap();
        store.upsert_edge("idx_1", &edge("b.ts", "a.ts")).unwrap();

        store.delete_file_from_graph("idx_1", "b.ts").unwrap();

        assert!(store.get_node("idx_1", "b.ts").unwrap().is_none());
        assert!(store.get_edges_by_source("idx_1", "b.ts").unwrap().is_empty());
        // incoming edges (target = b.ts) would still be retained; here there are none,
        // but the edge whose source is a *different* file and target is "a.ts" remains
        // discoverable via get_edges_by_target.
        let incoming = store.get_edges_by_target("idx_1", "a.ts").unwrap();
        assert!(incoming.is_empty(), "no edges point at a.ts in this fixture");
    }

    #[test]
    fn get_edges_by_path_prefix_matches() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_node("idx_1", &node("src/foo/a.ts")).unwrap();
        store.upsert_node("idx_1", &node("src/bar/a.ts")).unwrap();
        store.upsert_edge("idx_1", &edge("src/foo/a.ts", "src/foo/b.ts")).unwrap();
        store.upsert_edge("idx_1", &edge("src/bar/a.ts", "src/bar/b.ts")).unwrap();

        let matches = store.get_edges_by_path_prefix("idx_1", "src/foo/").unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].source_file, "src/foo/a.ts");
    }

    #[test]
    fn clear_graph_removes_everything_for_collection() {
        let store = GraphStore::open_in_memory().unwrap();
        store.upsert_node("idx_1", &node("a.ts")).unwrap();
        store.upsert_edge("idx_1", &edge("a.ts", "b.ts")).unwrap();
        store.clear_graph("idx_1").unwrap();
        assert!(store.get_nodes_by_collection("idx_1").unwrap().is_empty());
        assert!(store.get_edges_by_source("idx_1", "a.ts").unwrap().is_empty());
    }
}
