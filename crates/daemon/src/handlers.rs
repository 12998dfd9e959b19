//! Tool handlers (spec §4.11). Each takes the owning project's dependency
//! bundle and the tool's arguments, and returns the JSON value to encode
//! as the tool's text payload.

use crate::grep;
use crate::state::ProjectHandle;
use semindex_core::selection;
use semindex_core::symbols;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;

pub async fn search_codebase(handle: &ProjectHandle, args: &Value) -> Result<Value, String> {
    let query = args.get("query").and_then(|v| v.as_str()).ok_or("missing required field: query")?;
    let top_k = args
        .get("top_k")
        .and_then(|v| v.as_u64())
        .map(|v| v as usize)
        .unwrap_or(handle.project.settings.top_k_default);
    let path_prefix = args.get("path_prefix").and_then(|v| v.as_str());

    let embedding = match handle.embeddings.embed(query).await {
        Ok(semindex_core::embeddings::EmbedOutcome::Embedding(v)) => v,
        Ok(semindex_core::embeddings::EmbedOutcome::TooLarge) => {
            return Err("query too large to embed".to_string())
        }
        Err(err) => return Err(err.to_string()),
    };

    let filter = path_prefix.map(|prefix| {
        json!({ "must": [{ "key": "path", "match": { "text": prefix } }] })
    });

    let hits = handle
        .vector_store
        .search(
            &handle.project.collection_name,
            embedding,
            top_k,
            handle.project.settings.score_threshold,
            filter,
        )
        .await
        .map_err(|e| e.to_string())?;

    let results: Vec<Value> = hits
        .into_iter()
        .enumerate()
        .map(|(idx, hit)| {
            json!({
                "rank": idx + 1,
                "path": hit.payload.get("path"),
                "start_line": hit.payload.get("start_line"),
                "end_line": hit.payload.get("end_line"),
                "snippet": hit.payload.get("text"),
                "score": hit.score,
                "symbol_names": hit.payload.get("symbol_names"),
                "symbol_kinds": hit.payload.get("symbol_kinds"),
                "unity_tags": hit.payload.get("unity_tags"),
            })
        })
        .collect();

    Ok(json!({ "results": results }))
}

pub async fn search_symbols(handle: &ProjectHandle, args: &Value) -> Result<Value, String> {
    let name = args.get("name").and_then(|v| v.as_str()).ok_or("missing required field: name")?;
    let kind = args.get("kind").and_then(|v| v.as_str()).unwrap_or("any");
    let top_k = args.get("top_k").and_then(|v| v.as_u64()).unwrap_or(10) as usize;

    let mut must = vec![json!({
        "should": [
            { "key": "symbol_names", "match": { "text": name } },
            { "key": "symbol_references", "match": { "text": name } },
        ]
    })];
    if kind != "any" {
        must.push(json!({ "key": "symbol_kinds", "match": { "any": [kind] } }));
    }
    let filter = json!({ "must": must });

    let resp = handle
        .vector_store
        .scroll(&handle.project.collection_name, Some(filter), top_k, None)
        .await
        .map_err(|e| e.to_string())?;

    let points = resp
        .get("result")
        .and_then(|r| r.get("points"))
        .and_then(|p| p.as_array())
        .cloned()
        .unwrap_or_default();

    let results: Vec<Value> = points
        .into_iter()
        .map(|pt| {
            let payload = pt.get("payload").cloned().unwrap_or(Value::Null);
            json!({
                "path": payload.get("path"),
                "start_line": payload.get("start_line"),
                "end_line": payload.get("end_line"),
                "snippet": payload.get("text"),
                "symbol_names": payload.get("symbol_names"),
                "symbol_kinds": payload.get("symbol_kinds"),
                "unity_tags": payload.get("unity_tags"),
            })
        })
        .collect();

    Ok(json!({ "results": results }))
}

pub fn get_file_outline(handle: &ProjectHandle, args: &Value) -> Result<Value, String> {
    let path = args.get("path").and_then(|v| v.as_str()).ok_or("missing required field: path")?;
    let abs_path = handle.project.root.join(path);
    let content = std::fs::read_to_string(&abs_path).map_err(|e| format!("failed to read {path}: {e}"))?;

    let ext = Path::new(path).extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let lang = match ext.as_str() {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "cs" => "csharp",
        _ => "text",
    };

    let outline: Vec<Value> = symbols::extract_symbols(path, &content, lang)
        .unwrap_or_default()
        .into_iter()
        .filter(|s| s.kind != "reference")
        .map(|s| json!({ "name": s.name, "kind": s.kind, "line": s.line }))
        .collect();

    Ok(json!(outline))
}

/// Returns raw ASCII (not JSON) per spec §6 — caller wraps it directly as
/// the tool's `text` field.
pub fn get_project_structure(handle: &ProjectHandle) -> Result<String, String> {
    let files = selection::select_files(&handle.project.root).map_err(|e| e.to_string())?;
    if files.is_empty() {
        return Ok("(empty project)".to_string());
    }

    let mut tree: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for file in &files {
        let rel = file.strip_prefix(&handle.project.root).unwrap_or(file);
        let rel = rel.to_string_lossy().replace('\\', "/");
        let (dir, name) = match rel.rsplit_once('/') {
            Some((d, n)) => (d.to_string(), n.to_string()),
            None => (String::new(), rel.clone()),
        };
        tree.entry(dir).or_default().push(name);
    }

    let mut out = String::new();
    for (dir, mut names) in tree {
        names.sort();
        if dir.is_empty() {
            for name in &names {
                out.push_str(name);
                out.push('\n');
            }
        } else {
            out.push_str(&dir);
            out.push('/');
            out.push('\n');
            for name in &names {
                out.push_str("  ");
                out.push_str(name);
                out.push('\n');
            }
        }
    }
    Ok(out.trim_end().to_string())
}

pub async fn find_usages(handle: &ProjectHandle, args: &Value) -> Result<Value, String> {
    let symbol = args.get("symbol").and_then(|v| v.as_str()).ok_or("missing required field: symbol")?;
    let explicit_context = args.get("context").and_then(|v| v.as_str());

    let (context, search_name) = if explicit_context.is_none() && symbol.contains('.') {
        let (c, s) = symbol.rsplit_once('.').unwrap();
        (Some(c.to_string()), s.to_string())
    } else {
        (explicit_context.map(str::to_string), symbol.to_string())
    };

    let hits = grep::run_grep(&search_name, &handle.project.root).await;

    let mut filtered = Vec::new();
    for hit in &hits {
        let abs_path = handle.project.root.join(&hit.path);
        let ext = Path::new(&hit.path).extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
        let lang = match ext.as_str() {
            "ts" | "tsx" => "typescript",
            "js" | "jsx" | "mjs" | "cjs" => "javascript",
            "py" => "python",
            "cs" => "csharp",
            _ => "text",
        };
        let content = std::fs::read_to_string(&abs_path).unwrap_or_default();
        if lang == "text" || symbols::is_code_at_position(&content, lang, hit.line, hit.column.saturating_sub(1)) {
            filtered.push(hit.clone());
        }
    }

    if let Some(ctx) = &context {
        let filter = json!({
            "must": [{
                "should": [
                    { "key": "symbol_names", "match": { "text": ctx } },
                    { "key": "symbol_references", "match": { "text": ctx } },
                ]
            }]
        });
        let resp = handle
            .vector_store
            .scroll(&handle.project.collection_name, Some(filter), 200, None)
            .await
            .map_err(|e| e.to_string())?;
        let context_paths: std::collections::HashSet<String> = resp
            .get("result")
            .and_then(|r| r.get("points"))
            .and_then(|p| p.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|pt| pt.get("payload").and_then(|p| p.get("path")).and_then(|p| p.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        if !context_paths.is_empty() {
            let restricted: Vec<_> = filtered.iter().filter(|h| context_paths.contains(&h.path)).cloned().collect();
            if !restricted.is_empty() {
                filtered = restricted;
            }
        }
    }

    let results: Vec<Value> = filtered
        .into_iter()
        .map(|h| json!({ "path": h.path, "line": h.line, "column": h.column, "text": h.text }))
        .collect();

    Ok(json!({ "context": context, "symbol": search_name, "results": results }))
}

pub fn get_dependency_graph(handle: &ProjectHandle, args: &Value) -> Result<Value, String> {
    let collection = &handle.project.collection_name;
    let path = args.get("path").and_then(|v| v.as_str());
    let path_prefix = args.get("path_prefix").and_then(|v| v.as_str());
    let max_depth = args.get("maxDepth").and_then(|v| v.as_u64()).unwrap_or(3) as usize;
    let include_external = args.get("includeExternal").and_then(|v| v.as_bool()).unwrap_or(false);

    let edges = if let Some(start) = path {
        bfs_edges(handle, &[start.to_string()], max_depth).map_err(|e| e.to_string())?
    } else if let Some(prefix) = path_prefix {
        let roots: Vec<String> = handle
            .graph_store
            .get_edges_by_path_prefix(collection, prefix)
            .map_err(|e| e.to_string())?
            .into_iter()
            .map(|e| e.source_file)
            .collect();
        bfs_edges(handle, &roots, max_depth).map_err(|e| e.to_string())?
    } else {
        handle.graph_store.get_nodes_by_collection(collection).map_err(|e| e.to_string())?;
        let mut all_edges = Vec::new();
        for node in handle.graph_store.get_nodes_by_collection(collection).map_err(|e| e.to_string())? {
            all_edges.extend(
                handle
                    .graph_store
                    .get_edges_by_source(collection, &node.file_path)
                    .map_err(|e| e.to_string())?,
            );
        }
        all_edges
    };

    let edges: Vec<_> = if include_external { edges } else { edges.into_iter().filter(|e| e.target_file.is_some()).collect() };

    let mut node_paths = std::collections::BTreeSet::new();
    for edge in &edges {
        node_paths.insert(edge.source_file.clone());
        if let Some(target) = &edge.target_file {
            node_paths.insert(target.clone());
        }
    }

    let edges_json: Vec<Value> = edges
        .iter()
        .map(|e| {
            json!({
                "source": e.source_file,
                "target": e.target_file,
                "targetModule": e.target_module,
                "importType": format!("{:?}", e.import_type).to_lowercase(),
                "importedNames": e.imported_names,
                "isResolved": e.is_resolved,
            })
        })
        .collect();

    Ok(json!({ "nodes": node_paths, "edges": edges_json }))
}

fn bfs_edges(
    handle: &ProjectHandle,
    start_paths: &[String],
    max_depth: usize,
) -> semindex_core::Result<Vec<semindex_core::graph::DependencyEdge>> {
    let collection = &handle.project.collection_name;
    let mut visited = std::collections::HashSet::new();
    let mut queue: VecDeque<(String, usize)> = start_paths.iter().map(|p| (p.clone(), 0)).collect();
    let mut out = Vec::new();

    for path in start_paths {
        visited.insert(path.clone());
    }

    while let Some((path, depth)) = queue.pop_front() {
        if depth >= max_depth {
            continue;
        }
        let edges = handle.graph_store.get_edges_by_source(collection, &path)?;
        for edge in edges {
            if let Some(target) = &edge.target_file {
                if visited.insert(target.clone()) {
                    queue.push_back((target.clone(), depth + 1));
                }
            }
            out.push(edge);
        }
    }
    Ok(out)
}

pub fn get_index_status(handle: &ProjectHandle) -> Result<Value, String> {
    let snapshot = handle
        .snapshot_store
        .load_snapshot(&handle.project.collection_name)
        .map_err(|e| e.to_string())?;
    Ok(json!({
        "collectionId": handle.project.collection_name,
        "root": handle.project.root.to_string_lossy(),
        "indexedFiles": snapshot.map(|s| s.len()).unwrap_or(0),
        "dirty": handle.dirty.is_dirty(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use semindex_core::project::{Project, Settings};
    use tempfile::tempdir;

    fn handle(root: std::path::PathBuf) -> ProjectHandle {
        let project = Project::new(root, Settings::default());
        ProjectHandle::new(project, &tempdir().unwrap().keep()).unwrap()
    }

    #[test]
    fn get_project_structure_reports_empty_project() {
        let dir = tempdir().unwrap();
        let h = handle(dir.path().to_path_buf());
        assert_eq!(get_project_structure(&h).unwrap(), "(empty project)");
    }

    #[test]
    fn get_project_structure_lists_files() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/a.ts"), "export const A = 1;").unwrap();
        semindex_core::selection::reset_config_cache(dir.path());
        let h = handle(dir.path().to_path_buf());
        let tree = get_project_structure(&h).unwrap();
        assert!(tree.contains("a.ts"));
    }

    #[test]
    fn get_file_outline_drops_references() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.ts"), "function add(a, b) { return a + b; }").unwrap();
        let h = handle(dir.path().to_path_buf());
        let outline = get_file_outline(&h, &json!({ "path": "a.ts" })).unwrap();
        let kinds: Vec<&str> = outline.as_array().unwrap().iter().map(|s| s["kind"].as_str().unwrap()).collect();
        assert!(!kinds.contains(&"reference"));
    }
}
