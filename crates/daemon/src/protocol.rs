//! Shared JSON-RPC dispatch (spec §4.11, §6), used by both the stdio and
//! HTTP transports. Mirrors the request/response shape and init-ordering
//! rules a stdio MCP server must honor.

use crate::handlers;
use crate::state::ServiceState;
use serde_json::{json, Value};

pub const PROTOCOL_VERSION: &str = "2025-06-18";

fn ro_annotations() -> Value {
    json!({
        "readOnlyHint": true,
        "destructiveHint": false,
        "idempotentHint": true,
        "openWorldHint": false
    })
}

/// The 6 tools spec §4.11 names, plus the supplemented `get_index_status`.
pub fn tool_definitions() -> Value {
    let ro = ro_annotations();
    json!([
        {
            "name": "search_codebase",
            "annotations": ro,
            "description": "Semantic search over indexed code chunks. Embeds the query and ranks chunks by cosine similarity above the project's score threshold.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "collectionId": { "type": "string" },
                    "query": { "type": "string" },
                    "top_k": { "type": "integer" },
                    "path_prefix": { "type": "string" }
                },
                "required": ["collectionId", "query"]
            }
        },
        {
            "name": "search_symbols",
            "annotations": ro,
            "description": "Find declarations or references matching a symbol name, optionally restricted to a symbol kind.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "collectionId": { "type": "string" },
                    "name": { "type": "string" },
                    "kind": { "type": "string" },
                    "top_k": { "type": "integer" }
                },
                "required": ["collectionId", "name"]
            }
        },
        {
            "name": "get_file_outline",
            "annotations": ro,
            "description": "Extract the declaration-level outline (functions, classes, methods, etc.) of a single file, excluding bare references.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "collectionId": { "type": "string" },
                    "path": { "type": "string" }
                },
                "required": ["collectionId", "path"]
            }
        },
        {
            "name": "get_project_structure",
            "annotations": ro,
            "description": "List the project's indexable files as an ASCII directory tree.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "collectionId": { "type": "string" }
                },
                "required": ["collectionId"]
            }
        },
        {
            "name": "find_usages",
            "annotations": ro,
            "description": "Whole-word grep for a symbol, filtered to real code (not comments/strings), optionally scoped to callers of a class or module context.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "collectionId": { "type": "string" },
                    "symbol": { "type": "string" },
                    "context": { "type": "string" }
                },
                "required": ["collectionId", "symbol"]
            }
        },
        {
            "name": "get_dependency_graph",
            "annotations": ro,
            "description": "Query the file-level import graph: a single file's neighborhood (maxDepth BFS), a path-prefix subgraph, or the full graph.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "collectionId": { "type": "string" },
                    "path": { "type": "string" },
                    "path_prefix": { "type": "string" },
                    "maxDepth": { "type": "integer" },
                    "includeExternal": { "type": "boolean" }
                },
                "required": ["collectionId"]
            }
        },
        {
            "name": "get_index_status",
            "annotations": ro,
            "description": "Report a project's indexed file count and whether a sync pass is pending.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "collectionId": { "type": "string" }
                },
                "required": ["collectionId"]
            }
        }
    ])
}

/// Process a single JSON-RPC request and return the response, or `None` for
/// notifications (no `id` field). Caller is responsible for init-ordering
/// enforcement before calling this.
pub async fn dispatch_jsonrpc(state: &ServiceState, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        return None;
    }

    state.touch_activity();

    let response = match method {
        "initialize" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": { "listChanged": false },
                    "prompts": { "listChanged": false },
                    "resources": { "listChanged": false }
                },
                "serverInfo": {
                    "name": "semindexd",
                    "version": env!("CARGO_PKG_VERSION")
                }
            }
        }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": tool_definitions() }
        }),
        "tools/call" => {
            let tool_name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or(json!({}));
            let (text, is_error) = call_tool(state, tool_name, &arguments).await;
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{ "type": "text", "text": text }],
                    "isError": is_error
                }
            })
        }
        "prompts/list" => json!({ "jsonrpc": "2.0", "id": id, "result": { "prompts": [] } }),
        "resources/list" => json!({ "jsonrpc": "2.0", "id": id, "result": { "resources": [] } }),
        "ping" => json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        _ => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }),
    };

    Some(response)
}

async fn call_tool(state: &ServiceState, tool_name: &str, args: &Value) -> (String, bool) {
    let collection_id = match args.get("collectionId").and_then(|v| v.as_str()) {
        Some(c) => c,
        None => return ("missing required field: collectionId".to_string(), true),
    };
    let handle = match state.project_by_collection(collection_id) {
        Some(h) => h,
        None => return (format!("unknown collectionId: {collection_id}"), true),
    };

    let result = match tool_name {
        "search_codebase" => handlers::search_codebase(&handle, args).await,
        "search_symbols" => handlers::search_symbols(&handle, args).await,
        "get_file_outline" => handlers::get_file_outline(&handle, args),
        "get_project_structure" => handlers::get_project_structure(&handle).map(Value::String),
        "find_usages" => handlers::find_usages(&handle, args).await,
        "get_dependency_graph" => handlers::get_dependency_graph(&handle, args),
        "get_index_status" => handlers::get_index_status(&handle),
        _ => return (format!("unknown tool: {tool_name}"), true),
    };

    match result {
        Ok(value) => (
            serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            false,
        ),
        Err(err) => (err, true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn notifications_produce_no_response() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("config.json"), dir.path().to_path_buf());
        let msg = json!({ "jsonrpc": "2.0", "method": "notifications/initialized" });
        assert!(dispatch_jsonrpc(&state, &msg).await.is_none());
    }

    #[tokio::test]
    async fn unknown_method_returns_method_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("config.json"), dir.path().to_path_buf());
        let msg = json!({ "jsonrpc": "2.0", "id": 1, "method": "bogus" });
        let resp = dispatch_jsonrpc(&state, &msg).await.unwrap();
        assert_eq!(resp["error"]["code"], -32601);
    }

    #[tokio::test]
    async fn tool_call_with_unknown_collection_is_reported_as_tool_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("config.json"), dir.path().to_path_buf());
        let msg = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "tools/call",
            "params": { "name": "get_index_status", "arguments": { "collectionId": "idx_missing" } }
        });
        let resp = dispatch_jsonrpc(&state, &msg).await.unwrap();
        assert_eq!(resp["result"]["isError"], true);
    }
}
