//! Streamable HTTP transport (spec §4.12, §6).
//!
//! `POST /mcp` for JSON-RPC request/response (including batches), `DELETE
//! /mcp` for session termination, `GET /mcp` returns 405 (no server-push).
//! Session management via the `mcp-session-id` header, mirroring the
//! stdio transport's init-ordering rules but keyed per session instead of
//! per process.

use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

use crate::protocol::{dispatch_jsonrpc, PROTOCOL_VERSION};
use crate::state::ServiceState;

const SESSION_HEADER: &str = "mcp-session-id";
const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";

pub struct Session {
    pub protocol_version: String,
}

#[derive(Clone)]
pub struct HttpContext {
    pub state: Arc<ServiceState>,
    pub sessions: Arc<DashMap<String, Session>>,
}

pub fn router(ctx: HttpContext) -> Router {
    Router::new()
        .route("/mcp", post(handle_mcp_post).delete(handle_mcp_delete).get(handle_mcp_get))
        .with_state(ctx)
}

async fn handle_mcp_post(
    State(ctx): State<HttpContext>,
    headers: HeaderMap,
    body: String,
) -> Result<Response, Response> {
    let parsed: Value = match serde_json::from_str(&body) {
        Ok(v) => v,
        Err(_) => {
            let err = serde_json::json!({
                "jsonrpc": "2.0",
                "id": null,
                "error": { "code": -32700, "message": "Parse error" }
            });
            return Ok(json_response(StatusCode::BAD_REQUEST, &err));
        }
    };

    let is_batch = parsed.is_array();
    let requests: Vec<Value> = if is_batch { parsed.as_array().unwrap().clone() } else { vec![parsed] };

    let has_initialize = requests.iter().any(|r| r["method"].as_str() == Some("initialize"));
    let session_id = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);

    if !has_initialize {
        match session_id.as_ref() {
            Some(s) if ctx.sessions.contains_key(s) => {}
            Some(_) => return Err(unknown_session_response()),
            None => return Err(unknown_session_response()),
        }

        if let Some(pv) = headers.get(PROTOCOL_VERSION_HEADER).and_then(|v| v.to_str().ok()) {
            if let Some(sid) = &session_id {
                if let Some(session) = ctx.sessions.get(sid) {
                    if pv != session.protocol_version {
                        return Err(error_response(
                            StatusCode::BAD_REQUEST,
                            -32600,
                            &format!(
                                "Protocol version mismatch: header '{pv}' != negotiated '{}'",
                                session.protocol_version
                            ),
                        ));
                    }
                }
            }
        }
    }

    let mut responses = Vec::new();
    let mut new_session_id = None;

    for req in &requests {
        let method = req["method"].as_str().unwrap_or("");

        if method == "initialize" {
            let sid = Uuid::new_v4().to_string();
            ctx.sessions.insert(sid.clone(), Session { protocol_version: PROTOCOL_VERSION.to_string() });
            new_session_id = Some(sid);
            if let Some(resp) = dispatch_jsonrpc(&ctx.state, req).await {
                responses.push(resp);
            }
        } else if method.starts_with("notifications/") {
            continue;
        } else if let Some(resp) = dispatch_jsonrpc(&ctx.state, req).await {
            responses.push(resp);
        }
    }

    if responses.is_empty() {
        return Ok(Response::builder().status(StatusCode::ACCEPTED).body(Body::empty()).unwrap());
    }

    let body_json =
        if is_batch { serde_json::to_string(&responses).unwrap() } else { serde_json::to_string(&responses[0]).unwrap() };

    let mut builder = Response::builder().status(StatusCode::OK).header("content-type", "application/json");
    if let Some(sid) = &new_session_id {
        builder = builder.header(SESSION_HEADER, sid);
    }
    Ok(builder.body(Body::from(body_json)).unwrap())
}

async fn handle_mcp_delete(State(ctx): State<HttpContext>, headers: HeaderMap) -> StatusCode {
    if let Some(sid) = headers.get(SESSION_HEADER).and_then(|v| v.to_str().ok()) {
        ctx.sessions.remove(sid);
    }
    StatusCode::OK
}

async fn handle_mcp_get() -> StatusCode {
    StatusCode::METHOD_NOT_ALLOWED
}

fn json_response(status: StatusCode, body: &Value) -> Response {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn error_response(status: StatusCode, code: i32, message: &str) -> Response {
    let body = serde_json::json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": code, "message": message }
    });
    json_response(status, &body)
}

/// Unknown or missing session ⇒ protocol error -32001 (spec §4.12).
fn unknown_session_response() -> Response {
    error_response(
        StatusCode::BAD_REQUEST,
        -32001,
        "Unknown session. Send 'initialize' first.",
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use tempfile::tempdir;

    fn context() -> HttpContext {
        let dir = tempdir().unwrap();
        let state = ServiceState::new(dir.path().join("config.json"), dir.path().to_path_buf());
        HttpContext { state: Arc::new(state), sessions: Arc::new(DashMap::new()) }
    }

    #[tokio::test]
    async fn missing_session_header_is_rejected_for_non_initialize() {
        let ctx = context();
        let req = serde_json::json!({ "jsonrpc": "2.0", "id": 1, "method": "ping" });
        let result = handle_mcp_post(State(ctx), HeaderMap::new(), req.to_string()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn initialize_creates_a_session_header() {
        let ctx = context();
        let req = serde_json::json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "protocolVersion": PROTOCOL_VERSION }
        });
        let resp = handle_mcp_post(State(ctx.clone()), HeaderMap::new(), req.to_string()).await.unwrap();
        assert!(resp.headers().get(SESSION_HEADER).is_some());
        assert_eq!(ctx.sessions.len(), 1);
        let _ = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    }
}
