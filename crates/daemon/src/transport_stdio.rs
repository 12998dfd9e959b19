//! Stdio transport (spec §4.12, §6): line-delimited JSON-RPC over stdin/stdout
//! for a single client, the simplest of the two transports the daemon exposes.

use crate::protocol::dispatch_jsonrpc;
use crate::state::ServiceState;
use std::io::Write;
use tokio::io::{AsyncBufReadExt, BufReader};

pub async fn run(state: &ServiceState) {
    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();
    let mut initialized = false;

    loop {
        let line = match lines.next_line().await {
            Ok(Some(l)) => l,
            Ok(None) => break,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: serde_json::Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => {
                write_line(&serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": null,
                    "error": { "code": -32700, "message": "Parse error" }
                }));
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");
        if method == "notifications/initialized" || method == "notifications/cancelled" {
            continue;
        }

        if !initialized && method != "initialize" && method != "ping" {
            if let Some(id) = msg.get("id").cloned() {
                write_line(&serde_json::json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": {
                        "code": -32002,
                        "message": "Server not initialized. Send 'initialize' first."
                    }
                }));
            }
            continue;
        }

        if let Some(response) = dispatch_jsonrpc(state, &msg).await {
            if method == "initialize" {
                initialized = true;
            }
            write_line(&response);
        }
    }
}

fn write_line(value: &serde_json::Value) {
    let mut out = std::io::stdout();
    let _ = writeln!(out, "{}", value);
    let _ = out.flush();
}
