//! Vector-store adapter (spec §4.4, §6).
//!
//! Thin HTTP client over a Qdrant-shaped wire contract. Grounded on the
//! reqwest client usage in Loctree's `rmcp-memex`, with the retry
//! discipline from spec §4.4/§7 layered on top.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPoint {
    pub id: String,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub path: String,
    pub lang: String,
    pub start_line: usize,
    pub end_line: usize,
    pub text: String,
    pub file_hash: String,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub symbol_names: Vec<String>,
    #[serde(default)]
    pub symbol_kinds: Vec<String>,
    #[serde(default)]
    pub symbol_references: Vec<String>,
    #[serde(default)]
    pub unity_tags: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: Value,
}

pub struct VectorStore {
    base_url: String,
    client: reqwest::Client,
}

impl VectorStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client");
        VectorStore { base_url: base_url.into(), client }
    }

    /// `GET /api/tags`-style readiness probe, short-timed per spec §5.
    pub async fn ping(&self) -> Result<bool> {
        let url = format!("{}/collections", self.base_url);
        let resp = self
            .client
            .get(&url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await;
        Ok(resp.map(|r| r.status().is_success()).unwrap_or(false))
    }

    /// Delete (if `reset`) then create the collection if absent, and
    /// best-effort create payload indexes.
    pub async fn ensure_collections(&self, name: &str, reset: bool, vector_size: usize) -> Result<()> {
        if reset {
            let url = format!("{}/collections/{}", self.base_url, name);
            let _ = self.request_with_retry(reqwest::Method::DELETE, &url, None).await;
        }

        let exists = self.collection_exists(name).await?;
        if !exists {
            let url = format!("{}/collections/{}", self.base_url, name);
            let body = json!({ "vectors": { "size": vector_size, "distance": "Cosine" } });
            self.request_with_retry(reqwest::Method::PUT, &url, Some(body)).await?;
        }

        for (field, schema) in [
            ("path", "text"),
            ("lang", "keyword"),
            ("file_hash", "keyword"),
            ("kind", "keyword"),
            ("symbol_kinds", "keyword"),
            ("unity_tags", "keyword"),
            ("symbol_names", "text"),
            ("symbol_references", "text"),
        ] {
            let url = format!("{}/collections/{}/index", self.base_url, name);
            let body = json!({ "field_name": field, "field_schema": schema });
            // Best-effort: payload-index creation failures do not abort ensureCollections.
            let _ = self.request_with_retry(reqwest::Method::PUT, &url, Some(body)).await;
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let url = format!("{}/collections", self.base_url);
        let resp = self.request_with_retry(reqwest::Method::GET, &url, None).await?;
        let names: Vec<String> = resp
            .get("result")
            .and_then(|r| r.get("collections"))
            .and_then(|c| c.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.get("name").and_then(|n| n.as_str()).map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();
        Ok(names.iter().any(|n| n == name))
    }

    pub async fn upsert_points(&self, name: &str, points: &[ChunkPoint]) -> Result<()> {
        if points.is_empty() {
            return Ok(());
        }
        let url = format!("{}/collections/{}/points?wait=true", self.base_url, name);
        let body = json!({ "points": points });
        self.request_with_retry(reqwest::Method::PUT, &url, Some(body)).await?;
        Ok(())
    }

    pub async fn delete_points_by_path(&self, name: &str, path: &str) -> Result<()> {
        let url = format!("{}/collections/{}/points/delete?wait=true", self.base_url, name);
        let body = json!({ "filter": { "must": [{ "key": "path", "match": { "value": path } }] } });
        self.request_with_retry(reqwest::Method::POST, &url, Some(body)).await?;
        Ok(())
    }

    /// Scroll limited to 1 point with payload, returning the `file_hash` if any
    /// point exists for `path`.
    pub async fn get_existing_file_hash(&self, name: &str, path: &str) -> Result<Option<String>> {
        let url = format!("{}/collections/{}/points/scroll", self.base_url, name);
        let body = json!({
            "filter": { "must": [{ "key": "path", "match": { "value": path } }] },
            "with_payload": true,
            "limit": 1,
        });
        let resp = self.request_with_retry(reqwest::Method::POST, &url, Some(body)).await?;
        let hash = resp
            .get("result")
            .and_then(|r| r.get("points"))
            .and_then(|p| p.as_array())
            .and_then(|arr| arr.first())
            .and_then(|pt| pt.get("payload"))
            .and_then(|payload| payload.get("file_hash"))
            .and_then(|h| h.as_str())
            .map(str::to_string);
        Ok(hash)
    }

    /// Paged scroll accumulating unique paths across the whole collection.
    pub async fn list_all_indexed_paths(&self, name: &str) -> Result<Vec<String>> {
        let mut paths = std::collections::BTreeSet::new();
        let mut offset: Option<Value> = None;
        loop {
            let url = format!("{}/collections/{}/points/scroll", self.base_url, name);
            let mut body = json!({ "with_payload": true, "limit": 200 });
            if let Some(off) = &offset {
                body["offset"] = off.clone();
            }
            let resp = self.request_with_retry(reqwest::Method::POST, &url, Some(body)).await?;
            let result = resp.get("result");
            let points = result
                .and_then(|r| r.get("points"))
                .and_then(|p| p.as_array())
                .cloned()
                .unwrap_or_default();
            if points.is_empty() {
                break;
            }
            for pt in &points {
                if let Some(path) = pt.get("payload").and_then(|p| p.get("path")).and_then(|p| p.as_str()) {
                    paths.insert(path.to_string());
                }
            }
            let next_offset = result.and_then(|r| r.get("next_page_offset")).cloned();
            match next_offset {
                Some(Value::Null) | None => break,
                Some(v) => offset = Some(v),
            }
        }
        Ok(paths.into_iter().collect())
    }

    pub async fn search(
        &self,
        name: &str,
        vector: Vec<f32>,
        limit: usize,
        score_threshold: f32,
        filter: Option<Value>,
    ) -> Result<Vec<SearchHit>> {
        let url = format!("{}/collections/{}/points/search", self.base_url, name);
        let mut body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "score_threshold": score_threshold,
        });
        if let Some(f) = filter {
            body["filter"] = f;
        }
        let resp = self.request_with_retry(reqwest::Method::POST, &url, Some(body)).await?;
        let hits = resp
            .get("result")
            .and_then(|r| r.as_array())
            .map(|arr| {
                arr.iter()
                    .map(|h| SearchHit {
                        id: h.get("id").map(|v| v.to_string()).unwrap_or_default(),
                        score: h.get("score").and_then(|s| s.as_f64()).unwrap_or(0.0) as f32,
                        payload: h.get("payload").cloned().unwrap_or(Value::Null),
                    })
                    .collect()
            })
            .unwrap_or_default();
        Ok(hits)
    }

    pub async fn scroll(
        &self,
        name: &str,
        filter: Option<Value>,
        limit: usize,
        offset: Option<Value>,
    ) -> Result<Value> {
        let url = format!("{}/collections/{}/points/scroll", self.base_url, name);
        let mut body = json!({ "with_payload": true, "limit": limit });
        if let Some(f) = filter {
            body["filter"] = f;
        }
        if let Some(off) = offset {
            body["offset"] = off;
        }
        self.request_with_retry(reqwest::Method::POST, &url, Some(body)).await
    }

    pub async fn count(&self, name: &str, filter: Option<Value>) -> Result<u64> {
        let url = format!("{}/collections/{}/points/count", self.base_url, name);
        let mut body = json!({ "exact": true });
        if let Some(f) = filter {
            body["filter"] = f;
        }
        let resp = self.request_with_retry(reqwest::Method::POST, &url, Some(body)).await?;
        Ok(resp.get("result").and_then(|r| r.get("count")).and_then(|c| c.as_u64()).unwrap_or(0))
    }

    /// 5xx/429 retried with exponential backoff (1s, 2s, 4s); other 4xx are
    /// permanent errors that propagate immediately.
    async fn request_with_retry(
        &self,
        method: reqwest::Method,
        url: &str,
        body: Option<Value>,
    ) -> Result<Value> {
        let mut attempt = 0;
        loop {
            let mut req = self.client.request(method.clone(), url);
            if let Some(b) = &body {
                req = req.json(b);
            }
            let result = req.send().await;
            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        return resp.json::<Value>().await.or(Ok(Value::Null)).map_err(|e: reqwest::Error| e.into());
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        if attempt >= RETRY_DELAYS_MS.len() {
                            return Err(Error::TransientBackend(format!(
                                "{method} {url} failed with {status} after {} retries",
                                RETRY_DELAYS_MS.len()
                            )));
                        }
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                        attempt += 1;
                        continue;
                    }
                    let text = resp.text().await.unwrap_or_default();
                    return Err(Error::PermanentBackend(format!("{method} {url} -> {status}: {text}")));
                }
                Err(e) => {
                    if attempt >= RETRY_DELAYS_MS.len() {
                        return Err(Error::TransientBackend(format!("{method} {url}: {e}")));
                    }
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_payload_serializes_expected_shape() {
        let payload = ChunkPayload {
            path: "src/a.ts".to_string(),
            lang: "typescript".to_string(),
            start_line: 1,
            end_line: 10,
            text: "export const A = 1".to_string(),
            file_hash: "abc123".to_string(),
            symbols: vec![],
            symbol_names: vec![],
            symbol_kinds: vec![],
            symbol_references: vec![],
            unity_tags: vec![],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["path"], "src/a.ts");
        assert_eq!(value["file_hash"], "abc123");
    }

    #[test]
    fn new_vector_store_retains_base_url() {
        let store = VectorStore::new("http://localhost:6333");
        assert_eq!(store.base_url, "http://localhost:6333");
    }
}
