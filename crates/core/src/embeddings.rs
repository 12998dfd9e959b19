//! Embeddings backend client (spec §4.6, §6).
//!
//! Talks to an Ollama-shaped `/api/embeddings` endpoint. Empty/missing
//! embeddings, or a body mentioning context/input length, are treated as
//! "too large" rather than an error — the caller reacts by splitting the
//! chunk further (§4.6).

use crate::error::{Error, Result};
use serde_json::{json, Value};
use std::time::Duration;

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);
const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];

pub enum EmbedOutcome {
    Embedding(Vec<f32>),
    TooLarge,
}

pub struct EmbeddingsClient {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl EmbeddingsClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .expect("reqwest client");
        EmbeddingsClient { base_url: base_url.into(), model: model.into(), client }
    }

    /// `GET /api/tags` readiness probe.
    pub async fn ping(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = self.client.get(&url).timeout(PROBE_TIMEOUT).send().await;
        Ok(resp.map(|r| r.status().is_success()).unwrap_or(false))
    }

    pub async fn embed(&self, text: &str) -> Result<EmbedOutcome> {
        let url = format!("{}/api/embeddings", self.base_url);
        let body = json!({ "model": self.model, "prompt": text });

        let mut attempt = 0;
        loop {
            let result = self.client.post(&url).json(&body).send().await;
            match result {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        let value: Value = resp.json().await.unwrap_or(Value::Null);
                        return Ok(interpret_response(&value));
                    }
                    if status.as_u16() == 429 || status.is_server_error() {
                        if attempt >= RETRY_DELAYS_MS.len() {
                            return Err(Error::TransientBackend(format!(
                                "embeddings backend failed with {status} after retries"
                            )));
                        }
                        tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                        attempt += 1;
                        continue;
                    }
                    let text_body = resp.text().await.unwrap_or_default();
                    if mentions_length_limit(&text_body) {
                        return Ok(EmbedOutcome::TooLarge);
                    }
                    return Err(Error::PermanentBackend(format!("embeddings backend -> {status}: {text_body}")));
                }
                Err(e) => {
                    if attempt >= RETRY_DELAYS_MS.len() {
                        return Err(Error::TransientBackend(format!("embeddings backend: {e}")));
                    }
                    tokio::time::sleep(Duration::from_millis(RETRY_DELAYS_MS[attempt])).await;
                    attempt += 1;
                }
            }
        }
    }
}

fn interpret_response(value: &Value) -> EmbedOutcome {
    let body_text = value.to_string();
    if mentions_length_limit(&body_text) {
        return EmbedOutcome::TooLarge;
    }
    let embedding = value
        .get("embedding")
        .and_then(|e| e.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_f64()).map(|f| f as f32).collect::<Vec<_>>());
    match embedding {
        Some(vec) if !vec.is_empty() => EmbedOutcome::Embedding(vec),
        _ => EmbedOutcome::TooLarge,
    }
}

fn mentions_length_limit(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("context length") || lower.contains("input length")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_embedding_array_is_too_large() {
        let value = json!({ "embedding": [] });
        assert!(matches!(interpret_response(&value), EmbedOutcome::TooLarge));
    }

    #[test]
    fn missing_embedding_field_is_too_large() {
        let value = json!({});
        assert!(matches!(interpret_response(&value), EmbedOutcome::TooLarge));
    }

    #[test]
    fn context_length_message_is_too_large() {
        let value = json!({ "error": "context length exceeded" });
        assert!(matches!(interpret_response(&value), EmbedOutcome::TooLarge));
    }

    #[test]
    fn valid_embedding_is_returned() {
        let value = json!({ "embedding": [0.1, 0.2, 0.3] });
        match interpret_response(&value) {
            EmbedOutcome::Embedding(v) => assert_eq!(v, vec![0.1, 0.2, 0.3]),
            EmbedOutcome::TooLarge => panic!("expected embedding"),
        }
    }
}
