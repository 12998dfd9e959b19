//! Project identity and per-project settings (spec §3, §6).

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Derive the stable collection identifier for an absolute project path:
/// `idx_` followed by the first 16 hex characters of `SHA-256(path)`.
///
/// Deterministic for a given path across runs (Testable Property 1 in
/// spec §8); two distinct paths would need a 64-bit SHA-256 prefix
/// collision to collide, which we treat as unreachable.
pub fn collection_name(path: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    let digest = hasher.finalize();
    let hex = hex_prefix(&digest, 8);
    format!("idx_{hex}")
}

fn hex_prefix(bytes: &[u8], n: usize) -> String {
    bytes.iter().take(n).map(|b| format!("{b:02x}")).collect()
}

/// Chunking and backend settings, overridable per project. Defaults match
/// spec §4.1.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub vector_store_url: String,
    pub embeddings_url: String,
    pub embed_model: String,
    pub vector_size: usize,
    pub max_chunk_lines: usize,
    pub overlap_lines: usize,
    pub max_file_bytes: u64,
    pub top_k_default: usize,
    pub score_threshold: f32,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            vector_store_url: "http://localhost:6333".to_string(),
            embeddings_url: "http://localhost:11434".to_string(),
            embed_model: "nomic-embed-text".to_string(),
            vector_size: 768,
            max_chunk_lines: 500,
            overlap_lines: 50,
            max_file_bytes: 2 * 1024 * 1024,
            top_k_default: 10,
            score_threshold: 0.2,
            port: 0,
        }
    }
}

/// A registered project: its absolute root, derived collection name, and
/// effective settings (defaults merged with per-project overrides).
#[derive(Debug, Clone)]
pub struct Project {
    pub root: PathBuf,
    pub collection_name: String,
    pub settings: Settings,
}

impl Project {
    pub fn new(root: PathBuf, settings: Settings) -> Self {
        let collection_name = collection_name(&root);
        Project { root, collection_name, settings }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_name_is_deterministic() {
        let p = PathBuf::from("/home/user/my-project");
        assert_eq!(collection_name(&p), collection_name(&p));
    }

    #[test]
    fn collection_name_has_expected_shape() {
        let p = PathBuf::from("/home/user/my-project");
        let name = collection_name(&p);
        assert!(name.starts_with("idx_"));
        assert_eq!(name.len(), "idx_".len() + 16);
        assert!(name["idx_".len()..].chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn collection_name_differs_for_different_paths() {
        let a = collection_name(&PathBuf::from("/a"));
        let b = collection_name(&PathBuf::from("/b"));
        assert_ne!(a, b);
    }
}
