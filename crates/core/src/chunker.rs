//! Chunker and per-file indexer (spec §4.6).

use crate::embeddings::{EmbedOutcome, EmbeddingsClient};
use crate::error::Result;
use crate::project::Settings;
use crate::symbols::{self, Symbol};
use crate::vector_store::{ChunkPayload, ChunkPoint, VectorStore};
use sha1::{Digest, Sha1};
use std::path::Path;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexReason {
    Unchanged,
    TooLarge,
    Indexed(usize),
}

#[derive(Debug, Clone)]
pub struct IndexOutcome {
    pub indexed: bool,
    pub reason: IndexReason,
}

#[derive(Debug, Clone)]
struct Chunk {
    start_line: usize,
    end_line: usize,
    text: String,
}

/// Derive the chunk point UUID: `SHA-1(path:startLine:endLine)` reformatted
/// as a canonical UUID (first 16 bytes of the digest).
pub fn chunk_point_id(path: &str, start_line: usize, end_line: usize) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("{path}:{start_line}:{end_line}").as_bytes());
    let digest = hasher.finalize();
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&digest[..16]);
    Uuid::from_bytes(bytes).to_string()
}

fn split_into_chunks(content: &str, max_lines: usize, overlap_lines: usize) -> Vec<Chunk> {
    let lines: Vec<&str> = content.lines().collect();
    if lines.is_empty() {
        return Vec::new();
    }
    let mut chunks = Vec::new();
    let mut start = 0usize;
    while start < lines.len() {
        let end = (start + max_lines).min(lines.len());
        let text = lines[start..end].join("\n");
        chunks.push(Chunk { start_line: start + 1, end_line: end, text });
        if end == lines.len() {
            break;
        }
        start = end.saturating_sub(overlap_lines).max(start + 1);
    }
    chunks
}

/// Split `chunk` at its midpoint with up to `min(overlap_lines, floor(len/4))`
/// lines of overlap on both sides (§4.6 adaptive split).
fn adaptive_split(chunk: &Chunk, overlap_lines: usize) -> Option<(Chunk, Chunk)> {
    let lines: Vec<&str> = chunk.text.lines().collect();
    if lines.len() <= 15 {
        return None;
    }
    let overlap = overlap_lines.min(lines.len() / 4);
    let mid = lines.len() / 2;

    let first_end = (mid + overlap).min(lines.len());
    let first_text = lines[0..first_end].join("\n");
    let first = Chunk {
        start_line: chunk.start_line,
        end_line: chunk.start_line + first_end - 1,
        text: first_text,
    };

    let second_start = mid.saturating_sub(overlap);
    let second_text = lines[second_start..].join("\n");
    let second = Chunk {
        start_line: chunk.start_line + second_start,
        end_line: chunk.end_line,
        text: second_text,
    };

    Some((first, second))
}

fn language_for_ext(ext: &str) -> &'static str {
    match ext {
        "ts" | "tsx" => "typescript",
        "js" | "jsx" | "mjs" | "cjs" => "javascript",
        "py" => "python",
        "cs" => "csharp",
        "rs" => "rust",
        "go" => "go",
        "java" => "java",
        "rb" => "ruby",
        _ => "text",
    }
}

pub struct Indexer<'a> {
    pub vector_store: &'a VectorStore,
    pub embeddings: &'a EmbeddingsClient,
}

impl<'a> Indexer<'a> {
    pub fn new(vector_store: &'a VectorStore, embeddings: &'a EmbeddingsClient) -> Self {
        Indexer { vector_store, embeddings }
    }

    pub async fn index_file(
        &self,
        project_root: &Path,
        rel_path: &str,
        collection_name: &str,
        settings: &Settings,
    ) -> Result<IndexOutcome> {
        let abs_path = project_root.join(rel_path);
        let meta = match std::fs::metadata(&abs_path) {
            Ok(m) => m,
            Err(_) => return Ok(IndexOutcome { indexed: false, reason: IndexReason::TooLarge }),
        };
        if meta.len() > settings.max_file_bytes {
            return Ok(IndexOutcome { indexed: false, reason: IndexReason::TooLarge });
        }

        let content = std::fs::read_to_string(&abs_path).unwrap_or_default();
        let mut hasher = Sha1::new();
        hasher.update(content.as_bytes());
        let file_hash = hasher.finalize().iter().map(|b| format!("{b:02x}")).collect::<String>();

        let existing_hash = self.vector_store.get_existing_file_hash(collection_name, rel_path).await?;
        if existing_hash.as_deref() == Some(file_hash.as_str()) {
            return Ok(IndexOutcome { indexed: false, reason: IndexReason::Unchanged });
        }
        if existing_hash.is_some() {
            self.vector_store.delete_points_by_path(collection_name, rel_path).await?;
        }

        let ext = Path::new(rel_path)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();
        let lang = language_for_ext(&ext);
        let file_symbols = symbols::extract_symbols(rel_path, &content, lang).unwrap_or_default();

        let mut queue: std::collections::VecDeque<Chunk> =
            split_into_chunks(&content, settings.max_chunk_lines, settings.overlap_lines).into();

        let mut points = Vec::new();
        while let Some(chunk) = queue.pop_front() {
            match self.embeddings.embed(&chunk.text).await? {
                EmbedOutcome::Embedding(vector) => {
                    let id = chunk_point_id(rel_path, chunk.start_line, chunk.end_line);
                    let chunk_symbols = symbols_in_range(&file_symbols, chunk.start_line, chunk.end_line);
                    let (references, declarations): (Vec<_>, Vec<_>) =
                        chunk_symbols.into_iter().partition(|s| s.kind == "reference");
                    const UNITY_KINDS: &[&str] =
                        &["unity_lifecycle", "scriptable_object", "serialized_field"];
                    let unity_tags = declarations
                        .iter()
                        .filter(|s| UNITY_KINDS.contains(&s.kind.as_str()))
                        .map(|s| s.kind.clone())
                        .collect();
                    points.push(ChunkPoint {
                        id,
                        vector,
                        payload: ChunkPayload {
                            path: rel_path.to_string(),
                            lang: lang.to_string(),
                            start_line: chunk.start_line,
                            end_line: chunk.end_line,
                            text: chunk.text.clone(),
                            file_hash: file_hash.clone(),
                            symbols: declarations.iter().map(|s| s.name.clone()).collect(),
                            symbol_names: declarations.iter().map(|s| s.name.clone()).collect(),
                            symbol_kinds: declarations.iter().map(|s| s.kind.clone()).collect(),
                            symbol_references: references.iter().map(|s| s.name.clone()).collect(),
                            unity_tags,
                        },
                    });
                }
                EmbedOutcome::TooLarge => {
                    if let Some((first, second)) = adaptive_split(&chunk, settings.overlap_lines) {
                        queue.push_front(second);
                        queue.push_front(first);
                    } else {
                        tracing::warn!(path = rel_path, "dropping chunk too large to embed and too small to split");
                    }
                }
            }
        }

        self.vector_store.upsert_points(collection_name, &points).await?;
        Ok(IndexOutcome { indexed: true, reason: IndexReason::Indexed(points.len()) })
    }
}

fn symbols_in_range(symbols: &[Symbol], start_line: usize, end_line: usize) -> Vec<Symbol> {
    symbols
        .iter()
        .filter(|s| s.line >= start_line && s.line <= end_line)
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_point_id_is_deterministic() {
        let a = chunk_point_id("src/a.ts", 1, 10);
        let b = chunk_point_id("src/a.ts", 1, 10);
        assert_eq!(a, b);
        assert!(Uuid::parse_str(&a).is_ok());
    }

    #[test]
    fn chunk_point_id_differs_for_different_ranges() {
        let a = chunk_point_id("src/a.ts", 1, 10);
        let b = chunk_point_id("src/a.ts", 11, 20);
        assert_ne!(a, b);
    }

    #[test]
    fn split_into_chunks_respects_overlap() {
        let content: String = (1..=25).map(|n| format!("line{n}")).collect::<Vec<_>>().join("\n");
        let chunks = split_into_chunks(&content, 10, 2);
        assert!(chunks.len() >= 3);
        assert_eq!(chunks[0].start_line, 1);
        assert_eq!(chunks[0].end_line, 10);
        assert_eq!(chunks[1].start_line, 9);
    }

    #[test]
    fn adaptive_split_refuses_small_chunks() {
        let chunk = Chunk { start_line: 1, end_line: 10, text: (1..=10).map(|n| format!("l{n}")).collect::<Vec<_>>().join("\n") };
        assert!(adaptive_split(&chunk, 50).is_none());
    }

    #[test]
    fn adaptive_split_halves_large_chunks_with_overlap() {
        let lines: Vec<String> = (1..=40).map(|n| format!("l{n}")).collect();
        let chunk = Chunk { start_line: 1, end_line: 40, text: lines.join("\n") };
        let (first, second) = adaptive_split(&chunk, 50).unwrap();
        assert!(first.end_line > second.start_line, "halves should overlap");
        assert_eq!(second.end_line, 40);
    }
}
