//! Error taxonomy for the indexing core.
//!
//! Mirrors the categories in spec §7: configuration errors and protocol
//! errors are meant to propagate to the caller; transient backend errors
//! and "too large" embedding rejections are meant to be handled locally by
//! callers that know how to retry or split. Filesystem errors on a single
//! file are always local to that file's processing.

use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed global config or project whitelist. Propagates to the caller.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// 5xx/429 from the vector store or embeddings backend, or a network
    /// reset, after the retry budget in §4.4 is exhausted.
    #[error("transient backend error: {0}")]
    TransientBackend(String),

    /// A 4xx from a backend that is not retryable.
    #[error("backend rejected request: {0}")]
    PermanentBackend(String),

    /// Could not read, stat, or hash a specific file. Callers skip the file
    /// and continue rather than aborting the whole operation.
    #[error("filesystem error on {path}: {source}")]
    Filesystem { path: PathBuf, #[source] source: std::io::Error },

    /// No project is registered for a given root or collection name.
    #[error("unknown project: {0}")]
    UnknownProject(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Filesystem { path: path.into(), source }
    }

    pub fn configuration(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }
}
