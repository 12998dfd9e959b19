//! Core library for the code indexing daemon: project sync, vector-store
//! adapter, dependency graph, symbol extraction, and the file-selection
//! policy that feeds them all.

pub mod chunker;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod graph;
pub mod imports;
pub mod project;
pub mod selection;
pub mod snapshot;
pub mod sync;
pub mod symbols;
pub mod vector_store;

pub use error::{Error, Result};
pub use project::{Project, Settings};
