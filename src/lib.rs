use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Ingestion aborted: {0}")]
    Ingest(#[from] ingest::IngestAbort),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Coarse classification of a [`RagError`], rendered to API callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Embedding,
    VectorStore,
    Generation,
    Timeout,
    Ingest,
    Io,
    Other,
}

impl RagError {
    #[inline]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::VectorStore(_) => ErrorKind::VectorStore,
            Self::Generation(_) => ErrorKind::Generation,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Ingest(_) => ErrorKind::Ingest,
            Self::Io(_) => ErrorKind::Io,
            Self::Other(_) => ErrorKind::Other,
        }
    }
}

pub mod chunking;
pub mod commands;
pub mod config;
pub mod embeddings;
pub mod gemini;
pub mod http;
pub mod ingest;
pub mod markup;
pub mod rag;
pub mod server;
pub mod vector_store;
