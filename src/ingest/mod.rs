// Ingestion module
// Turns the markdown sources into a freshly rebuilt vector collection


use indicatif::ProgressBar;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;
use walkdir::WalkDir;

use crate::chunking::chunk_document;
use crate::config::Config;
use crate::embeddings::{BatchPolicy, Embedder, embed_in_batches};
use crate::markup::strip_markdown;
use crate::vector_store::{ChunkPayload, VectorIndex, VectorRecord};
use crate::{RagError, Result};

/// Conditions that end an ingestion run without writing any records
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestAbort {
    #[error("no markdown files found in {}", .0.display())]
    NoDocuments(PathBuf),

    #[error("no chunks were created from the documents")]
    NoChunks,

    #[error("no embeddings were generated: {0}")]
    NoEmbeddings(String),
}

/// Summary of a successful ingestion run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    /// Markdown files read
    pub files: usize,
    /// Chunks produced across all files
    pub chunks: usize,
    /// Embeddings returned by the embedding service
    pub embeddings: usize,
    /// Records written to the collection
    pub upserted: usize,
    /// Entries dropped to reconcile embeddings with chunk metadata
    pub truncated: usize,
    /// Embedding failure that ended batching early, if any
    pub embedding_error: Option<String>,
}

/// All `*.md` files under `dir`, sorted by path
#[inline]
pub fn discover_markdown_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!("Documents directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(std::io::Error::from)?;
        let is_markdown = entry.path().extension().is_some_and(|ext| ext == "md");
        if !entry.file_type().is_dir() && is_markdown {
            files.push(entry.into_path());
        }
    }

    files.sort();
    Ok(files)
}

/// Truncate both lists to the shorter length, returning how many entries were dropped
#[inline]
pub fn align_lengths<A, B>(left: &mut Vec<A>, right: &mut Vec<B>) -> usize {
    if left.len() == right.len() {
        return 0;
    }

    warn!(
        "Mismatch between number of embeddings and metadata entries: {} vs {}",
        left.len(),
        right.len()
    );

    let shorter = left.len().min(right.len());
    let dropped = left.len() + right.len() - 2 * shorter;
    left.truncate(shorter);
    right.truncate(shorter);
    dropped
}

/// One-shot pipeline from the documents directory to the vector collection
pub struct IngestPipeline {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    config: Arc<Config>,
}

impl IngestPipeline {
    #[inline]
    pub fn new(embedder: Arc<dyn Embedder>, index: Arc<dyn VectorIndex>, config: Arc<Config>) -> Self {
        Self {
            embedder,
            index,
            config,
        }
    }

    fn batch_policy(&self) -> BatchPolicy {
        BatchPolicy {
            batch_size: self.config.ingest.batch_size,
            delay: Duration::from_millis(self.config.ingest.batch_delay_ms),
        }
    }

    /// Check the store is reachable, returning the number of existing collections
    fn connect(&self) -> Result<usize> {
        match self.index.list_collections() {
            Ok(collections) => {
                info!(
                    "Connected to vector store, found {} existing collections",
                    collections.len()
                );
                Ok(collections.len())
            }
            Err(RagError::VectorStore(message)) => {
                error!("Failed to connect to vector store: {}", message);
                Err(RagError::VectorStore(format!(
                    "{} (check QDRANT_URL and QDRANT_API_KEY)",
                    message
                )))
            }
            Err(e) => Err(e),
        }
    }

    /// Read, strip and chunk every file, returning texts and their payloads in order
    fn collect_chunks(&self, files: &[PathBuf]) -> Result<(Vec<String>, Vec<ChunkPayload>)> {
        let mut texts = Vec::new();
        let mut payloads = Vec::new();

        for path in files {
            info!("Processing document: {}", path.display());
            let markdown = fs::read_to_string(path)?;
            let plain = strip_markdown(&markdown);
            let source = path.display().to_string();

            for chunk in chunk_document(&source, &plain, &self.config.chunking) {
                if chunk.text.trim().is_empty() {
                    warn!(
                        "Dropping empty chunk {} of {}",
                        chunk.chunk_index, chunk.source
                    );
                    continue;
                }
                texts.push(chunk.text.clone());
                payloads.push(ChunkPayload {
                    source: chunk.source,
                    chunk_index: chunk.chunk_index,
                    text: chunk.text,
                });
            }
        }

        Ok((texts, payloads))
    }

    /// Rebuild the collection from the documents directory
    #[inline]
    pub fn run(&self, progress: &ProgressBar) -> Result<IngestReport> {
        let collection = &self.config.qdrant.collection;

        self.connect()?;

        info!("Setting up collection '{}'", collection);
        self.index
            .recreate_collection(collection, self.config.qdrant.vector_size)?;

        let docs_dir = &self.config.ingest.docs_dir;
        info!("Scanning for markdown files in {}", docs_dir.display());
        let files = discover_markdown_files(docs_dir)?;
        if files.is_empty() {
            return Err(IngestAbort::NoDocuments(docs_dir.clone()).into());
        }

        let (texts, mut payloads) = self.collect_chunks(&files)?;
        if texts.is_empty() {
            return Err(IngestAbort::NoChunks.into());
        }
        info!("Created {} chunks from {} files", texts.len(), files.len());

        progress.set_length(texts.len() as u64);
        let batches = embed_in_batches(
            self.embedder.as_ref(),
            &texts,
            &self.batch_policy(),
            progress,
        );
        progress.finish_and_clear();

        let mut embeddings = batches.embeddings;
        let embedded = embeddings.len();
        if embeddings.is_empty() {
            let reason = batches
                .error
                .unwrap_or_else(|| "every batch returned an empty result".to_string());
            return Err(IngestAbort::NoEmbeddings(reason).into());
        }

        let truncated = align_lengths(&mut embeddings, &mut payloads);

        let records: Vec<VectorRecord> = embeddings
            .into_iter()
            .zip(payloads)
            .map(|(vector, payload)| VectorRecord {
                id: Uuid::new_v4(),
                vector,
                payload,
            })
            .collect();

        debug!("Upserting {} records into '{}'", records.len(), collection);
        self.index.upsert(collection, &records)?;
        info!("Ingested {} records into '{}'", records.len(), collection);

        Ok(IngestReport {
            files: files.len(),
            chunks: texts.len(),
            embeddings: embedded,
            upserted: records.len(),
            truncated,
            embedding_error: batches.error,
        })
    }
}
