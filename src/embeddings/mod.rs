// Embeddings module
// Text-to-vector adapter trait and the rate-limited batch driver used by ingestion


use indicatif::ProgressBar;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::Result;

/// Maps text to fixed-length vectors using an external embedding model.
///
/// Documents and queries must be embedded by the same model so that their
/// vectors are comparable.
pub trait Embedder: Send + Sync {
    /// Embed document chunks, one vector per input
    fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query
    fn embed_query(&self, text: &str) -> Result<Vec<f32>>;
}

/// How bulk embedding requests are split and paced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchPolicy {
    pub batch_size: usize,
    /// Pause after every batch call
    pub delay: Duration,
}

impl Default for BatchPolicy {
    #[inline]
    fn default() -> Self {
        Self {
            batch_size: 50,
            delay: Duration::from_secs(1),
        }
    }
}

/// Result of embedding a list of texts batch by batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchEmbeddings {
    /// Vectors in input order, possibly fewer than inputs
    pub embeddings: Vec<Vec<f32>>,
    /// Batches that produced nothing and were skipped
    pub skipped_batches: usize,
    /// The failure that stopped embedding early, if any
    pub error: Option<String>,
}

/// Embed `texts` in fixed-size batches, sequentially.
///
/// Empty strings are dropped from each batch before the call, a batch that
/// returns no vectors is skipped, and the first failing batch ends the run
/// with whatever was collected so far. Callers must reconcile the returned
/// vector count against their own metadata.
#[inline]
pub fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    policy: &BatchPolicy,
    progress: &ProgressBar,
) -> BatchEmbeddings {
    let mut result = BatchEmbeddings::default();
    let batch_size = policy.batch_size.max(1);

    info!("Generating embeddings for {} chunks", texts.len());

    for (batch_number, batch) in texts.chunks(batch_size).enumerate().map(|(i, b)| (i + 1, b)) {
        let non_empty: Vec<String> = batch
            .iter()
            .filter(|text| !text.trim().is_empty())
            .cloned()
            .collect();

        if non_empty.is_empty() {
            warn!("Skipping empty batch {}", batch_number);
            result.skipped_batches += 1;
            progress.inc(batch.len() as u64);
            continue;
        }

        match embedder.embed_documents(&non_empty) {
            Ok(embeddings) if embeddings.is_empty() => {
                warn!(
                    "Empty or invalid embedding result for batch {}",
                    batch_number
                );
                result.skipped_batches += 1;
            }
            Ok(embeddings) => {
                debug!(
                    "Embedded batch {}, added {} embeddings",
                    batch_number,
                    embeddings.len()
                );
                result.embeddings.extend(embeddings);
            }
            Err(e) => {
                error!("Embedding failed at batch {}: {}", batch_number, e);
                result.error = Some(e.to_string());
                return result;
            }
        }

        progress.inc(batch.len() as u64);

        if !policy.delay.is_zero() {
            std::thread::sleep(policy.delay);
        }
    }

    info!("Generated {} embeddings total", result.embeddings.len());
    result
}
