
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Separator between paragraphs in plain text
pub const PARAGRAPH_SEPARATOR: &str = "\n\n";

/// A chunk of one source document, ready for embedding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentChunk {
    /// Path of the markdown file the chunk came from
    pub source: String,
    /// The index of this chunk within its source
    pub chunk_index: usize,
    /// Plain text content, never empty
    pub text: String,
}

/// Configuration for paragraph chunking
///
/// `chunk_overlap` is validated and carried through configuration, but
/// paragraph packing never copies text from one chunk into the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Target chunk size in characters
    pub chunk_size: usize,
    /// Requested overlap between adjacent chunks in characters (not applied)
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            chunk_size: 800,
            chunk_overlap: 100,
        }
    }
}

/// Split plain text into paragraph-aligned chunks.
///
/// Paragraphs are packed greedily while the buffer stays under
/// `chunk_size` characters. A paragraph that does not fit starts the next
/// chunk; a paragraph that alone exceeds `chunk_size` becomes its own chunk
/// and is never split.
#[inline]
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();
    // Character count of `current`, including trailing separators
    let mut current_len = 0;

    for paragraph in text.split(PARAGRAPH_SEPARATOR) {
        if paragraph.trim().is_empty() {
            continue;
        }

        let paragraph_len = paragraph.chars().count();

        if current_len + paragraph_len + PARAGRAPH_SEPARATOR.len() >= config.chunk_size
            && !current.trim().is_empty()
        {
            chunks.push(current.trim().to_string());
            current.clear();
            current_len = 0;
        }

        current.push_str(paragraph);
        current.push_str(PARAGRAPH_SEPARATOR);
        current_len += paragraph_len + PARAGRAPH_SEPARATOR.len();
    }

    if !current.trim().is_empty() {
        chunks.push(current.trim().to_string());
    }

    chunks
}

/// Chunk one document, numbering its chunks from zero
#[inline]
pub fn chunk_document(source: &str, text: &str, config: &ChunkingConfig) -> Vec<DocumentChunk> {
    let chunks: Vec<DocumentChunk> = chunk_text(text, config)
        .into_iter()
        .enumerate()
        .map(|(chunk_index, text)| DocumentChunk {
            source: source.to_string(),
            chunk_index,
            text,
        })
        .collect();

    debug!(
        "Chunked '{}' into {} chunks (avg {} chars)",
        source,
        chunks.len(),
        chunks.iter().map(|c| c.text.chars().count()).sum::<usize>() / chunks.len().max(1)
    );

    chunks
}
