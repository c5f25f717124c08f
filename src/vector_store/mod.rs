// Vector store module
// Collection management, upsert and nearest-neighbour search behind one trait

pub mod qdrant;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Result;

pub use qdrant::QdrantClient;

/// Payload stored alongside each vector
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Path of the source markdown file
    pub source: String,
    /// Index of the chunk within its source
    pub chunk_index: usize,
    /// The chunk text itself
    pub text: String,
}

/// One persisted point of the collection
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorRecord {
    pub id: Uuid,
    pub vector: Vec<f32>,
    pub payload: ChunkPayload,
}

/// Payload as returned by a search; older points may lack fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HitPayload {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub chunk_index: Option<usize>,
    #[serde(default)]
    pub text: Option<String>,
}

/// A nearest-neighbour match
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SearchHit {
    pub id: serde_json::Value,
    pub score: f32,
    #[serde(default)]
    pub payload: Option<HitPayload>,
}

impl SearchHit {
    /// The chunk text carried by this hit, if any
    #[inline]
    pub fn text(&self) -> Option<&str> {
        self.payload.as_ref().and_then(|p| p.text.as_deref())
    }
}

/// A hosted vector collection store.
///
/// Implementations talk to the store synchronously; async callers should
/// run them on a blocking thread.
pub trait VectorIndex: Send + Sync {
    /// Names of existing collections; doubles as a connectivity check
    fn list_collections(&self) -> Result<Vec<String>>;

    /// Drop `name` if present and create it empty with cosine distance
    fn recreate_collection(&self, name: &str, dimension: u32) -> Result<()>;

    /// Insert or replace records by id, returning once the write is applied
    fn upsert(&self, name: &str, records: &[VectorRecord]) -> Result<()>;

    /// Up to `limit` records nearest to `vector`, payload included
    fn search(&self, name: &str, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>>;
}
