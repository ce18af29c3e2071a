//! Vector store backends for indexed passages.
//!
//! [`PassageStore`] abstracts over storage so the retriever and ingestor are
//! not tied to one database:
//!
//! ```text
//!      Ingestor ──► insert_passages ──┐
//!                                     ▼
//!                              PassageStore (async trait)
//!                                     │
//!                                     ▼
//!                       SqlitePassageStore (sqlite-vec)
//!                                     ▲
//!      Retriever ──► search_similar ──┘
//! ```
//!
//! The on-disk layout (tables, embedding blobs, index structures) is owned
//! entirely by `rig-sqlite` and `sqlite-vec`; this module only reads and
//! writes through their interfaces.

pub mod sqlite;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::RagError;

pub use sqlite::{PassageRow, SqlitePassageStore};

/// A passage with its embedding, ready for storage.
///
/// Backend-agnostic: each store implementation converts to and from its own
/// row type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PassageRecord {
    /// Unique passage id.
    pub id: String,
    /// Identifier of the originating record. For dataset-derived passages
    /// this is the QA question the source document belongs to.
    pub source: String,
    /// Zero-based position of this passage within its source document.
    pub chunk_index: usize,
    /// Passage text.
    pub content: String,
    /// Additional metadata as JSON.
    pub metadata: serde_json::Value,
    /// Embedding vector, if computed.
    pub embedding: Option<Vec<f32>>,
}

impl PassageRecord {
    pub fn new(
        id: impl Into<String>,
        source: impl Into<String>,
        chunk_index: usize,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            chunk_index,
            content: content.into(),
            metadata: serde_json::Value::Object(Default::default()),
            embedding: None,
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    #[must_use]
    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

impl From<PassageRecord> for PassageRow {
    fn from(record: PassageRecord) -> Self {
        PassageRow {
            id: record.id,
            source: record.source,
            chunk_index: record.chunk_index,
            content: record.content,
            metadata: record.metadata,
        }
    }
}

/// Unified interface over passage storage backends.
#[async_trait]
pub trait PassageStore: Send + Sync {
    /// Inserts passage records. Records without an embedding are skipped;
    /// only embedded passages are reachable through similarity search.
    async fn insert_passages(&self, passages: Vec<PassageRecord>) -> Result<(), RagError>;

    /// Returns all passages belonging to a source, in insertion order.
    async fn get_passages_by_source(&self, source: &str) -> Result<Vec<PassageRecord>, RagError>;

    /// Looks up one passage by id.
    async fn get_passage_by_id(&self, id: &str) -> Result<Option<PassageRecord>, RagError>;

    /// Deletes all passages belonging to a source, returning the count.
    async fn delete_passages_by_source(&self, source: &str) -> Result<usize, RagError>;

    /// Nearest-neighbor search: passages ordered most similar first, at most
    /// `top_k` results, each with its similarity score.
    async fn search_similar(
        &self,
        query_embedding: &[f32],
        top_k: usize,
    ) -> Result<Vec<(PassageRecord, f32)>, RagError>;

    /// Total number of stored passages.
    async fn count(&self) -> Result<usize, RagError>;
}
