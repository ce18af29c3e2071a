//! Shared error taxonomy for the pipeline.
//!
//! Every stage reports failures through [`RagError`]. The enum exists purely
//! as the propagation vehicle: stages never catch, retry, or downgrade an
//! error. Callers see the first failure via `?` all the way out.

use thiserror::Error;

/// Errors surfaced by dataset loading, ingestion, retrieval, generation,
/// and fine-tuning.
#[derive(Debug, Error)]
pub enum RagError {
    /// Dataset file could not be parsed into QA records.
    #[error("dataset error: {0}")]
    Dataset(String),

    /// Document splitting failed (invalid chunking configuration).
    #[error("chunking error: {0}")]
    Chunking(String),

    /// The embedding provider rejected or failed a request.
    #[error("embedding error: {0}")]
    Embedding(String),

    /// Vector store operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// Retrieval ran against a store with no indexed passages.
    #[error("vector index is empty; run ingestion before querying")]
    EmptyIndex,

    /// Prompt template construction or rendering failed.
    #[error("template error: {0}")]
    Template(String),

    /// The completion provider rejected or failed a request.
    #[error("generation error ({provider}): {message}")]
    Generation {
        provider: &'static str,
        message: String,
    },

    /// Fine-tuning job creation, polling, or completion failed.
    #[error("fine-tuning error: {0}")]
    Training(String),

    /// A required input was absent.
    #[error("missing required input: {what}")]
    MissingInput { what: &'static str },

    /// Environment or runtime configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}
