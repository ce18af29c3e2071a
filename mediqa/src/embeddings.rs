//! Embedding providers.
//!
//! [`EmbeddingProvider`] is the object-safe seam the retriever and ingestor
//! work against. [`RigEmbeddingProvider`] adapts any rig `EmbeddingModel`
//! (Ollama, OpenAI-compatible) to it. [`HashEmbeddingModel`] is a
//! deterministic, network-free model: words are hashed into buckets and the
//! vector is L2-normalized, so texts sharing vocabulary land close in cosine
//! space. It backs the offline demo mode and the test suites.

use async_trait::async_trait;
use rig::embeddings::embedding::{Embedding, EmbeddingError, EmbeddingModel};
use unicode_segmentation::UnicodeSegmentation;

use crate::types::RagError;

/// Maps batches of text to fixed-length vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embeds a batch of inputs, one vector per input, in order.
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError>;

    /// Vector length produced by this provider.
    fn dims(&self) -> usize;

    /// Embeds a single input.
    async fn embed(&self, input: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed_batch(&[input.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| RagError::Embedding("provider returned no vector".into()))
    }
}

/// Bridges a rig `EmbeddingModel` into [`EmbeddingProvider`].
#[derive(Clone)]
pub struct RigEmbeddingProvider<E>
where
    E: EmbeddingModel,
{
    model: E,
}

impl<E> RigEmbeddingProvider<E>
where
    E: EmbeddingModel,
{
    pub fn new(model: E) -> Self {
        Self { model }
    }
}

#[async_trait]
impl<E> EmbeddingProvider for RigEmbeddingProvider<E>
where
    E: EmbeddingModel + Send + Sync,
{
    async fn embed_batch(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut vectors = Vec::with_capacity(inputs.len());
        for batch in inputs.chunks(E::MAX_DOCUMENTS.max(1)) {
            let embeddings = self
                .model
                .embed_texts(batch.iter().cloned())
                .await
                .map_err(|err| RagError::Embedding(err.to_string()))?;
            vectors.extend(
                embeddings
                    .into_iter()
                    .map(|embedding| embedding.vec.into_iter().map(|v| v as f32).collect()),
            );
        }
        Ok(vectors)
    }

    fn dims(&self) -> usize {
        self.model.ndims()
    }
}

/// Deterministic bag-of-words embedding model.
///
/// Not a semantic model: similarity reflects vocabulary overlap only. Good
/// enough for wiring, retrieval ordering, and offline demos.
#[derive(Clone, Debug)]
pub struct HashEmbeddingModel {
    dims: usize,
}

impl HashEmbeddingModel {
    pub const DEFAULT_DIMS: usize = 256;

    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(1) }
    }
}

impl Default for HashEmbeddingModel {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMS)
    }
}

impl EmbeddingModel for HashEmbeddingModel {
    const MAX_DOCUMENTS: usize = 64;

    type Client = ();

    fn make(_client: &Self::Client, _model: impl Into<String>, dims: Option<usize>) -> Self {
        Self::new(dims.unwrap_or(Self::DEFAULT_DIMS))
    }

    fn ndims(&self) -> usize {
        self.dims
    }

    fn embed_texts(
        &self,
        texts: impl IntoIterator<Item = String> + Send,
    ) -> impl std::future::Future<Output = Result<Vec<Embedding>, EmbeddingError>> + Send {
        let dims = self.dims;
        let docs: Vec<String> = texts.into_iter().collect();
        async move {
            Ok(docs
                .into_iter()
                .map(|document| Embedding {
                    vec: hash_to_vec(&document, dims),
                    document,
                })
                .collect())
        }
    }
}

/// Hashes each word into a bucket and normalizes the counts.
///
/// Wordless input (punctuation, empty string) falls back to hashing the raw
/// text so the vector is never all zeros; cosine distance against a zero
/// vector is undefined.
fn hash_to_vec(text: &str, dims: usize) -> Vec<f64> {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    let mut vec = vec![0.0f64; dims];
    let mut word_count = 0usize;
    for word in text.unicode_words() {
        let lowered = word.to_lowercase();
        let mut hasher = DefaultHasher::new();
        lowered.hash(&mut hasher);
        let bucket = (hasher.finish() % dims as u64) as usize;
        vec[bucket] += 1.0;
        word_count += 1;
    }

    if word_count == 0 {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();
        for (i, slot) in vec.iter_mut().enumerate() {
            let bits = seed.rotate_left((i % 64) as u32) ^ ((i as u64) << 24);
            *slot = (bits as f64) / u64::MAX as f64 + 0.001;
        }
    }

    let norm = vec.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        for v in &mut vec {
            *v /= norm;
        }
    }
    vec
}
