//! Top-k passage retrieval.

use std::sync::Arc;

use tracing::instrument;

use crate::embeddings::EmbeddingProvider;
use crate::store::{PassageRecord, PassageStore};
use crate::types::RagError;

/// A passage returned by retrieval, with its similarity score
/// (`1 - cosine distance`, larger is more similar).
#[derive(Clone, Debug)]
pub struct RetrievedPassage {
    pub passage: PassageRecord,
    pub score: f32,
}

/// Embeds a query and asks the store for its nearest passages.
///
/// `top_k` is fixed at construction; similarity itself is delegated entirely
/// to the store's nearest-neighbor search.
#[derive(Clone)]
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn PassageStore>,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn PassageStore>,
        top_k: usize,
    ) -> Self {
        Self {
            embedder,
            store,
            top_k: top_k.max(1),
        }
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Returns the `top_k` most similar passages, best first.
    ///
    /// Querying an empty index is a reported failure ([`RagError::EmptyIndex`]),
    /// never an empty context.
    #[instrument(skip(self), fields(top_k = self.top_k))]
    pub async fn retrieve(&self, query: &str) -> Result<Vec<RetrievedPassage>, RagError> {
        if query.trim().is_empty() {
            return Err(RagError::MissingInput { what: "query" });
        }
        if self.store.count().await? == 0 {
            return Err(RagError::EmptyIndex);
        }

        let query_embedding = self.embedder.embed(query).await?;
        let hits = self
            .store
            .search_similar(&query_embedding, self.top_k)
            .await?;
        if hits.is_empty() {
            return Err(RagError::EmptyIndex);
        }

        tracing::debug!(hits = hits.len(), "retrieved context passages");
        Ok(hits
            .into_iter()
            .map(|(passage, score)| RetrievedPassage { passage, score })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;

    use crate::embeddings::{HashEmbeddingModel, RigEmbeddingProvider};

    /// In-memory store stub with fixed search results.
    struct StubStore {
        hits: Vec<(PassageRecord, f32)>,
    }

    #[async_trait]
    impl PassageStore for StubStore {
        async fn insert_passages(&self, _passages: Vec<PassageRecord>) -> Result<(), RagError> {
            Ok(())
        }

        async fn get_passages_by_source(
            &self,
            _source: &str,
        ) -> Result<Vec<PassageRecord>, RagError> {
            Ok(Vec::new())
        }

        async fn get_passage_by_id(&self, _id: &str) -> Result<Option<PassageRecord>, RagError> {
            Ok(None)
        }

        async fn delete_passages_by_source(&self, _source: &str) -> Result<usize, RagError> {
            Ok(0)
        }

        async fn search_similar(
            &self,
            _query_embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<(PassageRecord, f32)>, RagError> {
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }

        async fn count(&self) -> Result<usize, RagError> {
            Ok(self.hits.len())
        }
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(RigEmbeddingProvider::new(HashEmbeddingModel::new(64)))
    }

    fn hit(id: &str, score: f32) -> (PassageRecord, f32) {
        (PassageRecord::new(id, "q", 0, format!("content {id}")), score)
    }

    #[tokio::test]
    async fn empty_store_is_a_reported_failure() {
        let retriever = Retriever::new(embedder(), Arc::new(StubStore { hits: vec![] }), 3);
        let err = retriever.retrieve("any question").await.unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex));
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let store = Arc::new(StubStore {
            hits: vec![hit("a", 0.9)],
        });
        let retriever = Retriever::new(embedder(), store, 3);
        let err = retriever.retrieve("   ").await.unwrap_err();
        assert!(matches!(err, RagError::MissingInput { what: "query" }));
    }

    #[tokio::test]
    async fn results_keep_store_order_and_scores() {
        let store = Arc::new(StubStore {
            hits: vec![hit("a", 0.92), hit("b", 0.81), hit("c", 0.40)],
        });
        let retriever = Retriever::new(embedder(), store, 2);

        let results = retriever.retrieve("chest pain").await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].passage.id, "a");
        assert_eq!(results[1].passage.id, "b");
        assert!(results[0].score > results[1].score);
    }

    #[tokio::test]
    async fn top_k_is_clamped_to_at_least_one() {
        let store = Arc::new(StubStore {
            hits: vec![hit("a", 0.9)],
        });
        let retriever = Retriever::new(embedder(), store, 0);
        assert_eq!(retriever.top_k(), 1);
        let results = retriever.retrieve("question").await.unwrap();
        assert_eq!(results.len(), 1);
    }
}
