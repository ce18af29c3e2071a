//! Index building: dataset records through chunking and embedding into the
//! passage store.
//!
//! Ingestion is a one-shot offline job. Because embedding calls dominate its
//! runtime, an optional [`ResumeTracker`] records which dataset records have
//! been indexed so an interrupted run can pick up where it stopped.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::json;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::instrument;
use uuid::Uuid;

use crate::chunking::{ChunkingConfig, chunk_document};
use crate::dataset::QaDataset;
use crate::embeddings::EmbeddingProvider;
use crate::store::{PassageRecord, PassageStore};
use crate::types::RagError;

/// Counters from one ingest run.
#[derive(Clone, Copy, Debug, Default)]
pub struct IngestReport {
    /// Records chunked, embedded, and stored.
    pub records_ingested: usize,
    /// Records skipped: already indexed per the resume state, or with an
    /// empty source document.
    pub records_skipped: usize,
    pub chunks_written: usize,
    pub duration: Duration,
}

/// Drives dataset records into the passage store.
pub struct Ingestor {
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn PassageStore>,
    chunking: ChunkingConfig,
    resume: Option<ResumeTracker>,
}

impl Ingestor {
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, store: Arc<dyn PassageStore>) -> Self {
        Self {
            embedder,
            store,
            chunking: ChunkingConfig::default(),
            resume: None,
        }
    }

    #[must_use]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[must_use]
    pub fn with_resume(mut self, tracker: ResumeTracker) -> Self {
        self.resume = Some(tracker);
        self
    }

    /// Chunks, embeds, and stores every record of `dataset`.
    ///
    /// An empty dataset is an error: indexing nothing would leave retrieval
    /// permanently failing with an empty store.
    #[instrument(skip(self, dataset), fields(records = dataset.len()))]
    pub async fn ingest(&self, dataset: &QaDataset) -> Result<IngestReport, RagError> {
        if dataset.is_empty() {
            return Err(RagError::Dataset("dataset contains no records".into()));
        }

        let started = Instant::now();
        let mut report = IngestReport::default();

        for record in dataset.iter() {
            if let Some(tracker) = &self.resume {
                if tracker.contains(&record.question).await {
                    report.records_skipped += 1;
                    tracing::debug!(question = %record.question, "already indexed, skipping");
                    continue;
                }
            }

            let chunks = chunk_document(&record.source_document, &self.chunking)?;
            if chunks.is_empty() {
                report.records_skipped += 1;
                tracing::warn!(question = %record.question, "record has no indexable text");
                continue;
            }

            let texts: Vec<String> = chunks.iter().map(|chunk| chunk.content.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;
            if embeddings.len() != chunks.len() {
                return Err(RagError::Embedding(format!(
                    "provider returned {} vectors for {} chunks",
                    embeddings.len(),
                    chunks.len()
                )));
            }

            let passages: Vec<PassageRecord> = chunks
                .iter()
                .zip(embeddings)
                .map(|(chunk, embedding)| {
                    PassageRecord::new(
                        Uuid::new_v4().to_string(),
                        record.question.clone(),
                        chunk.chunk_index,
                        chunk.content.clone(),
                    )
                    .with_metadata(json!({
                        "word_start": chunk.word_start,
                        "word_count": chunk.word_count,
                    }))
                    .with_embedding(embedding)
                })
                .collect();

            let stored = passages.len();
            self.store.insert_passages(passages).await?;
            report.records_ingested += 1;
            report.chunks_written += stored;

            if let Some(tracker) = &self.resume {
                tracker.mark_processed(&record.question).await?;
            }
        }

        report.duration = started.elapsed();
        tracing::info!(
            ingested = report.records_ingested,
            skipped = report.records_skipped,
            chunks = report.chunks_written,
            "ingest complete"
        );
        Ok(report)
    }
}

/// Tracks which dataset records (keyed by question) are already indexed,
/// persisted as a JSON array next to the index.
#[derive(Clone, Debug)]
pub struct ResumeTracker {
    path: PathBuf,
    state: Arc<Mutex<HashSet<String>>>,
}

impl ResumeTracker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads previously persisted state, if any.
    pub async fn load(&self) -> Result<(), RagError> {
        if !self.path.exists() {
            return Ok(());
        }
        let data = fs::read_to_string(&self.path).await?;
        let keys: Vec<String> = serde_json::from_str(&data)?;
        let mut guard = self.state.lock().await;
        guard.clear();
        guard.extend(keys);
        Ok(())
    }

    pub async fn contains(&self, key: &str) -> bool {
        let guard = self.state.lock().await;
        guard.contains(key)
    }

    /// Marks a record as indexed and persists the updated state.
    pub async fn mark_processed(&self, key: &str) -> Result<(), RagError> {
        let mut guard = self.state.lock().await;
        let inserted = guard.insert(key.to_string());
        if !inserted && self.path.exists() {
            return Ok(());
        }
        let keys: Vec<String> = guard.iter().cloned().collect();
        drop(guard);

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        let serialized = serde_json::to_string(&keys)?;
        fs::write(&self.path, serialized).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use tempfile::tempdir;

    use crate::dataset::QaRecord;
    use crate::embeddings::{HashEmbeddingModel, RigEmbeddingProvider};

    /// Store stub that remembers inserted passages.
    #[derive(Default)]
    struct MemoryStore {
        passages: Mutex<Vec<PassageRecord>>,
    }

    #[async_trait]
    impl PassageStore for MemoryStore {
        async fn insert_passages(&self, passages: Vec<PassageRecord>) -> Result<(), RagError> {
            self.passages.lock().await.extend(passages);
            Ok(())
        }
        async fn get_passages_by_source(
            &self,
            source: &str,
        ) -> Result<Vec<PassageRecord>, RagError> {
            Ok(self
                .passages
                .lock()
                .await
                .iter()
                .filter(|p| p.source == source)
                .cloned()
                .collect())
        }
        async fn get_passage_by_id(&self, id: &str) -> Result<Option<PassageRecord>, RagError> {
            Ok(self
                .passages
                .lock()
                .await
                .iter()
                .find(|p| p.id == id)
                .cloned())
        }
        async fn delete_passages_by_source(&self, source: &str) -> Result<usize, RagError> {
            let mut guard = self.passages.lock().await;
            let before = guard.len();
            guard.retain(|p| p.source != source);
            Ok(before - guard.len())
        }
        async fn search_similar(
            &self,
            _query_embedding: &[f32],
            _top_k: usize,
        ) -> Result<Vec<(PassageRecord, f32)>, RagError> {
            Ok(Vec::new())
        }
        async fn count(&self) -> Result<usize, RagError> {
            Ok(self.passages.lock().await.len())
        }
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(RigEmbeddingProvider::new(HashEmbeddingModel::new(64)))
    }

    fn dataset() -> QaDataset {
        QaDataset::from_records(vec![
            QaRecord::new(
                "What is hypertension?",
                "Persistently elevated arterial blood pressure.",
                "Hypertension is persistently elevated arterial blood pressure. Long-standing \
                 hypertension damages vessels in the heart, kidneys, brain, and retina.",
            ),
            QaRecord::new(
                "What are the symptoms of anemia?",
                "Fatigue, pallor, and shortness of breath.",
                "Anemia reduces oxygen delivery to tissues. Patients report fatigue, pallor, \
                 exertional shortness of breath, and sometimes palpitations.",
            ),
        ])
    }

    #[tokio::test]
    async fn ingest_writes_every_record() {
        let store = Arc::new(MemoryStore::default());
        let ingestor = Ingestor::new(embedder(), store.clone());

        let report = ingestor.ingest(&dataset()).await.unwrap();
        assert_eq!(report.records_ingested, 2);
        assert_eq!(report.records_skipped, 0);
        assert!(report.chunks_written >= 2);
        assert_eq!(store.count().await.unwrap(), report.chunks_written);

        let stored = store
            .get_passages_by_source("What is hypertension?")
            .await
            .unwrap();
        assert!(!stored.is_empty());
        assert!(stored[0].embedding.is_some());
    }

    #[tokio::test]
    async fn empty_dataset_is_an_error() {
        let ingestor = Ingestor::new(embedder(), Arc::new(MemoryStore::default()));
        let err = ingestor.ingest(&QaDataset::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Dataset(_)));
    }

    #[tokio::test]
    async fn record_without_text_is_skipped() {
        let store = Arc::new(MemoryStore::default());
        let ingestor = Ingestor::new(embedder(), store.clone());
        let dataset = QaDataset::from_records(vec![
            QaRecord::new("Only whitespace?", "answer", "   \n "),
            dataset().records()[0].clone(),
        ]);

        let report = ingestor.ingest(&dataset).await.unwrap();
        assert_eq!(report.records_ingested, 1);
        assert_eq!(report.records_skipped, 1);
    }

    #[tokio::test]
    async fn resumed_run_skips_completed_records() {
        let dir = tempdir().unwrap();
        let state_path = dir.path().join("resume.json");
        let store = Arc::new(MemoryStore::default());

        let tracker = ResumeTracker::new(&state_path);
        tracker.load().await.unwrap();
        let ingestor = Ingestor::new(embedder(), store.clone()).with_resume(tracker);
        let first = ingestor.ingest(&dataset()).await.unwrap();
        assert_eq!(first.records_ingested, 2);

        // Fresh tracker over the same state file sees both records as done.
        let tracker = ResumeTracker::new(&state_path);
        tracker.load().await.unwrap();
        let ingestor = Ingestor::new(embedder(), store.clone()).with_resume(tracker);
        let second = ingestor.ingest(&dataset()).await.unwrap();
        assert_eq!(second.records_ingested, 0);
        assert_eq!(second.records_skipped, 2);

        // Nothing stored twice.
        assert_eq!(store.count().await.unwrap(), first.chunks_written);
    }

    #[tokio::test]
    async fn tracker_persists_state() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("state.json");
        let tracker = ResumeTracker::new(&path);
        tracker.load().await.unwrap();

        assert!(!tracker.contains("What is hypertension?").await);
        tracker.mark_processed("What is hypertension?").await.unwrap();
        assert!(tracker.contains("What is hypertension?").await);

        let tracker_two = ResumeTracker::new(&path);
        tracker_two.load().await.unwrap();
        assert!(tracker_two.contains("What is hypertension?").await);
    }
}
