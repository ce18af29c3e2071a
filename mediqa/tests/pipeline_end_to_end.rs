//! End-to-end pipeline tests over the bundled fixture dataset.
//!
//! Everything runs offline and deterministic: hash embeddings, a sqlite-vec
//! index in a temporary directory, and the extractive generator standing in
//! for a model server.

use std::path::PathBuf;
use std::sync::Arc;

use mediqa::dataset::QaDataset;
use mediqa::embeddings::{EmbeddingProvider, HashEmbeddingModel, RigEmbeddingProvider};
use mediqa::generation::ExtractiveGenerator;
use mediqa::ingest::Ingestor;
use mediqa::pipeline::RagPipeline;
use mediqa::retrieval::Retriever;
use mediqa::store::{PassageStore, SqlitePassageStore};
use mediqa::types::RagError;
use tempfile::TempDir;

fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join("medical_qa.jsonl")
}

struct TestRig {
    _dir: TempDir,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn PassageStore>,
}

async fn indexed_rig() -> TestRig {
    let dir = TempDir::new().unwrap();
    let model = HashEmbeddingModel::new(256);
    let store: Arc<dyn PassageStore> = Arc::new(
        SqlitePassageStore::open(dir.path().join("index.db"), &model)
            .await
            .unwrap(),
    );
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(RigEmbeddingProvider::new(model));

    let dataset = QaDataset::load(fixture_path()).await.unwrap();
    let report = Ingestor::new(embedder.clone(), store.clone())
        .ingest(&dataset)
        .await
        .unwrap();
    assert_eq!(report.records_ingested, dataset.len());

    TestRig {
        _dir: dir,
        embedder,
        store,
    }
}

fn pipeline(rig: &TestRig, top_k: usize) -> RagPipeline {
    RagPipeline::builder()
        .with_retriever(Retriever::new(rig.embedder.clone(), rig.store.clone(), top_k))
        .with_generator(Arc::new(ExtractiveGenerator::new(2048)))
        .build()
        .unwrap()
}

#[tokio::test]
async fn answers_the_ischemic_heart_disease_question_from_context() {
    let rig = indexed_rig().await;
    let pipeline = pipeline(&rig, 3);

    let outcome = pipeline
        .answer_detailed("What are the symptoms of ischemic heart disease?")
        .await
        .unwrap();

    assert!(!outcome.answer.trim().is_empty());
    // The extractive generator answers with the top retrieved passage, so the
    // answer must come from the ischemic heart disease source document.
    assert!(
        outcome.answer.contains("systolic heart failure"),
        "answer was not drawn from the expected context: {}",
        outcome.answer
    );
    assert!(!outcome.passages.is_empty());
    assert!(
        outcome.passages[0]
            .passage
            .content
            .contains("Ischemic heart disease")
    );
}

#[tokio::test]
async fn retrieval_is_deterministic_for_a_fixed_query() {
    let rig = indexed_rig().await;
    let retriever = Retriever::new(rig.embedder.clone(), rig.store.clone(), 3);

    let first = retriever
        .retrieve("How is type 2 diabetes managed?")
        .await
        .unwrap();
    let second = retriever
        .retrieve("How is type 2 diabetes managed?")
        .await
        .unwrap();

    assert_eq!(first.len(), second.len());
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.passage.id, b.passage.id);
        assert_eq!(a.score, b.score);
    }
    assert!(
        first[0].passage.content.contains("type 2 diabetes"),
        "best passage should share the query's vocabulary"
    );
}

#[tokio::test]
async fn top_k_bounds_the_context() {
    let rig = indexed_rig().await;
    let retriever = Retriever::new(rig.embedder.clone(), rig.store.clone(), 2);

    let results = retriever.retrieve("warning signs of stroke").await.unwrap();
    assert_eq!(results.len(), 2);
    // Best first.
    assert!(results[0].score >= results[1].score);
}

#[tokio::test]
async fn empty_store_surfaces_a_reported_failure() {
    let dir = TempDir::new().unwrap();
    let model = HashEmbeddingModel::new(256);
    let store: Arc<dyn PassageStore> = Arc::new(
        SqlitePassageStore::open(dir.path().join("empty.db"), &model)
            .await
            .unwrap(),
    );
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(RigEmbeddingProvider::new(model));

    let pipeline = RagPipeline::builder()
        .with_retriever(Retriever::new(embedder, store, 3))
        .with_generator(Arc::new(ExtractiveGenerator::new(2048)))
        .build()
        .unwrap();

    let err = pipeline.answer("any question at all").await.unwrap_err();
    assert!(matches!(err, RagError::EmptyIndex));
}

#[tokio::test]
async fn answer_respects_the_configured_length_cap() {
    let rig = indexed_rig().await;
    let max_chars = 40;
    let pipeline = RagPipeline::builder()
        .with_retriever(Retriever::new(rig.embedder.clone(), rig.store.clone(), 3))
        .with_generator(Arc::new(ExtractiveGenerator::new(max_chars)))
        .build()
        .unwrap();

    let answer = pipeline
        .answer("What causes community-acquired pneumonia?")
        .await
        .unwrap();
    assert!(answer.chars().count() <= max_chars);
}
