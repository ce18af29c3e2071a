//! Retrieval-augmented medical question answering.
//!
//! The crate is a linear composition of stages; each module owns one of them:
//!
//! ```text
//! Dataset file ──► dataset::QaDataset ──► chunking ──► embeddings ──┐
//!                                                                   ▼
//!                                                      store::PassageStore
//!                                                      (sqlite-vec index)
//!                                                                   │
//! Question ──► retrieval::Retriever ──► prompt::PromptTemplate ─────┤
//!                                                                   ▼
//!                                              generation::Generator
//!                                                                   │
//!                                                                   ▼
//!                                         pipeline::RagPipeline::answer
//! ```
//!
//! [`ingest::Ingestor`] builds the index offline; [`finetune::FineTuneClient`]
//! drives a one-shot fine-tuning job and records the resulting model in a
//! manifest that [`generation`] consumes. Every stage reports failures through
//! [`types::RagError`] and never recovers on its own.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mediqa::dataset::QaDataset;
//! use mediqa::embeddings::{HashEmbeddingModel, RigEmbeddingProvider};
//! use mediqa::generation::ExtractiveGenerator;
//! use mediqa::ingest::Ingestor;
//! use mediqa::pipeline::RagPipeline;
//! use mediqa::retrieval::Retriever;
//! use mediqa::store::SqlitePassageStore;
//!
//! # async fn run() -> Result<(), mediqa::types::RagError> {
//! let model = HashEmbeddingModel::default();
//! let store = Arc::new(SqlitePassageStore::open("mediqa.db", &model).await?);
//! let embedder = Arc::new(RigEmbeddingProvider::new(model));
//!
//! let dataset = QaDataset::load("data/medical_qa.jsonl").await?;
//! Ingestor::new(embedder.clone(), store.clone())
//!     .ingest(&dataset)
//!     .await?;
//!
//! let pipeline = RagPipeline::builder()
//!     .with_retriever(Retriever::new(embedder, store, 4))
//!     .with_generator(Arc::new(ExtractiveGenerator::new(1024)))
//!     .build()?;
//!
//! let answer = pipeline
//!     .answer("What are the symptoms of ischemic heart disease?")
//!     .await?;
//! println!("{answer}");
//! # Ok(())
//! # }
//! ```

pub mod chunking;
pub mod dataset;
pub mod embeddings;
pub mod finetune;
pub mod generation;
pub mod ingest;
pub mod pipeline;
pub mod prompt;
pub mod retrieval;
pub mod store;
pub mod types;

pub use types::RagError;
