//! Wires embedding, storage, and generation backends from the configuration.
//!
//! The store is opened once per process; pipeline state built here is shared
//! read-only for the rest of the process lifetime.

use std::sync::Arc;

use rig::client::{CompletionClient, EmbeddingsClient, Nothing, ProviderClient};
use rig::providers::ollama;

use mediqa::embeddings::{EmbeddingProvider, HashEmbeddingModel, RigEmbeddingProvider};
use mediqa::finetune::ModelManifest;
use mediqa::generation::{ExtractiveGenerator, GenerationOptions, Generator, RigGenerator};
use mediqa::pipeline::RagPipeline;
use mediqa::retrieval::Retriever;
use mediqa::store::{PassageStore, SqlitePassageStore};
use mediqa::types::RagError;

use crate::config::{DemoConfig, ProviderKind};

/// Opens the vector store and the matching embedding provider.
pub async fn build_index_parts(
    config: &DemoConfig,
) -> Result<(Arc<dyn EmbeddingProvider>, Arc<dyn PassageStore>), RagError> {
    match config.provider {
        ProviderKind::Hash => {
            let model = HashEmbeddingModel::new(config.embed_dims);
            let store = SqlitePassageStore::open(&config.db_path, &model).await?;
            Ok((
                Arc::new(RigEmbeddingProvider::new(model)),
                Arc::new(store),
            ))
        }
        ProviderKind::Ollama => {
            let client = ollama::Client::from_val(Nothing);
            let model = client.embedding_model_with_ndims(&config.embed_model, config.embed_dims);
            let store = SqlitePassageStore::open(&config.db_path, &model).await?;
            Ok((
                Arc::new(RigEmbeddingProvider::new(model)),
                Arc::new(store),
            ))
        }
    }
}

/// Builds the generator, preferring the fine-tuned model named by the
/// manifest in `model_dir` over the configured default.
pub async fn build_generator(config: &DemoConfig) -> Result<Arc<dyn Generator>, RagError> {
    match config.provider {
        ProviderKind::Hash => {
            // Offline mode answers extractively; max_tokens maps to a rough
            // character budget of four characters per token.
            let max_chars = (config.max_tokens as usize).saturating_mul(4).max(1);
            Ok(Arc::new(ExtractiveGenerator::new(max_chars)))
        }
        ProviderKind::Ollama => {
            let model_name = resolve_model_name(config).await?;
            let options =
                GenerationOptions::new(model_name).with_max_tokens(config.max_tokens);
            let client = ollama::Client::from_val(Nothing);
            let model = client.completion_model(&options.model);
            Ok(Arc::new(
                RigGenerator::new(model, options).with_provider_label("ollama"),
            ))
        }
    }
}

/// Assembles the full pipeline from the configuration.
pub async fn build_pipeline(config: &DemoConfig) -> Result<RagPipeline, RagError> {
    let (embedder, store) = build_index_parts(config).await?;
    let generator = build_generator(config).await?;
    RagPipeline::builder()
        .with_retriever(Retriever::new(embedder, store, config.top_k))
        .with_generator(generator)
        .build()
}

async fn resolve_model_name(config: &DemoConfig) -> Result<String, RagError> {
    match ModelManifest::load_if_present(&config.model_dir).await? {
        Some(manifest) => {
            tracing::info!(
                model = %manifest.model,
                base_model = %manifest.base_model,
                "using fine-tuned model from manifest"
            );
            Ok(manifest.model)
        }
        None => Ok(config.gen_model.clone()),
    }
}
