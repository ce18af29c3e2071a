//! One-shot CLI commands: ingest, finetune, ask.

use mediqa::dataset::QaDataset;
use mediqa::finetune::FineTuneClient;
use mediqa::ingest::{Ingestor, ResumeTracker};
use mediqa::types::RagError;

use crate::config::DemoConfig;
use crate::providers;

/// Builds (or extends) the vector index from the configured dataset.
pub async fn run_ingest(config: &DemoConfig) -> Result<(), RagError> {
    let dataset = QaDataset::load(&config.dataset).await?;
    tracing::info!(records = dataset.len(), path = %config.dataset.display(), "dataset loaded");

    let (embedder, store) = providers::build_index_parts(config).await?;
    let tracker = ResumeTracker::new(config.resume_path());
    tracker.load().await?;

    let report = Ingestor::new(embedder, store)
        .with_resume(tracker)
        .ingest(&dataset)
        .await?;

    println!(
        "ingested {} records ({} chunks, {} skipped) in {:.1?}",
        report.records_ingested, report.chunks_written, report.records_skipped, report.duration
    );
    Ok(())
}

/// Runs the fine-tuning procedure and prints the resulting model id.
pub async fn run_finetune(config: &DemoConfig) -> Result<(), RagError> {
    let dataset = QaDataset::load(&config.dataset).await?;
    let client = FineTuneClient::new(config.finetune_config());
    let manifest = client.run(&dataset, &config.model_dir).await?;

    println!(
        "fine-tuned model: {} (job {}, {} records, {} epochs)",
        manifest.model, manifest.job_id, manifest.training_records, manifest.epochs
    );
    println!("manifest written to {}", config.model_dir.display());
    Ok(())
}

/// Answers one question on the command line.
pub async fn run_ask(config: &DemoConfig, question: &str) -> Result<(), RagError> {
    let pipeline = providers::build_pipeline(config).await?;
    let outcome = pipeline.answer_detailed(question).await?;

    println!("{}", outcome.answer.trim());
    println!();
    println!("sources:");
    for hit in &outcome.passages {
        let preview: String = hit.passage.content.chars().take(96).collect();
        println!("  [{:.3}] {preview}", hit.score);
    }
    println!(
        "(retrieval {} ms, generation {} ms)",
        outcome.timings.retrieval_ms, outcome.timings.generation_ms
    );
    Ok(())
}
