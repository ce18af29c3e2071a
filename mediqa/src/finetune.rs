//! One-shot supervised fine-tuning.
//!
//! The procedure is non-interactive and delegates all training to a standard
//! OpenAI-compatible fine-tuning service: format the QA dataset as
//! prompt/completion JSONL, upload the training file, create a job with a
//! fixed epoch count and seed, poll until the job reaches a terminal state,
//! and persist a [`ModelManifest`] describing the fine-tuned model. The
//! generation stage reads the manifest to select the model at query time.
//!
//! There is no checkpointing, no custom loss, and no resumption beyond what
//! the service itself provides.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::instrument;

use crate::dataset::QaDataset;
use crate::types::RagError;

/// File name of the manifest inside the fine-tuned model directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// One supervised training example in the service's JSONL format.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TrainingExample {
    pub prompt: String,
    pub completion: String,
}

/// Formats a QA dataset as prompt/completion JSONL training data.
pub fn format_training_data(dataset: &QaDataset) -> Result<String, RagError> {
    if dataset.is_empty() {
        return Err(RagError::Dataset("dataset contains no records".into()));
    }
    let mut lines = Vec::with_capacity(dataset.len());
    for record in dataset.iter() {
        let example = TrainingExample {
            prompt: record.question.clone(),
            completion: record.answer.clone(),
        };
        lines.push(serde_json::to_string(&example)?);
    }
    Ok(lines.join("\n"))
}

/// Fixed parameters of one fine-tuning run.
#[derive(Clone, Debug)]
pub struct FineTuneConfig {
    /// Base URL of the OpenAI-compatible service, without the `/v1` suffix.
    pub base_url: String,
    pub api_key: String,
    /// Base model to fine-tune from.
    pub base_model: String,
    pub epochs: u32,
    pub seed: u64,
    /// Delay between job status polls.
    pub poll_interval: Duration,
}

impl FineTuneConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        base_model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            base_model: base_model.into(),
            epochs: 3,
            seed: 42,
            poll_interval: Duration::from_secs(5),
        }
    }

    #[must_use]
    pub fn with_epochs(mut self, epochs: u32) -> Self {
        self.epochs = epochs;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Record of a completed fine-tuning run, saved as `manifest.json` in the
/// model directory and consumed by the generation stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Fine-tuned model id as the serving runtime knows it.
    pub model: String,
    pub base_model: String,
    pub job_id: String,
    pub training_file_id: String,
    /// Number of QA records the training file was built from.
    pub training_records: usize,
    pub epochs: u32,
    pub seed: u64,
    pub created_at: DateTime<Utc>,
}

impl ModelManifest {
    /// Writes the manifest into `dir`, creating the directory if needed.
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<(), RagError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(dir.join(MANIFEST_FILE), serialized).await?;
        Ok(())
    }

    /// Loads the manifest from `dir`.
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self, RagError> {
        let data = fs::read_to_string(dir.as_ref().join(MANIFEST_FILE)).await?;
        Ok(serde_json::from_str(&data)?)
    }

    /// Loads the manifest if `dir` holds one.
    pub async fn load_if_present(dir: impl AsRef<Path>) -> Result<Option<Self>, RagError> {
        if !dir.as_ref().join(MANIFEST_FILE).exists() {
            return Ok(None);
        }
        Ok(Some(Self::load(dir).await?))
    }
}

#[derive(Debug, Deserialize)]
struct FileObject {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FineTuningJob {
    id: String,
    status: String,
    #[serde(default)]
    fine_tuned_model: Option<String>,
    #[serde(default)]
    error: Option<JobError>,
}

#[derive(Debug, Deserialize)]
struct JobError {
    #[serde(default)]
    message: Option<String>,
}

/// Client for an OpenAI-compatible fine-tuning service.
#[derive(Clone)]
pub struct FineTuneClient {
    http: reqwest::Client,
    config: FineTuneConfig,
}

impl FineTuneClient {
    pub fn new(config: FineTuneConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &FineTuneConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.config.base_url)
    }

    /// Runs the whole procedure: format, upload, create job, poll, persist.
    ///
    /// Returns the manifest written into `output_dir`.
    #[instrument(skip(self, dataset), fields(records = dataset.len(), base_model = %self.config.base_model))]
    pub async fn run(
        &self,
        dataset: &QaDataset,
        output_dir: impl AsRef<Path> + std::fmt::Debug,
    ) -> Result<ModelManifest, RagError> {
        let training_data = format_training_data(dataset)?;
        let file_id = self.upload_training_file(training_data).await?;
        tracing::info!(%file_id, "training file uploaded");

        let job = self.create_job(&file_id).await?;
        tracing::info!(job_id = %job.id, "fine-tuning job created");

        let job = self.poll_to_completion(&job.id).await?;
        let model = job.fine_tuned_model.ok_or_else(|| {
            RagError::Training(format!(
                "job {} succeeded but reported no fine-tuned model",
                job.id
            ))
        })?;

        let manifest = ModelManifest {
            model,
            base_model: self.config.base_model.clone(),
            job_id: job.id,
            training_file_id: file_id,
            training_records: dataset.len(),
            epochs: self.config.epochs,
            seed: self.config.seed,
            created_at: Utc::now(),
        };
        manifest.save(output_dir).await?;
        tracing::info!(model = %manifest.model, "fine-tuning complete, manifest saved");
        Ok(manifest)
    }

    /// Uploads the JSONL training data (`POST /v1/files`).
    async fn upload_training_file(&self, training_data: String) -> Result<String, RagError> {
        let part = reqwest::multipart::Part::bytes(training_data.into_bytes())
            .file_name("training.jsonl")
            .mime_str("application/jsonl")?;
        let form = reqwest::multipart::Form::new()
            .text("purpose", "fine-tune")
            .part("file", part);

        let response = self
            .http
            .post(self.url("files"))
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .send()
            .await?;
        let file: FileObject = Self::parse(response, "file upload").await?;
        Ok(file.id)
    }

    /// Creates the job (`POST /v1/fine_tuning/jobs`).
    async fn create_job(&self, training_file_id: &str) -> Result<FineTuningJob, RagError> {
        let body = serde_json::json!({
            "model": self.config.base_model,
            "training_file": training_file_id,
            "seed": self.config.seed,
            "hyperparameters": { "n_epochs": self.config.epochs },
        });

        let response = self
            .http
            .post(self.url("fine_tuning/jobs"))
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?;
        Self::parse(response, "job creation").await
    }

    /// Polls `GET /v1/fine_tuning/jobs/{id}` until a terminal state.
    async fn poll_to_completion(&self, job_id: &str) -> Result<FineTuningJob, RagError> {
        loop {
            let response = self
                .http
                .get(self.url(&format!("fine_tuning/jobs/{job_id}")))
                .bearer_auth(&self.config.api_key)
                .send()
                .await?;
            let job: FineTuningJob = Self::parse(response, "job status").await?;

            match job.status.as_str() {
                "succeeded" => return Ok(job),
                "failed" | "cancelled" => {
                    let detail = job
                        .error
                        .and_then(|err| err.message)
                        .unwrap_or_else(|| "no detail reported".to_string());
                    return Err(RagError::Training(format!(
                        "job {} {}: {detail}",
                        job.id, job.status
                    )));
                }
                other => {
                    tracing::debug!(job_id = %job.id, status = %other, "job still running");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        stage: &str,
    ) -> Result<T, RagError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Training(format!(
                "{stage} failed with status {status}: {body}"
            )));
        }
        let body = response.text().await?;
        serde_json::from_str(&body)
            .map_err(|err| RagError::Training(format!("{stage} returned malformed JSON: {err}")))
    }
}
