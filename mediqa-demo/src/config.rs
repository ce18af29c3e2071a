//! Environment-driven demo configuration.
//!
//! Every knob is a `MEDIQA_*` environment variable with a documented default,
//! so `mediqa-demo serve` works out of the box against a local Ollama (or
//! fully offline with `MEDIQA_PROVIDER=hash`).

use std::path::PathBuf;
use std::time::Duration;

use mediqa::finetune::FineTuneConfig;
use mediqa::types::RagError;

/// Which embedding/completion backend the demo wires up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderKind {
    /// Local Ollama server for embeddings and generation.
    Ollama,
    /// Deterministic hash embeddings plus extractive answers; no network.
    Hash,
}

impl ProviderKind {
    fn parse(value: &str) -> Result<Self, RagError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "hash" => Ok(Self::Hash),
            other => Err(RagError::Config(format!(
                "unknown provider '{other}' (expected 'ollama' or 'hash')"
            ))),
        }
    }
}

/// Resolved demo configuration.
#[derive(Clone, Debug)]
pub struct DemoConfig {
    /// SQLite database file holding the vector index.
    pub db_path: PathBuf,
    /// Dataset file for `ingest` and `finetune`.
    pub dataset: PathBuf,
    pub provider: ProviderKind,
    pub embed_model: String,
    pub embed_dims: usize,
    /// Generation model used when no fine-tune manifest exists.
    pub gen_model: String,
    /// Directory the fine-tune manifest is written to and read from.
    pub model_dir: PathBuf,
    pub top_k: usize,
    pub max_tokens: u64,
    /// Listen address for `serve`.
    pub addr: String,
    pub finetune_base_url: String,
    pub finetune_api_key: String,
    pub finetune_epochs: u32,
    pub finetune_seed: u64,
}

impl DemoConfig {
    /// Reads the configuration from the process environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Result<Self, RagError> {
        Ok(Self {
            db_path: PathBuf::from(env_or("MEDIQA_DB_PATH", "mediqa.db")),
            dataset: PathBuf::from(env_or("MEDIQA_DATASET", "data/medical_qa.jsonl")),
            provider: ProviderKind::parse(&env_or("MEDIQA_PROVIDER", "ollama"))?,
            embed_model: env_or("MEDIQA_EMBED_MODEL", "nomic-embed-text"),
            embed_dims: parse_env("MEDIQA_EMBED_DIMS", 768)?,
            gen_model: env_or("MEDIQA_GEN_MODEL", "gemma3:270m"),
            model_dir: PathBuf::from(env_or("MEDIQA_MODEL_DIR", "models/mediqa")),
            top_k: parse_env("MEDIQA_TOP_K", 4)?,
            max_tokens: parse_env("MEDIQA_MAX_TOKENS", 256)?,
            addr: env_or("MEDIQA_ADDR", "127.0.0.1:3000"),
            finetune_base_url: env_or("MEDIQA_FINETUNE_BASE_URL", "http://localhost:11434"),
            finetune_api_key: std::env::var("MEDIQA_FINETUNE_API_KEY")
                .or_else(|_| std::env::var("OPENAI_API_KEY"))
                .unwrap_or_default(),
            finetune_epochs: parse_env("MEDIQA_FINETUNE_EPOCHS", 3)?,
            finetune_seed: parse_env("MEDIQA_FINETUNE_SEED", 42)?,
        })
    }

    /// Path of the ingest resume state file, kept next to the index.
    pub fn resume_path(&self) -> PathBuf {
        let mut name = self
            .db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mediqa.db".to_string());
        name.push_str(".resume.json");
        self.db_path.with_file_name(name)
    }

    pub fn finetune_config(&self) -> FineTuneConfig {
        FineTuneConfig::new(
            &self.finetune_base_url,
            &self.finetune_api_key,
            &self.gen_model,
        )
        .with_epochs(self.finetune_epochs)
        .with_seed(self.finetune_seed)
        .with_poll_interval(Duration::from_secs(5))
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, RagError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|err| RagError::Config(format!("invalid {key} '{raw}': {err}"))),
        Err(_) => Ok(default),
    }
}
