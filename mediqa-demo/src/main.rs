//! Medical QA demo binary.
//!
//! Subcommands:
//! - `ingest` — build the vector index from the configured dataset
//! - `finetune` — run the one-shot fine-tuning procedure
//! - `ask <question>` — answer one question on the command line
//! - `serve` — start the web demo
//!
//! Configuration comes from `MEDIQA_*` environment variables (a `.env` file
//! is honored); `RUST_LOG` controls tracing verbosity.

mod commands;
mod config;
mod providers;
mod server;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::DemoConfig;

#[derive(Parser)]
#[command(name = "mediqa-demo", about = "Retrieval-augmented medical QA demo")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the vector index from the dataset file.
    Ingest,
    /// Fine-tune the generation model on the dataset.
    Finetune,
    /// Answer a single question.
    Ask {
        /// The question to answer.
        question: String,
    },
    /// Start the web demo.
    Serve,
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,mediqa=debug".into()),
        )
        .init();

    let cli = Cli::parse();
    let result = run(cli).await;

    if let Err(err) = result {
        eprintln!("error: {err}");
        let mut source = std::error::Error::source(&err);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), mediqa::types::RagError> {
    let config = DemoConfig::from_env()?;
    match cli.command {
        Command::Ingest => commands::run_ingest(&config).await,
        Command::Finetune => commands::run_finetune(&config).await,
        Command::Ask { question } => commands::run_ask(&config, &question).await,
        Command::Serve => server::run(&config).await,
    }
}
