//! Web demo: one form, one answer.
//!
//! `GET /` serves the question form, `POST /ask` runs the pipeline
//! synchronously and renders the answer with its source passages, and
//! `GET /health` reports liveness. Pipeline state is built once at startup
//! and shared read-only behind `Arc`.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Form, State};
use axum::http::StatusCode;
use axum::response::{Html, Json};
use axum::routing::{get, post};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use mediqa::pipeline::RagPipeline;
use mediqa::types::RagError;

use crate::config::DemoConfig;
use crate::providers;

#[derive(Clone)]
pub struct AppState {
    pipeline: Arc<RagPipeline>,
}

impl AppState {
    pub fn new(pipeline: RagPipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

/// Builds the pipeline from the environment and serves it until the process
/// is stopped.
pub async fn run(config: &DemoConfig) -> Result<(), RagError> {
    let pipeline = providers::build_pipeline(config).await?;
    let app = router(AppState::new(pipeline));

    let listener = TcpListener::bind(&config.addr).await?;
    tracing::info!(addr = %config.addr, "demo server listening");
    axum::serve(listener, app).await?;
    Ok(())
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ask", post(ask))
        .route("/health", get(health))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn index() -> Html<String> {
    Html(page(
        "<p>Ask a medical question; the answer is generated from retrieved passages.</p>",
    ))
}

#[derive(Debug, Deserialize)]
struct AskForm {
    #[serde(default)]
    question: String,
}

async fn ask(
    State(state): State<AppState>,
    Form(form): Form<AskForm>,
) -> (StatusCode, Html<String>) {
    match state.pipeline.answer_detailed(&form.question).await {
        Ok(outcome) => {
            let mut body = String::new();
            body.push_str(&format!(
                "<h2>Answer</h2><p>{}</p>",
                escape(&outcome.answer)
            ));
            body.push_str("<h3>Sources</h3><ol>");
            for hit in &outcome.passages {
                body.push_str(&format!(
                    "<li><em>score {:.3}</em> — {}</li>",
                    hit.score,
                    escape(&hit.passage.content)
                ));
            }
            body.push_str("</ol>");
            body.push_str(&format!(
                "<p class=\"timing\">retrieval {} ms, generation {} ms</p>",
                outcome.timings.retrieval_ms, outcome.timings.generation_ms
            ));
            (StatusCode::OK, Html(page(&body)))
        }
        Err(err) => {
            tracing::error!(error = %err, "pipeline request failed");
            let body = format!("<p class=\"error\">Error: {}</p>", escape(&err.to_string()));
            (StatusCode::INTERNAL_SERVER_ERROR, Html(page(&body)))
        }
    }
}

fn page(body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>MedIQA</title>\n\
         <style>body{{font-family:sans-serif;max-width:48rem;margin:2rem auto;}}\
         .error{{color:#b00020;}}.timing{{color:#666;font-size:0.85rem;}}</style>\n\
         </head>\n<body>\n<h1>Medical question answering</h1>\n\
         <form method=\"post\" action=\"/ask\">\n\
         <input type=\"text\" name=\"question\" size=\"60\" \
         placeholder=\"What are the symptoms of ischemic heart disease?\">\n\
         <button type=\"submit\">Ask</button>\n</form>\n{body}\n</body>\n</html>"
    )
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
