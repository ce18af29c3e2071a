//! Text generation stage.
//!
//! [`Generator`] is the seam the pipeline calls with one finished prompt.
//! [`RigGenerator`] drives any rig completion model (Ollama by default) with
//! the configured preamble, temperature, and maximum output length.
//! [`ExtractiveGenerator`] is the network-free fallback used by offline demo
//! runs: it answers with the top retrieved passage instead of generating.

use async_trait::async_trait;
use rig::completion::CompletionModel;
use rig::message::AssistantContent;
use tracing::instrument;

use crate::types::RagError;

/// Per-model generation parameters.
#[derive(Clone, Debug)]
pub struct GenerationOptions {
    /// Model name as the serving runtime knows it.
    pub model: String,
    /// Hard cap on generated output length, forwarded to the model call.
    pub max_tokens: u64,
    pub temperature: f64,
    /// System preamble prepended by the provider.
    pub preamble: String,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            model: "gemma3:270m".to_string(),
            max_tokens: 256,
            temperature: 0.2,
            preamble: "You are a medical question-answering assistant. Answer strictly from \
                       the provided context."
                .to_string(),
        }
    }
}

impl GenerationOptions {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u64) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_preamble(mut self, preamble: impl Into<String>) -> Self {
        self.preamble = preamble.into();
        self
    }
}

/// Produces one response string for one prompt.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, RagError>;
}

/// Generator backed by a rig completion model.
#[derive(Clone)]
pub struct RigGenerator<M>
where
    M: CompletionModel,
{
    model: M,
    options: GenerationOptions,
    provider: &'static str,
}

impl<M> RigGenerator<M>
where
    M: CompletionModel,
{
    pub fn new(model: M, options: GenerationOptions) -> Self {
        Self {
            model,
            options,
            provider: "rig",
        }
    }

    /// Names the provider in error messages (`ollama`, `openai`, ...).
    #[must_use]
    pub fn with_provider_label(mut self, provider: &'static str) -> Self {
        self.provider = provider;
        self
    }

    pub fn options(&self) -> &GenerationOptions {
        &self.options
    }

    /// Builds the provider request for one prompt, carrying the configured
    /// preamble, temperature, and max-tokens cap.
    fn request(&self, prompt: &str) -> rig::completion::CompletionRequest {
        self.model
            .completion_request(rig::completion::Message::user(prompt.to_string()))
            .preamble(self.options.preamble.clone())
            .temperature(self.options.temperature)
            .max_tokens(self.options.max_tokens)
            .build()
    }
}

#[async_trait]
impl<M> Generator for RigGenerator<M>
where
    M: CompletionModel + Send + Sync,
{
    #[instrument(skip(self, prompt), fields(model = %self.options.model, prompt_chars = prompt.len()))]
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let request = self.request(prompt);

        let response = self
            .model
            .completion(request)
            .await
            .map_err(|err| RagError::Generation {
                provider: self.provider,
                message: err.to_string(),
            })?;

        let text = response
            .choice
            .into_iter()
            .filter_map(|content| match content {
                AssistantContent::Text(text) => Some(text.text),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n");

        if text.trim().is_empty() {
            return Err(RagError::Generation {
                provider: self.provider,
                message: "model returned no text content".into(),
            });
        }
        Ok(text)
    }
}

/// Offline fallback: answers with the first context passage of the prompt,
/// truncated to `max_chars`.
///
/// Understands prompts shaped like [`crate::prompt::MEDICAL_QA_TEMPLATE`]
/// (a `Context:` section followed by a `Question:` line); anything else is
/// returned truncated as-is.
#[derive(Clone, Debug)]
pub struct ExtractiveGenerator {
    max_chars: usize,
}

impl ExtractiveGenerator {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    fn first_context_block(prompt: &str) -> Option<&str> {
        let after = prompt.split_once("Context:")?.1;
        let context = match after.split_once("\nQuestion:") {
            Some((context, _)) => context,
            None => after,
        };
        context
            .split("\n\n")
            .map(str::trim)
            .find(|block| !block.is_empty())
    }

    fn truncate(text: &str, max_chars: usize) -> &str {
        match text.char_indices().nth(max_chars) {
            Some((byte_idx, _)) => &text[..byte_idx],
            None => text,
        }
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, RagError> {
        let answer = Self::first_context_block(prompt).unwrap_or(prompt).trim();
        Ok(Self::truncate(answer, self.max_chars).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig::client::{CompletionClient, Nothing, ProviderClient};
    use rig::providers::ollama;

    use crate::prompt::PromptTemplate;

    #[test]
    fn rig_requests_carry_the_configured_cap() {
        // Building the request never contacts the server; the model handle
        // only needs to exist.
        let model = ollama::Client::from_val(Nothing).completion_model("medqa-test");
        let options = GenerationOptions::new("medqa-test")
            .with_max_tokens(64)
            .with_temperature(0.3)
            .with_preamble("answer from context only");
        let generator = RigGenerator::new(model, options);

        let request = generator.request("What is angina?");
        assert_eq!(request.max_tokens, Some(64));
        assert_eq!(request.temperature, Some(0.3));
        assert_eq!(request.preamble.as_deref(), Some("answer from context only"));
    }

    #[test]
    fn default_cap_is_forwarded_too() {
        let model = ollama::Client::from_val(Nothing).completion_model("medqa-test");
        let generator = RigGenerator::new(model, GenerationOptions::default());

        let request = generator.request("prompt");
        assert_eq!(
            request.max_tokens,
            Some(GenerationOptions::default().max_tokens)
        );
    }

    #[test]
    fn options_builders_apply() {
        let options = GenerationOptions::new("medqa-mini")
            .with_max_tokens(64)
            .with_temperature(0.7)
            .with_preamble("short answers");
        assert_eq!(options.model, "medqa-mini");
        assert_eq!(options.max_tokens, 64);
        assert_eq!(options.temperature, 0.7);
        assert_eq!(options.preamble, "short answers");
    }

    #[tokio::test]
    async fn extractive_generator_returns_top_passage() {
        let prompt = PromptTemplate::medical_qa()
            .render(
                &[
                    "Ischemic heart disease can present as systolic heart failure.".to_string(),
                    "A second, less relevant passage.".to_string(),
                ],
                "What are the symptoms of ischemic heart disease?",
            )
            .unwrap();

        let generator = ExtractiveGenerator::new(500);
        let answer = generator.generate(&prompt).await.unwrap();
        assert_eq!(
            answer,
            "Ischemic heart disease can present as systolic heart failure."
        );
    }

    #[tokio::test]
    async fn extractive_generator_respects_max_chars() {
        let generator = ExtractiveGenerator::new(10);
        let answer = generator
            .generate("Context:\nabcdefghijklmnop\nQuestion: q")
            .await
            .unwrap();
        assert_eq!(answer, "abcdefghij");
        assert_eq!(answer.chars().count(), 10);
    }

    #[tokio::test]
    async fn extractive_generator_falls_back_to_whole_prompt() {
        let generator = ExtractiveGenerator::new(1000);
        let answer = generator.generate("free-form prompt").await.unwrap();
        assert_eq!(answer, "free-form prompt");
    }

    #[test]
    fn truncation_is_char_safe() {
        let truncated = ExtractiveGenerator::truncate("héllo", 2);
        assert_eq!(truncated, "hé");
    }
}
