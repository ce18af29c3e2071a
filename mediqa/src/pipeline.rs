//! The retrieval-augmented generation pipeline.
//!
//! One straight line: retrieve context passages, fill the prompt template,
//! generate, return the generated string verbatim. No retries, no output
//! validation; the first failing stage propagates.

use std::sync::Arc;
use std::time::Instant;

use tracing::instrument;

use crate::generation::Generator;
use crate::prompt::PromptTemplate;
use crate::retrieval::{RetrievedPassage, Retriever};
use crate::types::RagError;

/// Wall-clock stage durations for one invocation.
#[derive(Clone, Copy, Debug, Default)]
pub struct StageTimings {
    pub retrieval_ms: u64,
    pub generation_ms: u64,
}

/// Everything one pipeline invocation produced.
#[derive(Clone, Debug)]
pub struct AnswerOutcome {
    /// Generated answer, exactly as the model returned it.
    pub answer: String,
    /// Context passages that fed the prompt, best first.
    pub passages: Vec<RetrievedPassage>,
    pub timings: StageTimings,
}

/// Question in, answer out.
#[derive(Clone)]
pub struct RagPipeline {
    retriever: Retriever,
    template: PromptTemplate,
    generator: Arc<dyn Generator>,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline").finish_non_exhaustive()
    }
}

impl RagPipeline {
    pub fn new(
        retriever: Retriever,
        template: PromptTemplate,
        generator: Arc<dyn Generator>,
    ) -> Self {
        Self {
            retriever,
            template,
            generator,
        }
    }

    pub fn builder() -> RagPipelineBuilder {
        RagPipelineBuilder::default()
    }

    /// Answers a question, returning the generated string.
    pub async fn answer(&self, question: &str) -> Result<String, RagError> {
        Ok(self.answer_detailed(question).await?.answer)
    }

    /// Answers a question, returning the answer together with the passages
    /// used and stage timings.
    #[instrument(skip(self), fields(question_chars = question.len()))]
    pub async fn answer_detailed(&self, question: &str) -> Result<AnswerOutcome, RagError> {
        let retrieval_started = Instant::now();
        let passages = self.retriever.retrieve(question).await?;
        let retrieval_ms = retrieval_started.elapsed().as_millis() as u64;

        let context: Vec<String> = passages
            .iter()
            .map(|hit| hit.passage.content.clone())
            .collect();
        let prompt = self.template.render(&context, question)?;

        let generation_started = Instant::now();
        let answer = self.generator.generate(&prompt).await?;
        let generation_ms = generation_started.elapsed().as_millis() as u64;

        tracing::info!(
            passages = passages.len(),
            retrieval_ms,
            generation_ms,
            "answered question"
        );

        Ok(AnswerOutcome {
            answer,
            passages,
            timings: StageTimings {
                retrieval_ms,
                generation_ms,
            },
        })
    }
}

/// Assembles a [`RagPipeline`]. The template defaults to the built-in
/// medical QA template; retriever and generator are required.
#[derive(Default)]
pub struct RagPipelineBuilder {
    retriever: Option<Retriever>,
    template: Option<PromptTemplate>,
    generator: Option<Arc<dyn Generator>>,
}

impl RagPipelineBuilder {
    #[must_use]
    pub fn with_retriever(mut self, retriever: Retriever) -> Self {
        self.retriever = Some(retriever);
        self
    }

    #[must_use]
    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    #[must_use]
    pub fn with_generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn build(self) -> Result<RagPipeline, RagError> {
        let retriever = self
            .retriever
            .ok_or(RagError::MissingInput { what: "retriever" })?;
        let generator = self
            .generator
            .ok_or(RagError::MissingInput { what: "generator" })?;
        Ok(RagPipeline {
            retriever,
            template: self.template.unwrap_or_default(),
            generator,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    use crate::embeddings::{EmbeddingProvider, HashEmbeddingModel, RigEmbeddingProvider};
    use crate::store::{PassageRecord, PassageStore};

    struct FixedStore {
        hits: Vec<(PassageRecord, f32)>,
    }

    #[async_trait]
    impl PassageStore for FixedStore {
        async fn insert_passages(&self, _passages: Vec<PassageRecord>) -> Result<(), RagError> {
            Ok(())
        }
        async fn get_passages_by_source(
            &self,
            _source: &str,
        ) -> Result<Vec<PassageRecord>, RagError> {
            Ok(Vec::new())
        }
        async fn get_passage_by_id(&self, _id: &str) -> Result<Option<PassageRecord>, RagError> {
            Ok(None)
        }
        async fn delete_passages_by_source(&self, _source: &str) -> Result<usize, RagError> {
            Ok(0)
        }
        async fn search_similar(
            &self,
            _query_embedding: &[f32],
            top_k: usize,
        ) -> Result<Vec<(PassageRecord, f32)>, RagError> {
            Ok(self.hits.iter().take(top_k).cloned().collect())
        }
        async fn count(&self) -> Result<usize, RagError> {
            Ok(self.hits.len())
        }
    }

    /// Records prompts and replies with a canned answer.
    struct ScriptedGenerator {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn new(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Generator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> Result<String, RagError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok(self.reply.clone())
        }
    }

    fn embedder() -> Arc<dyn EmbeddingProvider> {
        Arc::new(RigEmbeddingProvider::new(HashEmbeddingModel::new(64)))
    }

    fn passage(id: &str, content: &str, score: f32) -> (PassageRecord, f32) {
        (PassageRecord::new(id, "some question", 0, content), score)
    }

    #[tokio::test]
    async fn answer_returns_generator_output_verbatim() {
        let store = Arc::new(FixedStore {
            hits: vec![passage("p1", "Angina is chest pain from reduced blood flow.", 0.9)],
        });
        let generator = Arc::new(ScriptedGenerator::new("  Canned answer with whitespace. "));
        let pipeline = RagPipeline::builder()
            .with_retriever(Retriever::new(embedder(), store, 3))
            .with_generator(generator.clone())
            .build()
            .unwrap();

        let answer = pipeline.answer("What is angina?").await.unwrap();
        assert_eq!(answer, "  Canned answer with whitespace. ");

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Angina is chest pain from reduced blood flow."));
        assert!(prompts[0].contains("What is angina?"));
    }

    #[tokio::test]
    async fn outcome_carries_passages_and_timings() {
        let store = Arc::new(FixedStore {
            hits: vec![
                passage("p1", "first passage", 0.9),
                passage("p2", "second passage", 0.5),
            ],
        });
        let pipeline = RagPipeline::builder()
            .with_retriever(Retriever::new(embedder(), store, 2))
            .with_generator(Arc::new(ScriptedGenerator::new("done")))
            .build()
            .unwrap();

        let outcome = pipeline.answer_detailed("question?").await.unwrap();
        assert_eq!(outcome.answer, "done");
        assert_eq!(outcome.passages.len(), 2);
        assert_eq!(outcome.passages[0].passage.id, "p1");
    }

    #[tokio::test]
    async fn empty_index_propagates_unchanged() {
        let pipeline = RagPipeline::builder()
            .with_retriever(Retriever::new(
                embedder(),
                Arc::new(FixedStore { hits: vec![] }),
                3,
            ))
            .with_generator(Arc::new(ScriptedGenerator::new("unused")))
            .build()
            .unwrap();

        let err = pipeline.answer("anything").await.unwrap_err();
        assert!(matches!(err, RagError::EmptyIndex));
    }

    #[tokio::test]
    async fn builder_requires_retriever_and_generator() {
        let err = RagPipeline::builder().build().unwrap_err();
        assert!(matches!(err, RagError::MissingInput { what: "retriever" }));

        let err = RagPipeline::builder()
            .with_retriever(Retriever::new(
                embedder(),
                Arc::new(FixedStore { hits: vec![] }),
                1,
            ))
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::MissingInput { what: "generator" }));
    }
}
