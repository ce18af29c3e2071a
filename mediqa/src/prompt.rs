//! Prompt assembly: a fixed textual template combining retrieved context and
//! the user question into one model input.
//!
//! Templates carry `{context}` and `{question}` placeholders. Both must be
//! present; unknown placeholders are rejected at construction so a typo
//! cannot silently survive into generation.

use std::sync::OnceLock;

use regex::Regex;

use crate::types::RagError;

/// Default template for medical question answering.
pub const MEDICAL_QA_TEMPLATE: &str = "\
Answer the medical question using only the context below. \
If the context does not contain the answer, say so.

Context:
{context}

Question: {question}

Answer:";

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"))
}

/// A validated prompt template.
#[derive(Clone, Debug)]
pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    /// Validates and wraps a template string.
    pub fn new(template: impl Into<String>) -> Result<Self, RagError> {
        let template = template.into();
        let mut has_context = false;
        let mut has_question = false;
        for caps in placeholder_pattern().captures_iter(&template) {
            match &caps[1] {
                "context" => has_context = true,
                "question" => has_question = true,
                other => {
                    return Err(RagError::Template(format!(
                        "unknown placeholder '{{{other}}}'"
                    )));
                }
            }
        }
        if !has_context {
            return Err(RagError::Template("template is missing {context}".into()));
        }
        if !has_question {
            return Err(RagError::Template("template is missing {question}".into()));
        }
        Ok(Self { template })
    }

    /// The built-in medical QA template.
    pub fn medical_qa() -> Self {
        Self {
            template: MEDICAL_QA_TEMPLATE.to_string(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Fills the template with context passages and the question.
    ///
    /// Substitution is a single pass over the template, so text inside
    /// passages is never re-interpreted as a placeholder.
    pub fn render(&self, context: &[String], question: &str) -> Result<String, RagError> {
        if question.trim().is_empty() {
            return Err(RagError::MissingInput { what: "question" });
        }
        if context.iter().all(|block| block.trim().is_empty()) {
            return Err(RagError::MissingInput { what: "context" });
        }

        let joined = context
            .iter()
            .filter(|block| !block.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");

        let rendered = placeholder_pattern().replace_all(&self.template, |caps: &regex::Captures| {
            match &caps[1] {
                "context" => joined.clone(),
                "question" => question.to_string(),
                _ => caps[0].to_string(),
            }
        });
        Ok(rendered.into_owned())
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::medical_qa()
    }
}
