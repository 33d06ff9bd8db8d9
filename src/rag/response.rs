//! RAG response generation.

use super::context::format_context_for_prompt;
use super::{Answer, Generator, RetrievalResult, Retriever};
use crate::config::Prompts;
use crate::error::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Turns retrieved context into an answer.
pub struct AnswerGenerator {
    generator: Arc<dyn Generator>,
    prompts: Prompts,
}

impl AnswerGenerator {
    pub fn new(generator: Arc<dyn Generator>) -> Self {
        Self {
            generator,
            prompts: Prompts::default(),
        }
    }

    /// Set custom prompts (with user-defined variables).
    pub fn with_prompts(mut self, prompts: Prompts) -> Self {
        self.prompts = prompts;
        self
    }

    /// Answer `question` from `context`.
    ///
    /// With no context the canned "no information" answer is returned and the
    /// model is not called.
    #[instrument(skip(self, context), fields(sources = context.len()))]
    pub async fn generate(&self, question: &str, context: &RetrievalResult) -> Result<Answer> {
        if context.is_empty() {
            debug!("No context retrieved, answering without the model");
            return Ok(Answer {
                text: self.prompts.rag.no_context.clone(),
                sources: Vec::new(),
                grounded: false,
            });
        }

        let mut vars = HashMap::new();
        vars.insert("question".to_string(), question.to_string());
        vars.insert("context".to_string(), format_context_for_prompt(&context.hits));

        let system = self.prompts.render_with_custom(&self.prompts.rag.system, &vars);
        let user = self.prompts.render_with_custom(&self.prompts.rag.user, &vars);

        let text = self.generator.complete(&system, &user).await?;

        debug!(
            "Generated answer with {} sources using {}",
            context.len(),
            self.generator.model()
        );

        Ok(Answer {
            text,
            sources: context.hits.clone(),
            grounded: true,
        })
    }
}

/// RAG engine for question answering.
pub struct RagEngine {
    retriever: Retriever,
    answers: AnswerGenerator,
}

impl RagEngine {
    pub fn new(retriever: Retriever, answers: AnswerGenerator) -> Self {
        Self { retriever, answers }
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Ask a single question with the configured top-k.
    #[instrument(skip(self), fields(question = %question))]
    pub async fn ask(&self, question: &str) -> Result<Answer> {
        self.ask_with(question, self.retriever.top_k(), None).await
    }

    /// Ask with an explicit top-k and an optional provider restriction.
    pub async fn ask_with(
        &self,
        question: &str,
        k: usize,
        provider: Option<&str>,
    ) -> Result<Answer> {
        info!("Processing question: {}", question);
        let context = self
            .retriever
            .retrieve_for_provider(question, k, provider)
            .await?;
        self.answers.generate(question, &context).await
    }
}
