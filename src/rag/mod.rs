//! RAG (Retrieval-Augmented Generation) for question answering with sources.
//!
//! The [`Retriever`] turns a question into the most similar indexed segments,
//! the [`AnswerGenerator`] conditions a hosted chat model on them, and
//! [`RagEngine`] wires the two together.

pub mod context;
mod generator;
mod response;

pub use context::{detect_provider, format_context_for_display, format_context_for_prompt, Retriever};
pub use generator::{Generator, OpenAIGenerator};
pub use response::{AnswerGenerator, RagEngine};

use crate::chunking::Segment;
use crate::vector_store::SearchHit;
use serde::Serialize;

/// A retrieved segment with its similarity to the question.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredSegment {
    pub segment: Segment,
    /// Cosine similarity (higher is better).
    pub score: f32,
}

impl From<SearchHit> for ScoredSegment {
    fn from(hit: SearchHit) -> Self {
        Self {
            segment: hit.entry.segment,
            score: hit.score,
        }
    }
}

/// Segments retrieved for one question, best first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredSegment>,
    /// Provider the retrieval was restricted to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

/// A generated answer with the segments it was conditioned on.
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    pub sources: Vec<ScoredSegment>,
    /// False when nothing was retrieved and the canned "no information" answer was returned.
    pub grounded: bool,
}

impl Answer {
    /// Format the answer for display.
    pub fn format_for_display(&self) -> String {
        let mut output = self.text.clone();

        if !self.sources.is_empty() {
            output.push_str("\n\n--- Sources ---\n");
            for source in &self.sources {
                output.push_str(&format!(
                    "\n{} (score: {:.2})",
                    source.segment.label(),
                    source.score
                ));
            }
        }

        output
    }
}
