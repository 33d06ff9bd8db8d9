//! Context retrieval for RAG responses.

use super::{RetrievalResult, ScoredSegment};
use crate::documents::provider_key;
use crate::embedding::Embedder;
use crate::error::{BusbotError, Result};
use crate::vector_store::{QueryFilter, VectorStore};
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, instrument};

/// Retrieves the segments most similar to a question.
pub struct Retriever {
    vector_store: Arc<dyn VectorStore>,
    embedder: Arc<dyn Embedder>,
    top_k: usize,
    min_score: Option<f32>,
    filter_by_provider: bool,
}

impl Retriever {
    /// Create a new retriever.
    pub fn new(vector_store: Arc<dyn VectorStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            vector_store,
            embedder,
            top_k: 10,
            min_score: None,
            filter_by_provider: true,
        }
    }

    /// Set the default number of segments returned.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Set the minimum similarity score threshold.
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// Restrict retrieval to a provider named in the question.
    pub fn with_provider_filter(mut self, enabled: bool) -> Self {
        self.filter_by_provider = enabled;
        self
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Retrieve with the configured top-k.
    pub async fn retrieve_default(&self, question: &str) -> Result<RetrievalResult> {
        self.retrieve(question, self.top_k).await
    }

    /// Retrieve at most `k` segments for `question`.
    pub async fn retrieve(&self, question: &str, k: usize) -> Result<RetrievalResult> {
        self.retrieve_for_provider(question, k, None).await
    }

    /// Retrieve at most `k` segments, restricted to `provider` when given.
    ///
    /// Without an explicit provider one is detected from the question, if provider
    /// filtering is enabled.
    #[instrument(skip(self), fields(k = k))]
    pub async fn retrieve_for_provider(
        &self,
        question: &str,
        k: usize,
        provider: Option<&str>,
    ) -> Result<RetrievalResult> {
        if k == 0 {
            return Err(BusbotError::InvalidInput(
                "number of segments to retrieve must be positive".to_string(),
            ));
        }

        let model_id = self.embedder.model_id();
        if let Some(indexed) = self.vector_store.indexed_model().await? {
            if indexed.model_id != model_id {
                return Err(BusbotError::ModelMismatch {
                    indexed: indexed.model_id,
                    configured: model_id,
                });
            }
        }

        if self.vector_store.entry_count().await? == 0 {
            debug!("Index is empty, nothing to retrieve");
            return Ok(RetrievalResult::default());
        }

        let provider = match provider {
            Some(p) => Some(provider_key(p)),
            None if self.filter_by_provider => {
                let known = self.vector_store.provider_names().await?;
                detect_provider(question, &known)
            }
            None => None,
        };

        let query_embedding = self.embedder.embed(question).await?;

        let filter = QueryFilter::default()
            .with_min_score(self.min_score)
            .with_provider(provider.clone());
        let hits = self.vector_store.query(&query_embedding, k, &filter).await?;

        debug!(
            "Retrieved {} segments (provider filter: {:?})",
            hits.len(),
            provider
        );

        Ok(RetrievalResult {
            hits: hits.into_iter().map(ScoredSegment::from).collect(),
            provider,
        })
    }
}

fn word_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[\p{L}\p{N}]+").expect("static regex is valid"))
}

/// Find a known provider mentioned in `question`.
///
/// `providers` are provider keys. A provider is mentioned when a run of whole
/// words in the question joins up to its key, so "Green Line" and "greenline"
/// both name `greenline` while "ena" never matches inside "scenario". The longest
/// key wins.
pub fn detect_provider(question: &str, providers: &[String]) -> Option<String> {
    let question = question.to_lowercase();
    let words: Vec<&str> = word_pattern().find_iter(&question).map(|m| m.as_str()).collect();

    providers
        .iter()
        .filter(|key| !key.is_empty())
        .filter(|key| mentions(&words, key))
        .max_by_key(|key| key.len())
        .cloned()
}

fn mentions(words: &[&str], key: &str) -> bool {
    (0..words.len()).any(|start| {
        let mut joined = String::new();
        for word in &words[start..] {
            joined.push_str(word);
            if joined == key {
                return true;
            }
            if !key.starts_with(joined.as_str()) {
                return false;
            }
        }
        false
    })
}

/// Format retrieved segments for inclusion in a prompt.
pub fn format_context_for_prompt(hits: &[ScoredSegment]) -> String {
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            format!(
                "---\n[{}] {}\n{}\n---",
                i + 1,
                hit.segment.label(),
                hit.segment.text.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Format retrieved segments for display to the user.
pub fn format_context_for_display(hits: &[ScoredSegment]) -> String {
    hits.iter()
        .map(|hit| {
            format!(
                "{} (score: {:.2})\n  {}",
                hit.segment.label(),
                hit.score,
                hit.segment.text.trim().replace('\n', "\n  ")
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}
