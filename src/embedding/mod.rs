//! Embedding generation for semantic search and retrieval.

mod hashing;
mod openai;

pub use hashing::HashingEmbedder;
pub use openai::OpenAIEmbedder;

use crate::config::Settings;
use crate::error::{BusbotError, Result};
use crate::openai::ClientOptions;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Trait for embedding generation.
///
/// Implementations must be deterministic for a given model and input, and
/// [`Embedder::model_id`] must change whenever vectors stop being comparable.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Get the embedding dimensions.
    fn dimensions(&self) -> usize;

    /// Identifier of the model, recorded in the index (e.g. `openai/text-embedding-3-small@1536`).
    fn model_id(&self) -> String;
}

/// Build the embedder selected in the settings.
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let embedding = &settings.embedding;
    match embedding.provider.to_lowercase().as_str() {
        "openai" => {
            let options = ClientOptions::new(settings.embedding_api_key()?)
                .with_api_base(embedding.api_base.clone())
                .with_timeout(Duration::from_secs(settings.generation.timeout_secs));
            Ok(Arc::new(OpenAIEmbedder::with_options(
                &options,
                &embedding.model,
                embedding.dimensions as usize,
            )?))
        }
        "hashing" => Ok(Arc::new(HashingEmbedder::new(embedding.dimensions as usize))),
        other => Err(BusbotError::Config(format!(
            "Unknown embedding provider: {} (expected 'openai' or 'hashing')",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_embedder_by_provider() {
        let mut settings = Settings::default();
        settings.embedding.provider = "hashing".to_string();
        settings.embedding.dimensions = 128;

        let embedder = create_embedder(&settings).unwrap();
        assert_eq!(embedder.dimensions(), 128);
        assert_eq!(embedder.model_id(), "hashing/v1@128");

        settings.embedding.provider = "word2vec".to_string();
        assert!(matches!(create_embedder(&settings), Err(BusbotError::Config(_))));
    }
}
