//! Error types for busbot.

use std::path::PathBuf;
use thiserror::Error;

/// Library-level error type for busbot operations.
#[derive(Error, Debug)]
pub enum BusbotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to read source document {path:?}: {reason}")]
    DocumentRead { path: PathBuf, reason: String },

    #[error("Embedding generation failed: {0}")]
    Embedding(String),

    #[error("Vector store error: {0}")]
    VectorStore(String),

    /// The index was built with a different embedding model than the one configured.
    #[error(
        "Embedding model mismatch: index was built with '{indexed}' but '{configured}' is configured. \
         Run 'busbot reindex' to rebuild the index with the configured model."
    )]
    ModelMismatch { indexed: String, configured: String },

    /// The hosted generation service failed or could not be reached.
    #[error("Answer generation unavailable: {0}")]
    GenerationUnavailable(String),

    #[error("RAG error: {0}")]
    Rag(String),

    #[error("Booking error: {0}")]
    Booking(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
}

impl BusbotError {
    /// Whether the caller should suggest retrying later rather than reporting missing information.
    pub fn is_generation_unavailable(&self) -> bool {
        matches!(self, BusbotError::GenerationUnavailable(_))
    }

    /// Whether this error stems from configuration (including an embedding model mismatch).
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            BusbotError::Config(_) | BusbotError::ModelMismatch { .. }
        )
    }
}

/// Result type alias for busbot operations.
pub type Result<T> = std::result::Result<T, BusbotError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let err = BusbotError::GenerationUnavailable("connection refused".to_string());
        assert!(err.is_generation_unavailable());
        assert!(!err.is_config());

        let err = BusbotError::ModelMismatch {
            indexed: "hashing/v1@384".to_string(),
            configured: "openai/text-embedding-3-small@1536".to_string(),
        };
        assert!(err.is_config());
        assert!(err.to_string().contains("hashing/v1@384"));
    }
}
