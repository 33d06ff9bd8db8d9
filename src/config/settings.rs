//! Configuration settings for busbot.

use crate::error::{BusbotError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub documents: DocumentSettings,
    pub embedding: EmbeddingSettings,
    pub chunking: ChunkingSettings,
    pub vector_store: VectorStoreSettings,
    pub retrieval: RetrievalSettings,
    pub generation: GenerationSettings,
    pub booking: BookingSettings,
    pub prompts: PromptSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.busbot".to_string(),
            log_level: "warn".to_string(),
        }
    }
}

/// Location of the document store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    /// Structured catalog of districts, dropping points and providers (JSON).
    pub catalog_path: String,
    /// Directory with one plain-text profile per provider.
    pub profiles_dir: String,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self {
            catalog_path: "data.json".to_string(),
            profiles_dir: "attachment".to_string(),
        }
    }
}

/// Embedding generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Embedding provider (openai, hashing).
    pub provider: String,
    /// Embedding model to use.
    pub model: String,
    /// Embedding dimensions.
    pub dimensions: u32,
    /// Base URL of an OpenAI-compatible embeddings endpoint.
    pub api_base: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "text-embedding-3-small".to_string(),
            dimensions: 1536,
            api_base: None,
            api_key_env: "OPENAI_API_KEY".to_string(),
        }
    }
}

impl EmbeddingSettings {
    /// Whether the provider calls a hosted API and therefore needs a credential.
    pub fn is_hosted(&self) -> bool {
        !self.provider.eq_ignore_ascii_case("hashing")
    }
}

/// Text chunking settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum segment length in characters.
    pub chunk_size: usize,
    /// Characters shared between consecutive segments of a document.
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 150,
        }
    }
}

/// Vector store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreSettings {
    /// Path to the SQLite index.
    pub sqlite_path: String,
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.busbot/index.db".to_string(),
        }
    }
}

/// Retrieval settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    /// Number of segments to retrieve per question.
    pub top_k: usize,
    /// Optional minimum cosine similarity for a segment to count as relevant.
    pub min_score: Option<f32>,
    /// Restrict retrieval to a provider named in the question.
    pub filter_by_provider: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: None,
            filter_by_provider: true,
        }
    }
}

/// Hosted answer generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    /// Chat model used to write answers.
    pub model: String,
    /// Base URL of an OpenAI-compatible chat completions endpoint.
    pub api_base: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: "gemini-2.5-flash".to_string(),
            api_base: Some("https://generativelanguage.googleapis.com/v1beta/openai/".to_string()),
            api_key_env: "GOOGLE_API_KEY".to_string(),
            temperature: 0.3,
            timeout_secs: crate::openai::DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Booking database settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BookingSettings {
    /// Path to the SQLite booking database.
    pub sqlite_path: String,
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            sqlite_path: "~/.busbot/bookings.db".to_string(),
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PromptSettings {
    /// Directory for custom prompts (overrides defaults).
    pub custom_dir: Option<String>,
    /// Custom variables available in all prompts as {{variable_name}}.
    pub variables: std::collections::HashMap<String, String>,
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    pub fn load_from(path: Option<&PathBuf>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            let settings: Settings = toml::from_str(&content)?;
            Ok(settings)
        } else if path.is_some() {
            Err(BusbotError::Config(format!(
                "Configuration file not found: {}",
                config_path.display()
            )))
        } else {
            Ok(Settings::default())
        }
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| BusbotError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("busbot")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    pub fn catalog_path(&self) -> PathBuf {
        Self::expand_path(&self.documents.catalog_path)
    }

    pub fn profiles_dir(&self) -> PathBuf {
        Self::expand_path(&self.documents.profiles_dir)
    }

    /// Get the expanded SQLite index path.
    pub fn sqlite_path(&self) -> PathBuf {
        Self::expand_path(&self.vector_store.sqlite_path)
    }

    /// Get the expanded booking database path.
    pub fn booking_path(&self) -> PathBuf {
        Self::expand_path(&self.booking.sqlite_path)
    }

    /// API key for the embedding provider, read from its configured environment variable.
    pub fn embedding_api_key(&self) -> Result<String> {
        read_api_key(&self.embedding.api_key_env)
    }

    /// API key for the generation service, read from its configured environment variable.
    pub fn generation_api_key(&self) -> Result<String> {
        read_api_key(&self.generation.api_key_env)
    }

    /// Check everything that would otherwise fail on the first query.
    pub fn validate(&self) -> Result<()> {
        let chunking = &self.chunking;
        if chunking.chunk_size == 0 {
            return Err(BusbotError::Config("chunking.chunk_size must be positive".to_string()));
        }
        if chunking.chunk_overlap == 0 || chunking.chunk_overlap >= chunking.chunk_size {
            return Err(BusbotError::Config(format!(
                "chunking.chunk_overlap must be in 1..{} (got {})",
                chunking.chunk_size, chunking.chunk_overlap
            )));
        }

        if self.retrieval.top_k == 0 {
            return Err(BusbotError::Config("retrieval.top_k must be positive".to_string()));
        }
        if let Some(min) = self.retrieval.min_score {
            if !(-1.0..=1.0).contains(&min) {
                return Err(BusbotError::Config(format!(
                    "retrieval.min_score must be within [-1, 1] (got {})",
                    min
                )));
            }
        }

        if self.embedding.model.trim().is_empty() {
            return Err(BusbotError::Config("embedding.model must be set".to_string()));
        }
        if self.embedding.dimensions == 0 {
            return Err(BusbotError::Config("embedding.dimensions must be positive".to_string()));
        }
        if self.embedding.is_hosted() {
            self.embedding_api_key()?;
        }

        if self.generation.model.trim().is_empty() {
            return Err(BusbotError::Config("generation.model must be set".to_string()));
        }
        self.generation_api_key()?;

        Ok(())
    }
}

fn read_api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        Ok(_) => Err(BusbotError::Config(format!(
            "{} is empty. Set it with: export {}='...'",
            var, var
        ))),
        Err(_) => Err(BusbotError::Config(format!(
            "{} not set. Set it with: export {}='...'",
            var, var
        ))),
    }
}
