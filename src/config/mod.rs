//! Configuration module for busbot.
//!
//! Handles loading and managing application settings and prompt templates.

mod prompts;
mod settings;

pub use prompts::{Prompts, RagPrompts};
pub use settings::{
    BookingSettings, ChunkingSettings, DocumentSettings, EmbeddingSettings, GeneralSettings,
    GenerationSettings, PromptSettings, RetrievalSettings, Settings, VectorStoreSettings,
};
