//! Hosted chat-completion backend.

use crate::config::Settings;
use crate::error::{BusbotError, Result};
use crate::openai::{create_client, ClientOptions};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, instrument};

/// A generative model that completes a system + user prompt pair.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Produce a completion. Service or transport failures are reported as
    /// [`BusbotError::GenerationUnavailable`].
    async fn complete(&self, system: &str, user: &str) -> Result<String>;

    /// Model name, for logging and diagnostics.
    fn model(&self) -> &str;
}

/// Chat model reached through an OpenAI-compatible completions endpoint.
pub struct OpenAIGenerator {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
    temperature: f32,
}

impl OpenAIGenerator {
    pub fn with_options(options: &ClientOptions, model: &str, temperature: f32) -> Result<Self> {
        Ok(Self {
            client: create_client(options)?,
            model: model.to_string(),
            temperature,
        })
    }

    /// Build the generator described by the `generation` settings section.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let generation = &settings.generation;
        let options = ClientOptions::new(settings.generation_api_key()?)
            .with_api_base(generation.api_base.clone())
            .with_timeout(Duration::from_secs(generation.timeout_secs));
        Self::with_options(&options, &generation.model, generation.temperature)
    }
}

#[async_trait]
impl Generator for OpenAIGenerator {
    #[instrument(skip(self, system, user), fields(model = %self.model))]
    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(system)
                .build()
                .map_err(|e| BusbotError::Rag(e.to_string()))?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(user)
                .build()
                .map_err(|e| BusbotError::Rag(e.to_string()))?
                .into(),
        ];

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(messages)
            .temperature(self.temperature)
            .build()
            .map_err(|e| BusbotError::Rag(e.to_string()))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            BusbotError::GenerationUnavailable(format!("Failed to generate response: {}", e))
        })?;

        let answer = response
            .choices
            .first()
            .and_then(|c| c.message.content.as_ref())
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| {
                BusbotError::GenerationUnavailable("Empty response from model".to_string())
            })?
            .clone();

        debug!("Generated {} characters", answer.len());
        Ok(answer)
    }

    fn model(&self) -> &str {
        &self.model
    }
}
