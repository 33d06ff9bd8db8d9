//! Client construction for OpenAI-compatible hosted APIs.

use crate::error::{BusbotError, Result};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Default timeout for hosted API requests (2 minutes).
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;

/// Connection parameters for an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub api_key: String,
    /// Base URL; `None` uses the OpenAI default.
    pub api_base: Option<String>,
    pub timeout: Duration,
}

impl ClientOptions {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_base: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }

    pub fn with_api_base(mut self, api_base: Option<String>) -> Self {
        self.api_base = api_base.filter(|b| !b.is_empty());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Create a client for the given endpoint with the configured timeout.
///
/// The timeout is the only bound on a hung call; no retries are layered on top.
pub fn create_client(options: &ClientOptions) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(options.timeout)
        .build()
        .map_err(|e| BusbotError::Config(format!("Failed to create HTTP client: {}", e)))?;

    let mut config = OpenAIConfig::new().with_api_key(options.api_key.clone());
    if let Some(base) = &options.api_base {
        config = config.with_api_base(base.clone());
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_api_base_is_ignored() {
        let options = ClientOptions::new("key").with_api_base(Some(String::new()));
        assert!(options.api_base.is_none());
        assert!(create_client(&options).is_ok());
    }
}
