//! Pre-flight checks before expensive operations.
//!
//! Validates that credentials and source documents are available before
//! starting operations that would otherwise fail midway.

use crate::config::Settings;
use crate::error::{BusbotError, Result};

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Ingestion needs the documents and, for hosted embeddings, a credential.
    Ingest,
    /// Asking questions needs the generation credential as well.
    Ask,
    /// Search only needs the embedding model.
    Search,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation, settings: &Settings) -> Result<()> {
    if settings.embedding.is_hosted() {
        check_api_key(&settings.embedding.api_key_env)?;
    }

    match operation {
        Operation::Ingest => {
            let profiles = settings.profiles_dir();
            if !profiles.is_dir() {
                return Err(BusbotError::Config(format!(
                    "Profiles directory not found: {}",
                    profiles.display()
                )));
            }
        }
        Operation::Ask => {
            check_api_key(&settings.generation.api_key_env)?;
        }
        Operation::Search => {}
    }
    Ok(())
}

/// Check that an API key environment variable is set and non-empty.
fn check_api_key(var: &str) -> Result<()> {
    match std::env::var(var) {
        Ok(key) if !key.trim().is_empty() => Ok(()),
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
