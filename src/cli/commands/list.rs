//! List command implementation.

use crate::cli::Output;
use crate::config::Settings;
use crate::vector_store::{SqliteVectorStore, VectorStore};
use anyhow::Result;

/// Run the list command.
pub async fn run_list(settings: Settings) -> Result<()> {
    let store = SqliteVectorStore::new(&settings.sqlite_path())?;

    match store.list_sources().await {
        Ok(sources) => {
            if sources.is_empty() {
                Output::info("Nothing indexed yet. Use 'busbot ingest' to index the document store.");
            } else {
                Output::header(&format!("Indexed Sources ({})", sources.len()));
                println!();

                for source in &sources {
                    Output::source_info(
                        &source.source_id,
                        source.segment_count,
                        &source.indexed_at.format("%Y-%m-%d %H:%M").to_string(),
                    );
                }

                let total: u32 = sources.iter().map(|s| s.segment_count).sum();
                println!();
                Output::kv("Total sources", &sources.len().to_string());
                Output::kv("Total segments", &total.to_string());
                if let Some(model) = store.indexed_model().await? {
                    Output::kv("Embedding model", &model.model_id);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Failed to list sources: {}", e));
            return Err(e.into());
        }
    }

    Ok(())
}
