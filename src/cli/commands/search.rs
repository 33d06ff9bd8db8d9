//! Search command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use anyhow::Result;

/// Run the search command.
pub async fn run_search(
    query: &str,
    limit: usize,
    min_score: Option<f32>,
    settings: Settings,
) -> Result<()> {
    preflight::check(Operation::Search, &settings)?;
    let pipeline = Pipeline::open(settings).await?;

    let spinner = Output::spinner("Searching...");
    let result = pipeline.search(query, limit, min_score).await;
    spinner.finish_and_clear();

    match result {
        Ok(result) => {
            if result.is_empty() {
                Output::warning("No results found matching your query.");
            } else {
                Output::success(&format!("Found {} results", result.len()));
                if let Some(provider) = &result.provider {
                    Output::kv("Provider", provider);
                }

                for hit in &result.hits {
                    Output::search_result(hit, 200);
                }
            }
        }
        Err(e) => {
            Output::error(&format!("Search failed: {}", e));
            return Err(e.into());
        }
    }

    pipeline.shutdown().await?;
    Ok(())
}
