//! Ingest and reindex commands.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::{IngestReport, Pipeline};
use anyhow::Result;

/// Index the document store, replacing entries of unchanged sources in place.
pub async fn run_ingest(settings: Settings) -> Result<()> {
    preflight::check(Operation::Ingest, &settings)?;
    let pipeline = Pipeline::open(settings).await?;

    let spinner = Output::spinner("Indexing documents...");
    let result = pipeline.ingest().await;
    spinner.finish_and_clear();

    print_report(&result?);
    pipeline.shutdown().await?;
    Ok(())
}

/// Drop the index and rebuild it with the configured embedding model.
pub async fn run_reindex(settings: Settings) -> Result<()> {
    preflight::check(Operation::Ingest, &settings)?;
    let pipeline = Pipeline::open_for_reindex(settings)?;

    let spinner = Output::spinner("Rebuilding index...");
    let result = pipeline.reindex().await;
    spinner.finish_and_clear();

    let report = result?;
    Output::info(&format!("Removed {} previous entries", report.cleared));
    print_report(&report);
    pipeline.shutdown().await?;
    Ok(())
}

fn print_report(report: &IngestReport) {
    Output::success(&format!(
        "Indexed {} segments from {} sources",
        report.total_segments(),
        report.indexed.len()
    ));

    for source in &report.indexed {
        let stale = match source.stale_removed {
            0 => String::new(),
            n => format!(", {} stale removed", n),
        };
        Output::list_item(&format!("{} ({} segments{})", source.source_id, source.segments, stale));
    }

    if !report.skipped.is_empty() {
        Output::warning(&format!("Skipped {} sources:", report.skipped.len()));
        for skipped in &report.skipped {
            Output::list_item(&format!("{}: {}", skipped.source, skipped.reason));
        }
    }
}
