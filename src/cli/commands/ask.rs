//! Ask command implementation.

use crate::cli::preflight::{self, Operation};
use crate::cli::Output;
use crate::config::Settings;
use crate::pipeline::Pipeline;
use anyhow::Result;

/// Run the ask command.
pub async fn run_ask(question: &str, top_k: Option<usize>, settings: Settings) -> Result<()> {
    // Pre-flight checks
    if let Err(e) = preflight::check(Operation::Ask, &settings) {
        Output::error(&format!("{}", e));
        Output::info("Run 'busbot doctor' for detailed diagnostics.");
        return Err(e.into());
    }

    let pipeline = Pipeline::open(settings).await?;
    let engine = pipeline.engine();
    let k = top_k.unwrap_or_else(|| engine.retriever().top_k());

    let spinner = Output::spinner("Searching bus service records...");
    let result = engine.ask_with(question, k, None).await;
    spinner.finish_and_clear();

    match result {
        Ok(answer) => {
            println!("\n{}\n", answer.text);

            if answer.grounded {
                Output::header("Sources");
                for source in &answer.sources {
                    Output::search_result(source, 100);
                }
            }
        }
        Err(e) if e.is_generation_unavailable() => {
            Output::error(&format!("{}", e));
            Output::info("The answer service is unavailable right now. Please try again later.");
            return Err(e.into());
        }
        Err(e) => {
            Output::error(&format!("Failed to generate answer: {}", e));
            return Err(e.into());
        }
    }

    pipeline.shutdown().await?;
    Ok(())
}
