//! CLI module for busbot.

pub mod commands;
mod output;
pub mod preflight;

pub use output::Output;

use clap::{Parser, Subcommand};

/// busbot - Bus booking assistant
///
/// Answers questions about bus providers, routes and fares from a local document
/// store, and serves the booking API.
#[derive(Parser, Debug)]
#[command(name = "busbot")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Path to configuration file
    #[arg(short, long, global = true, env = "BUSBOT_CONFIG")]
    pub config: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check configuration, documents and the index
    Doctor,

    /// Index the document store (unchanged documents are replaced in place)
    Ingest,

    /// Drop the index and rebuild it with the configured embedding model
    Reindex,

    /// Ask a question about bus services
    Ask {
        /// The question to ask
        question: String,

        /// Number of segments to retrieve as context
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Search for relevant segments without generating an answer
    Search {
        /// Search query
        query: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "5")]
        limit: usize,

        /// Minimum similarity score (-1.0 to 1.0)
        #[arg(short, long)]
        min_score: Option<f32>,
    },

    /// List indexed sources
    List,

    /// Start the HTTP API server
    Serve {
        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Port to bind to
        #[arg(short, long, default_value = "8000")]
        port: u16,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,
}
