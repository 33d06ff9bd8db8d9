//! busbot - Bus booking assistant with retrieval-augmented answers
//!
//! Answers natural-language questions about bus providers, routes and fares by
//! retrieving the most relevant passages of a local document store and
//! conditioning a hosted chat model on them. Also serves the booking API.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - `config` - Configuration and prompt templates
//! - `documents` - Document store (provider profiles and the route/fare catalog)
//! - `chunking` - Segmentation of documents into overlapping windows and records
//! - `embedding` - Embedding generation
//! - `vector_store` - Vector index abstraction
//! - `rag` - Retrieval and grounded answer generation
//! - `pipeline` - Service object that owns and wires the components
//! - `catalog` - Route, fare and provider lookups
//! - `booking` - Ticket bookings and chat history
//! - `assistant` - Conversational assistant with the booking cancellation dialogue
//!
//! # Example
//!
//! ```rust,no_run
//! use busbot::config::Settings;
//! use busbot::pipeline::Pipeline;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let pipeline = Pipeline::open(settings).await?;
//!
//!     let report = pipeline.ingest().await?;
//!     println!("Indexed {} segments", report.total_segments());
//!
//!     let answer = pipeline.ask("Which buses go from Dhaka to Rajshahi?").await?;
//!     println!("{}", answer.text);
//!
//!     pipeline.shutdown().await?;
//!     Ok(())
//! }
//! ```

pub mod assistant;
pub mod booking;
pub mod catalog;
pub mod chunking;
pub mod cli;
pub mod config;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod openai;
pub mod pipeline;
pub mod rag;
pub mod vector_store;

pub use error::{BusbotError, Result};
