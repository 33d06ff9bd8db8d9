//! CLI command implementations.

mod ask;
mod config;
mod doctor;
mod ingest;
mod list;
mod search;
mod serve;

pub use ask::run_ask;
pub use config::run_config;
pub use doctor::run_doctor;
pub use ingest::{run_ingest, run_reindex};
pub use list::run_list;
pub use search::run_search;
pub use serve::{router, run_serve, AppState};
