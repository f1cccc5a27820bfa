//! stategraph-cli library: demo workflows and the commands behind the `stategraph` binary.
//!
//! Reads `STATEGRAPH_*` settings from env / .env, builds a demo graph over a memory or
//! SQLite checkpointer and returns JSON reports.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # async fn demo() -> Result<(), stategraph_cli::Error> {
//! use stategraph_cli::{run_with_config, Demo, RunConfig};
//!
//! let config = RunConfig::default().with_thread_id("release-42");
//! let report = run_with_config(&config, Demo::Approval, Default::default()).await?;
//! assert_eq!(report["status"], "interrupted");
//! # Ok(())
//! # }
//! ```

mod config;
mod demos;
mod middleware;
mod run;

pub use config::{Error, RunConfig, RunOptions};
pub use demos::{Demo, DEMO_KEY};
pub use middleware::{LoggingMiddleware, WithNodeLogging};
pub use run::{
    continue_with_config, history_with_config, load_config, outcome_report,
    resume_with_config, run, run_with_config, status_name,
};

#[cfg(test)]
mod tests;
