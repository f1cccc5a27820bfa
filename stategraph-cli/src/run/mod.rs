//! Run entry points: env-based wrappers and the `*_with_config` commands they call.
//!
//! Re-exports [`run`], [`run_with_config`], [`resume_with_config`],
//! [`continue_with_config`], [`history_with_config`] and [`Error`].

pub use crate::config::Error;

mod report;
mod run_with_config;

use serde_json::Value;
use stategraph::PartialState;

use crate::config::{RunConfig, RunOptions};
use crate::demos::Demo;

pub use report::{outcome_report, status_name};
pub use run_with_config::{
    continue_with_config, history_with_config, resume_with_config, run_with_config,
};

/// Run a demo with config from env (and .env), overridden by `options`; returns the JSON report.
pub async fn run(demo: Demo, input: PartialState, options: &RunOptions) -> Result<Value, Error> {
    let config = load_config(options)?;
    run_with_config(&config, demo, input).await
}

/// Builds `RunConfig` from env then applies `options`.
pub fn load_config(options: &RunOptions) -> Result<RunConfig, Error> {
    let mut config = RunConfig::from_env()?;
    config.apply_options(options);
    Ok(config)
}
