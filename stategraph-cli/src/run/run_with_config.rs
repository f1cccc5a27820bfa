//! Commands run against an explicit [`RunConfig`]; none of them read `.env`.
//!
//! Each command opens the configured checkpointer, builds the demo graph with
//! [`LoggingMiddleware`](crate::middleware::LoggingMiddleware) installed and returns a JSON
//! report. Failures come back as the run's error; the last committed state stays in the
//! checkpointer for `history` and `continue`.

use std::sync::Arc;

use futures::TryStreamExt;
use serde_json::{json, Value};
use stategraph::{Checkpointer, CompiledStateGraph, PartialState, ThreadStatus};

use crate::config::RunConfig;
use crate::demos::Demo;
use crate::middleware::WithNodeLogging;

use super::report::{outcome_report, status_name};
use super::Error;

fn compile(
    config: &RunConfig,
    demo: Demo,
    checkpointer: Arc<dyn Checkpointer>,
) -> Result<CompiledStateGraph, Error> {
    Ok(demo
        .graph(config.graph_config())
        .compile_with_node_logging(checkpointer)?)
}

fn require_thread(config: &RunConfig) -> Result<&str, Error> {
    config
        .thread_id
        .as_deref()
        .ok_or_else(|| "this command needs --thread-id (or STATEGRAPH_THREAD_ID)".into())
}

/// The demo a thread was started with, read from its latest checkpoint.
async fn demo_of_thread(checkpointer: &dyn Checkpointer, thread_id: &str) -> Result<Demo, Error> {
    let latest = checkpointer
        .latest(thread_id)
        .await?
        .ok_or_else(|| format!("thread {thread_id:?} has no checkpoints"))?;
    Demo::of_state(&latest.state)
        .ok_or_else(|| format!("thread {thread_id:?} was not started by a known demo").into())
}

/// Runs `demo` from its initial state merged with `input`.
pub async fn run_with_config(
    config: &RunConfig,
    demo: Demo,
    input: PartialState,
) -> Result<Value, Error> {
    let graph = compile(config, demo, config.checkpointer()?)?;
    tracing::info!(demo = %demo, thread_id = ?config.thread_id, "running demo");
    let outcome = graph
        .invoke(demo.input(input), config.runnable_config())
        .await?;
    Ok(outcome_report(config.thread_id.as_deref(), outcome))
}

/// Resumes a suspended thread with `value` using the demo the thread was started with.
/// A `demo` that names a different one is rejected before anything runs.
pub async fn resume_with_config(
    config: &RunConfig,
    demo: Option<Demo>,
    value: Value,
) -> Result<Value, Error> {
    let thread_id = require_thread(config)?;
    let checkpointer = config.checkpointer()?;
    let started = demo_of_thread(checkpointer.as_ref(), thread_id).await?;
    if let Some(requested) = demo {
        if requested != started {
            return Err(format!(
                "thread {thread_id:?} belongs to demo {started}, not {requested}"
            )
            .into());
        }
    }
    let demo = started;
    let graph = compile(config, demo, checkpointer)?;
    tracing::info!(demo = %demo, thread_id, "resuming thread");
    let outcome = graph.resume(value, config.runnable_config()).await?;
    Ok(outcome_report(Some(thread_id), outcome))
}

/// Continues a thread from its latest checkpoint, e.g. after a failed step.
pub async fn continue_with_config(config: &RunConfig) -> Result<Value, Error> {
    let thread_id = require_thread(config)?;
    let checkpointer = config.checkpointer()?;
    let demo = demo_of_thread(checkpointer.as_ref(), thread_id).await?;
    let graph = compile(config, demo, checkpointer)?;
    tracing::info!(demo = %demo, thread_id, "continuing thread");
    let outcome = graph.continue_thread(config.runnable_config()).await?;
    Ok(outcome_report(Some(thread_id), outcome))
}

/// `{thread_id, status, checkpoints}` with checkpoints newest first.
pub async fn history_with_config(config: &RunConfig) -> Result<Value, Error> {
    let thread_id = require_thread(config)?;
    let checkpointer = config.checkpointer()?;
    let checkpoints: Vec<_> = checkpointer.history(thread_id).try_collect().await?;
    let status = ThreadStatus::from_latest(checkpoints.first());
    Ok(json!({
        "thread_id": thread_id,
        "status": status_name(&status),
        "checkpoints": checkpoints,
    }))
}
