//! Optional overrides for a CLI run (command-line flags or programmatic).
//!
//! Used by [`RunConfig::apply_options`](super::RunConfig::apply_options). Callers (the
//! binary or tests) build a `RunOptions` and layer it over the env-based config.

/// Optional overrides: thread id, database path, retention and limits.
///
/// All fields are optional; only set fields override the base config (from env).
#[derive(Clone, Debug, Default)]
pub struct RunOptions {
    /// Thread whose checkpoints are written and read.
    pub thread_id: Option<String>,
    /// SQLite database path; selects the persistent checkpointer.
    pub db_path: Option<String>,
    /// Keep at most this many checkpoints per thread.
    pub max_checkpoints: Option<usize>,
    /// Per-node timeout in milliseconds.
    pub node_timeout_ms: Option<u64>,
    /// Step limit for one run.
    pub max_steps: Option<usize>,
    /// Debug logging (node enter/exit, routing, checkpoints).
    pub verbose: bool,
}
