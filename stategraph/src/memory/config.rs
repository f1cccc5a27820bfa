//! Invoke config: thread_id and per-run overrides.
//!
//! Used by `CompiledStateGraph::invoke` / `resume` and to address a Checkpointer thread.

/// Config for a single invoke. Identifies the thread whose checkpoints are written.
///
/// Without a `thread_id` (or without a checkpointer on the graph) the run is not
/// persisted and cannot be resumed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunnableConfig {
    /// Execution lineage id. Required for checkpoints, resume and history.
    pub thread_id: Option<String>,
    /// Overrides `GraphConfig::max_steps` for this run.
    pub max_steps: Option<usize>,
}

impl RunnableConfig {
    /// Config addressing one thread.
    pub fn thread(thread_id: impl Into<String>) -> Self {
        Self {
            thread_id: Some(thread_id.into()),
            ..Default::default()
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}
