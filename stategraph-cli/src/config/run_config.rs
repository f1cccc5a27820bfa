//! Run config: checkpointer location, thread, retention and engine limits. Filled from
//! env / .env and overridden by [`RunOptions`](super::RunOptions).
//!
//! Interacts with stategraph's `GraphConfig`, `RunnableConfig`, `RetentionPolicy` and the
//! `MemorySaver` / `SqliteSaver` checkpointers.

use std::sync::Arc;
use std::time::Duration;

use stategraph::{Checkpointer, GraphConfig, MemorySaver, RetentionPolicy, RunnableConfig};

/// Error type used for config loading and top-level CLI failures.
pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Run config for the operator CLI.
#[derive(Clone, Debug, PartialEq)]
pub struct RunConfig {
    /// SQLite database path. When unset, checkpoints live in memory for this process only.
    pub db_path: Option<String>,
    /// Thread id for checkpoints. Without one a run is not persisted.
    pub thread_id: Option<String>,
    /// Retention: newest checkpoints kept per thread. Default: unbounded.
    pub max_checkpoints: Option<usize>,
    /// Per-node timeout. Default: unbounded.
    pub node_timeout: Option<Duration>,
    /// Step limit for one run. Default: the engine's (25).
    pub max_steps: usize,
    /// When true, debug logs (node enter/exit, routing, checkpoints). Requires --verbose.
    pub verbose: bool,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            thread_id: None,
            max_checkpoints: None,
            node_timeout: None,
            max_steps: GraphConfig::default().max_steps,
            verbose: false,
        }
    }
}

impl RunConfig {
    /// Fill config from env vars (and .env). Loads `.env` itself.
    ///
    /// All variables are optional: `STATEGRAPH_DB_PATH`, `STATEGRAPH_THREAD_ID`,
    /// `STATEGRAPH_MAX_CHECKPOINTS`, `STATEGRAPH_NODE_TIMEOUT_MS`, `STATEGRAPH_MAX_STEPS`.
    /// A numeric variable that does not parse is an error.
    pub fn from_env() -> Result<Self, Error> {
        dotenv::dotenv().ok();
        let defaults = Self::default();
        Ok(Self {
            db_path: std::env::var("STATEGRAPH_DB_PATH").ok(),
            thread_id: std::env::var("STATEGRAPH_THREAD_ID").ok(),
            max_checkpoints: parse_var("STATEGRAPH_MAX_CHECKPOINTS")?,
            node_timeout: parse_var("STATEGRAPH_NODE_TIMEOUT_MS")?.map(Duration::from_millis),
            max_steps: parse_var("STATEGRAPH_MAX_STEPS")?.unwrap_or(defaults.max_steps),
            verbose: false,
        })
    }

    /// Apply optional overrides from `RunOptions` to this config.
    ///
    /// Only set fields in `options` override; `verbose` always follows the options.
    pub fn apply_options(&mut self, options: &super::RunOptions) {
        if options.thread_id.is_some() {
            self.thread_id = options.thread_id.clone();
        }
        if options.db_path.is_some() {
            self.db_path = options.db_path.clone();
        }
        if let Some(max) = options.max_checkpoints {
            self.max_checkpoints = Some(max);
        }
        if let Some(ms) = options.node_timeout_ms {
            self.node_timeout = Some(Duration::from_millis(ms));
        }
        if let Some(max) = options.max_steps {
            self.max_steps = max;
        }
        self.verbose = options.verbose;
    }

    pub fn with_thread_id(mut self, thread_id: &str) -> Self {
        self.thread_id = Some(thread_id.to_string());
        self
    }

    pub fn with_db_path(mut self, db_path: &str) -> Self {
        self.db_path = Some(db_path.to_string());
        self
    }

    /// Engine settings for building the demo graphs.
    pub fn graph_config(&self) -> GraphConfig {
        let config = GraphConfig::default().with_max_steps(self.max_steps);
        match self.node_timeout {
            Some(timeout) => config.with_node_timeout(timeout),
            None => config,
        }
    }

    /// Per-invocation config addressing the configured thread.
    pub fn runnable_config(&self) -> RunnableConfig {
        RunnableConfig {
            thread_id: self.thread_id.clone(),
            max_steps: Some(self.max_steps),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        match self.max_checkpoints {
            Some(max) => RetentionPolicy::unbounded().with_max_checkpoints(max),
            None => RetentionPolicy::unbounded(),
        }
    }

    /// Opens the configured checkpointer: SQLite when `db_path` is set, memory otherwise.
    pub fn checkpointer(&self) -> Result<Arc<dyn Checkpointer>, Error> {
        match &self.db_path {
            Some(path) => open_sqlite(path, self.retention()),
            None => Ok(Arc::new(MemorySaver::with_retention(self.retention()))),
        }
    }
}

#[cfg(feature = "sqlite")]
fn open_sqlite(path: &str, retention: RetentionPolicy) -> Result<Arc<dyn Checkpointer>, Error> {
    let saver = stategraph::SqliteSaver::open(path)?.with_retention(retention);
    Ok(Arc::new(saver))
}

#[cfg(not(feature = "sqlite"))]
fn open_sqlite(path: &str, _retention: RetentionPolicy) -> Result<Arc<dyn Checkpointer>, Error> {
    Err(format!("database {path} requested but stategraph-cli was built without the sqlite feature").into())
}

fn parse_var<T>(name: &str) -> Result<Option<T>, Error>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{name}={raw:?} is invalid: {e}"),
            )
            .into()
        }),
        Err(_) => Ok(None),
    }
}
