//! # stategraph
//!
//! A state graph workflow engine. One JSON-map state flows through async nodes; each node
//! returns only the keys it changed, and per-key reducers merge those updates. Routing is
//! layered, groups of nodes can run concurrently with join and error strategies, every
//! step is checkpointed per thread, and nodes can suspend for human input and be resumed
//! later, even from another process when the checkpointer is durable.
//!
//! ## Main Modules
//!
//! - [`state`]: `State`, `PartialState`, `StateSchema` and the reducers.
//! - [`graph`]: `StateGraph`, `CompiledStateGraph`, `Node`, `Command`, routing layers.
//! - [`parallel`]: `ParallelGroup`, join/error strategies, retry, circuit breaker.
//! - [`memory`]: `Checkpointer` with `MemorySaver` and `SqliteSaver`, retention, replay.
//! - [`interrupt`]: `Interrupt` and the per-thread `ThreadStatus`.
//! - [`stream`]: `StreamMode` and `StreamEvent` for `CompiledStateGraph::stream`.
//!
//! ## Features
//!
//! - `sqlite` (default): persistent checkpointer (`SqliteSaver`).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use stategraph::{PartialState, RunContext, RunnableConfig, State, StateGraph, END, START};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let mut graph = StateGraph::new();
//! graph
//!     .add_fn_node("greet", |state: State, _ctx: RunContext| async move {
//!         let name = state.get_as::<String>("name").unwrap_or_default();
//!         Ok(PartialState::new().with("greeting", format!("hello {name}")).into())
//!     })
//!     .add_edge(START, "greet")
//!     .add_edge("greet", END);
//! let compiled = graph.compile().unwrap();
//! let out = compiled
//!     .invoke(PartialState::new().with("name", "ada"), RunnableConfig::default())
//!     .await
//!     .unwrap();
//! assert_eq!(out.state().get_as::<String>("greeting").as_deref(), Some("hello ada"));
//! # }
//! ```

pub mod error;
pub mod graph;
pub mod interrupt;
pub mod memory;
pub mod parallel;
pub mod state;
pub mod stream;

pub use error::{AgentError, GraphError, NodeError, NodeFailure, RunFailure};
pub use graph::{
    Command, CompilationError, CompiledStateGraph, Condition, ExecutionMonitor, FnNode,
    GraphConfig, LlmRouter, LlmRouterConfig, Next, Node, NodeCall, NodeFuture, NodeMiddleware,
    NodeOutput, RouteSource, RouteTarget, RoutingError, RoutingRule, RunContext, RunOutcome,
    StateGraph, END, START,
};
pub use interrupt::{Interrupt, ThreadStatus, INTERRUPT_KEY};
#[cfg(feature = "sqlite")]
pub use memory::SqliteSaver;
pub use memory::{
    replay, Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSource, Checkpointer,
    MemorySaver, ResumePoint, RetentionPolicy, RunnableConfig,
};
pub use parallel::{ErrorStrategy, JoinStrategy, ParallelGroup, QuorumSize, RetryPolicy};
pub use state::{
    FieldKind, FieldSpec, PartialState, Reducer, State, StateSchema, StateTypeError,
    UnknownKeyPolicy, ERRORS_KEY,
};
pub use stream::{StreamEvent, StreamMode};
