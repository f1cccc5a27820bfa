//! State graph: nodes, layered routing and parallel groups; compile, then invoke.
//!
//! Add nodes and edges to a [`StateGraph`], compile it, then invoke the resulting
//! [`CompiledStateGraph`] with a partial input. Each step runs one node or one parallel
//! group, merges its update through the schema reducers and asks the router for the next
//! target: Command goto, static edge, conditional edge, routing rules, intelligent router,
//! LLM router, default target, END.

mod compile_error;
mod compiled;
mod config;
pub(crate) mod executor;
pub(crate) mod logging;
mod monitor;
mod next;
mod node;
mod node_middleware;
pub(crate) mod router;
mod run_context;
mod state_graph;

pub use compile_error::CompilationError;
pub use compiled::{CompiledStateGraph, RunOutcome};
pub use config::{GraphConfig, LlmRouterConfig, DEFAULT_LLM_ROUTER_TIMEOUT, DEFAULT_MAX_STEPS};
pub use monitor::{ExecutionMonitor, NodeEvent, NodeStatus, RecordingMonitor, TracingMonitor};
pub use next::Next;
pub use node::{Command, FnNode, Node, NodeOutput};
pub use node_middleware::{NodeCall, NodeFuture, NodeMiddleware};
pub use router::{
    Condition, IntelligentRouterFn, LlmRouter, RouteDecision, RouteSource, RouteTarget,
    RoutingError, RoutingRule, RulePredicate,
};
pub use run_context::RunContext;
pub use state_graph::{StateGraph, END, START};
