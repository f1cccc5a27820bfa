//! Error types for node execution and graph runs.
//!
//! Node authors return [`AgentError`]. The executor turns it into a structured
//! [`NodeError`] carrying the node id; the run loop reports everything as a
//! [`GraphError`], wrapped in [`RunFailure`] together with the last committed state.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::RoutingError;
use crate::interrupt::Interrupt;
use crate::memory::CheckpointError;
use crate::state::{State, StateTypeError};

/// Error returned by a node function.
///
/// `Interrupted` is produced by [`RunContext::interrupt`](crate::graph::RunContext::interrupt)
/// so nodes can suspend with `?`.
#[derive(Debug, Error)]
pub enum AgentError {
    /// Execution failed with a message (e.g. tool or model call failed).
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The node asked to suspend and wait for external input.
    #[error("interrupted at node `{}`", .0.node)]
    Interrupted(Interrupt),
}

impl From<Interrupt> for AgentError {
    fn from(interrupt: Interrupt) -> Self {
        AgentError::Interrupted(interrupt)
    }
}

/// Why a node invocation failed.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
pub enum NodeFailure {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {0:?}")]
    TimedOut(Duration),

    #[error("panicked: {0}")]
    Panicked(String),

    #[error("circuit breaker open")]
    CircuitOpen,

    #[error("cancelled")]
    Cancelled,

    #[error("interrupts are not supported inside parallel groups")]
    InterruptInGroup,
}

/// Structured node failure: which node, and why.
#[derive(Debug, Clone, Error, PartialEq, Serialize, Deserialize)]
#[error("node `{node}` failed: {cause}")]
pub struct NodeError {
    pub node: String,
    pub cause: NodeFailure,
}

impl NodeError {
    pub fn new(node: impl Into<String>, cause: NodeFailure) -> Self {
        Self {
            node: node.into(),
            cause,
        }
    }
}

/// Any error that aborts a graph step.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error(transparent)]
    Node(#[from] NodeError),

    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    StateType(#[from] StateTypeError),

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("parallel group `{group}` exceeded its {timeout:?} deadline")]
    GroupTimeout { group: String, timeout: Duration },

    #[error("parallel group `{group}` needed {required} successes, got {succeeded}")]
    GroupFailed {
        group: String,
        required: usize,
        succeeded: usize,
        failures: Vec<NodeError>,
    },

    #[error("no pending interrupt for thread `{thread_id}`")]
    NoPendingInterrupt { thread_id: String },

    #[error("thread `{thread_id}` is suspended; resume it instead of starting a new run")]
    ThreadSuspended { thread_id: String },

    #[error("thread `{thread_id}` has no checkpoints")]
    UnknownThread { thread_id: String },

    #[error("this operation requires a checkpointer and config.thread_id")]
    MissingThreadId,

    #[error("recursion limit of {limit} steps reached")]
    RecursionLimit { limit: usize },
}

/// A failed run: the error plus the last committed state.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct RunFailure {
    #[source]
    pub error: GraphError,
    pub state: State,
}

impl RunFailure {
    pub fn new(error: impl Into<GraphError>, state: State) -> Self {
        Self {
            error: error.into(),
            state,
        }
    }
}
