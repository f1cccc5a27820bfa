//! Streaming types for graph runs.
//!
//! Defines stream modes and events for value, update and custom streaming. Used by
//! `CompiledStateGraph::stream` and by nodes that emit incremental results through
//! `RunContext::emit`.

use serde_json::Value;

use crate::interrupt::Interrupt;
use crate::state::{PartialState, State};

/// Stream mode selector: which kinds of events to emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamMode {
    /// Emit full state after each node or group completes.
    Values,
    /// Emit the committed partial update with the node (or group) id.
    Updates,
    /// Emit custom JSON payloads from nodes.
    Custom,
}

/// Streamed event emitted while running a graph.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamEvent {
    /// Full state snapshot after a step.
    Values(State),
    /// The update a step committed.
    Updates {
        node_id: String,
        update: PartialState,
    },
    /// Custom JSON payload for arbitrary streaming data.
    Custom(Value),
    /// The run suspended; always emitted regardless of the selected modes.
    Interrupt(Interrupt),
    /// The run failed; always emitted and always the last event. Carries the error text and
    /// the last committed state of the `RunFailure`.
    Error { error: String, state: State },
}
