//! Human-in-the-loop suspension.
//!
//! A node calls [`RunContext::interrupt`](crate::graph::RunContext::interrupt); the engine
//! writes an interrupt checkpoint and returns the payload to the caller. The thread's
//! status is derived from its latest checkpoint, so a suspended thread survives a process
//! restart when the checkpointer is durable.
//!
//! ```text
//! Running --interrupt--> Suspended(payload) --resume(value)--> Resuming --node done--> Running
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::memory::{Checkpoint, CheckpointSource};

/// Reserved key used by [`RunOutcome::into_value`](crate::graph::RunOutcome::into_value).
pub const INTERRUPT_KEY: &str = "__interrupt__";

/// One suspension raised by a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interrupt {
    pub id: String,
    pub thread_id: Option<String>,
    /// Node that raised the interrupt; resume re-enters this node.
    pub node: String,
    pub payload: Value,
}

impl Interrupt {
    pub fn new(node: impl Into<String>, thread_id: Option<String>, payload: Value) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            thread_id,
            node: node.into(),
            payload,
        }
    }
}

/// Execution status of one thread.
#[derive(Debug, Clone, PartialEq)]
pub enum ThreadStatus {
    /// No checkpoint recorded for the thread.
    Unknown,
    /// Last run finished, failed, or is between steps.
    Running,
    /// Waiting for `resume` with a value.
    Suspended(Interrupt),
    /// A resume value was injected and the interrupted node has not completed yet.
    Resuming { node: String },
}

impl ThreadStatus {
    /// Derives the status from the thread's latest checkpoint.
    pub fn from_latest(latest: Option<&Checkpoint>) -> Self {
        let Some(cp) = latest else {
            return ThreadStatus::Unknown;
        };
        match (&cp.metadata.source, &cp.metadata.interrupt) {
            (CheckpointSource::Interrupt, Some(interrupt)) => {
                ThreadStatus::Suspended(interrupt.clone())
            }
            (CheckpointSource::Resume, _) => ThreadStatus::Resuming {
                node: cp.metadata.node.clone().unwrap_or_default(),
            },
            _ => ThreadStatus::Running,
        }
    }

    pub fn pending_interrupt(&self) -> Option<&Interrupt> {
        match self {
            ThreadStatus::Suspended(interrupt) => Some(interrupt),
            _ => None,
        }
    }
}
