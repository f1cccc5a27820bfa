//! Checkpoint and metadata types.
//!
//! One checkpoint per engine step, keyed by `(thread_id, sequence_no)`. The record is
//! JSON-serializable so external tools can inspect a thread's history.

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::interrupt::Interrupt;
use crate::state::{PartialState, State};

/// Why the checkpoint was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointSource {
    /// Written just before a node or group runs (only with `checkpoint_before_node`).
    BeforeNode,
    /// Node or group completed and its update was committed.
    AfterNode,
    /// Resume value injected into a suspended thread.
    Resume,
    /// Node suspended; the state is the one the node saw.
    Interrupt,
    /// Node, group, routing or merge failure; the state is the last committed one.
    Error,
}

/// Metadata for a single checkpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMetadata {
    pub checkpoint_id: String,
    pub source: CheckpointSource,
    /// Node (or parallel group name) this checkpoint belongs to.
    pub node: Option<String>,
    pub step: u64,
    pub timestamp_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interrupt: Option<Interrupt>,
    /// Update committed by this step, for replay.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<PartialState>,
    /// Node or group to run next when continuing from this checkpoint; `None` means END.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next: Option<String>,
}

impl CheckpointMetadata {
    pub fn new(source: CheckpointSource, node: Option<String>, step: u64) -> Self {
        Self {
            checkpoint_id: uuid::Uuid::new_v4().to_string(),
            source,
            node,
            step,
            timestamp_ms: now_millis(),
            error: None,
            interrupt: None,
            update: None,
            next: None,
        }
    }

    pub fn with_update(mut self, update: PartialState) -> Self {
        self.update = Some(update);
        self
    }

    pub fn with_next(mut self, next: Option<String>) -> Self {
        self.next = next;
        self
    }

    pub fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn with_interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }
}

/// One persisted snapshot. Never mutated after it is saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub thread_id: String,
    pub sequence_no: u64,
    pub parent_sequence_no: Option<u64>,
    pub state: State,
    pub metadata: CheckpointMetadata,
}

/// Where to re-enter a thread: its latest state and the target that was about to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumePoint {
    pub sequence_no: u64,
    pub state: State,
    pub next: Option<String>,
    pub pending_interrupt: Option<Interrupt>,
}

impl From<Checkpoint> for ResumePoint {
    fn from(cp: Checkpoint) -> Self {
        let pending_interrupt = match cp.metadata.source {
            CheckpointSource::Interrupt => cp.metadata.interrupt,
            _ => None,
        };
        Self {
            sequence_no: cp.sequence_no,
            state: cp.state,
            next: cp.metadata.next,
            pending_interrupt,
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
