//! Execution monitoring: one event per node attempt.

use std::sync::Mutex;
use std::time::Duration;

use crate::error::NodeFailure;

/// How a node attempt ended.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeStatus {
    Succeeded,
    Interrupted,
    Failed(NodeFailure),
}

#[derive(Debug, Clone, PartialEq)]
pub struct NodeEvent {
    pub node: String,
    pub duration: Duration,
    pub attempt: u32,
    pub status: NodeStatus,
}

/// Receives a [`NodeEvent`] after every node attempt. Called on the executing task, so
/// implementations should return quickly.
pub trait ExecutionMonitor: Send + Sync {
    fn on_node(&self, event: &NodeEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMonitor;

impl ExecutionMonitor for TracingMonitor {
    fn on_node(&self, event: &NodeEvent) {
        match &event.status {
            NodeStatus::Failed(cause) => tracing::warn!(
                node = %event.node,
                attempt = event.attempt,
                duration_ms = event.duration.as_millis() as u64,
                %cause,
                "node attempt failed"
            ),
            status => tracing::debug!(
                node = %event.node,
                attempt = event.attempt,
                duration_ms = event.duration.as_millis() as u64,
                ?status,
                "node attempt finished"
            ),
        }
    }
}

/// Keeps every event in memory; handy in tests and for post-run summaries.
#[derive(Debug, Default)]
pub struct RecordingMonitor {
    events: Mutex<Vec<NodeEvent>>,
}

impl RecordingMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<NodeEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ExecutionMonitor for RecordingMonitor {
    fn on_node(&self, event: &NodeEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}
