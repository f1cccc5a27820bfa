//! Logging utilities for graph execution.
//!
//! Structured `tracing` events for runs, nodes, routing, checkpoints and parallel
//! groups. Run start/finish at `info`, per-step detail at `debug`, tolerated failures at
//! `warn`, run failures at `error`.

use std::time::Duration;

use crate::error::{GraphError, NodeError};
use crate::memory::{CheckpointError, CheckpointSource};

use super::router::RouteDecision;

/// Log graph execution start.
pub fn log_graph_start(thread_id: Option<&str>, entry: &str) {
    tracing::info!(thread_id, entry, "Starting graph execution");
}

/// Log graph execution completion.
pub fn log_graph_complete(thread_id: Option<&str>, steps: usize) {
    tracing::info!(thread_id, steps, "Graph execution complete");
}

/// Log a run suspended by a node interrupt.
pub fn log_graph_interrupted(thread_id: Option<&str>, node_id: &str) {
    tracing::info!(thread_id, node_id, "Graph execution suspended");
}

/// Log graph execution error.
pub fn log_graph_error(thread_id: Option<&str>, error: &GraphError) {
    tracing::error!(thread_id, %error, "Graph execution error");
}

/// Log node execution start.
pub fn log_node_start(node_id: &str, attempt: u32) {
    tracing::debug!(node_id, attempt, "Starting node execution");
}

/// Log node execution completion.
pub fn log_node_complete(node_id: &str, elapsed: Duration) {
    tracing::debug!(
        node_id,
        elapsed_ms = elapsed.as_millis() as u64,
        "Node execution complete"
    );
}

pub fn log_node_failed(error: &NodeError, elapsed: Duration) {
    tracing::debug!(
        node_id = %error.node,
        cause = %error.cause,
        elapsed_ms = elapsed.as_millis() as u64,
        "Node execution failed"
    );
}

/// Log the router's decision for one step.
pub fn log_route(from: &str, decision: &RouteDecision) {
    tracing::debug!(from, target = ?decision.target, source = ?decision.source, "Route resolved");
}

/// Log a persisted checkpoint.
pub fn log_checkpoint_saved(thread_id: &str, sequence_no: u64, source: CheckpointSource) {
    tracing::debug!(thread_id, sequence_no, ?source, "Checkpoint saved");
}

pub fn log_checkpoint_failed(thread_id: &str, error: &CheckpointError) {
    tracing::warn!(thread_id, %error, "Failed to save error checkpoint");
}

/// Log the LLM router being skipped; routing falls through to the next layer.
pub fn log_llm_router_fallback(from: &str, reason: &str) {
    tracing::warn!(from, reason, "LLM router fallback");
}

pub fn log_group_start(group: &str, members: usize, required: usize) {
    tracing::debug!(group, members, required, "Starting parallel group");
}

pub fn log_group_complete(group: &str, succeeded: usize, failed: usize, cancelled: usize) {
    tracing::debug!(group, succeeded, failed, cancelled, "Parallel group complete");
}

/// Log a member failure tolerated by the group's error strategy.
pub fn log_member_error_tolerated(group: &str, error: &NodeError) {
    tracing::warn!(group, node_id = %error.node, cause = %error.cause, "Member failure tolerated");
}

pub fn log_member_retry(group: &str, node_id: &str, attempt: u32, delay: Duration) {
    tracing::warn!(
        group,
        node_id,
        attempt,
        delay_ms = delay.as_millis() as u64,
        "Retrying group member"
    );
}
