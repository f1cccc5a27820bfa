//! Shared schemas and node builders for the state graph integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use stategraph::{
    AgentError, Checkpoint, Checkpointer, FieldKind, FieldSpec, FnNode, Node, PartialState,
    RunContext, State, StateGraph, StateSchema, END, START,
};

/// `counter` (integer, default 0) plus an append-bounded `log` list.
pub fn counter_schema() -> StateSchema {
    StateSchema::new()
        .field("counter", FieldSpec::new(FieldKind::Integer).with_default(0))
        .field("log", FieldSpec::list())
}

/// Node appending its own id to `log`.
pub fn tag(id: &'static str) -> Arc<dyn Node> {
    Arc::new(FnNode::new(move |_s: State, _c: RunContext| async move {
        Ok(PartialState::new().with("log", json!([id])).into())
    }))
}

/// Node adding one to `counter`.
pub fn increment() -> Arc<dyn Node> {
    Arc::new(FnNode::new(|state: State, _c: RunContext| async move {
        let counter = state.get_as::<i64>("counter").unwrap_or(0);
        Ok(PartialState::new().with("counter", counter + 1).into())
    }))
}

pub fn failing(message: &'static str) -> Arc<dyn Node> {
    Arc::new(FnNode::new(move |_s: State, _c: RunContext| async move {
        Err(AgentError::ExecutionFailed(message.to_string()))
    }))
}

/// `A -> B -> C -> END`, where B increments `counter`.
pub fn linear_graph() -> StateGraph {
    let mut graph = StateGraph::new().with_schema(counter_schema());
    graph
        .add_node("A", tag("A"))
        .add_node("B", increment())
        .add_node("C", tag("C"))
        .add_edge(START, "A")
        .add_edge("A", "B")
        .add_edge("B", "C")
        .add_edge("C", END);
    graph
}

/// Thread history, oldest first.
pub async fn history_oldest_first(saver: &dyn Checkpointer, thread_id: &str) -> Vec<Checkpoint> {
    let mut history: Vec<Checkpoint> = saver
        .history(thread_id)
        .map(|cp| cp.expect("history entry"))
        .collect()
        .await;
    history.reverse();
    history
}

pub fn log_of(state: &State) -> Vec<String> {
    state.get_as::<Vec<String>>("log").unwrap_or_default()
}
