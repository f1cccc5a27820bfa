//! StateGraph compile failure cases: unknown ids, missing entry, reserved ids, bad groups.

use std::collections::HashMap;

use stategraph::{CompilationError, Condition, ParallelGroup, RoutingRule, StateGraph, END, START};

use crate::common::tag;

#[tokio::test]
async fn compile_fails_when_edge_refers_to_unknown_node() {
    let mut graph = StateGraph::new();
    graph.add_node("echo", tag("echo"));
    graph.add_edge(START, "echo");
    graph.add_edge("echo", "missing");

    match graph.compile() {
        Err(CompilationError::NodeNotFound(id)) => assert_eq!(id, "missing"),
        other => panic!("expected NodeNotFound, got {:?}", other.err()),
    }
}

/// **Scenario**: A graph without an edge from START has no entry.
#[tokio::test]
async fn compile_fails_without_start_edge() {
    let mut graph = StateGraph::new();
    graph.add_node("a", tag("a")).add_edge("a", END);
    assert_eq!(graph.compile().err(), Some(CompilationError::MissingStart));
}

#[tokio::test]
async fn compile_fails_on_duplicate_node() {
    let mut graph = StateGraph::new();
    graph
        .add_node("a", tag("a"))
        .add_node("a", tag("a"))
        .add_edge(START, "a");
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::DuplicateNode("a".into()))
    );
}

/// **Scenario**: END cannot be registered as a node id.
#[tokio::test]
async fn compile_fails_on_reserved_id() {
    let mut graph = StateGraph::new();
    graph.add_node(END, tag("end")).add_edge(START, END);
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::ReservedId(END.into()))
    );
}

#[tokio::test]
async fn compile_fails_on_second_unconditional_edge() {
    let mut graph = StateGraph::new();
    graph
        .add_node("a", tag("a"))
        .add_node("b", tag("b"))
        .add_edge(START, "a")
        .add_edge("a", "b")
        .add_edge("a", END);
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::DuplicateEdge("a".into()))
    );
}

/// **Scenario**: A second conditional edge from the same source is rejected, not swapped in.
#[tokio::test]
async fn compile_fails_on_second_conditional_edge() {
    let mut graph = StateGraph::new();
    graph
        .add_node("a", tag("a"))
        .add_node("b", tag("b"))
        .add_edge(START, "a")
        .add_edge("b", END)
        .add_conditional_edges("a", Condition::sync(|_| "b".to_string()), None)
        .add_conditional_edges("a", Condition::sync(|_| END.to_string()), None);
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::DuplicateEdge("a".into()))
    );
}

/// **Scenario**: Path tables and rules are validated like edges.
#[tokio::test]
async fn compile_fails_on_unknown_path_or_rule_target() {
    let mut graph = StateGraph::new();
    graph
        .add_node("a", tag("a"))
        .add_edge(START, "a")
        .add_conditional_edges(
            "a",
            Condition::sync(|_| "x".to_string()),
            Some(HashMap::from([("x".to_string(), "ghost".to_string())])),
        );
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::NodeNotFound("ghost".into()))
    );

    let mut graph = StateGraph::new();
    graph
        .add_node("a", tag("a"))
        .add_edge(START, "a")
        .add_routing_rule(RoutingRule::new("a", |_, _| true, "nowhere", 1));
    assert_eq!(
        graph.compile().err(),
        Some(CompilationError::NodeNotFound("nowhere".into()))
    );
}

/// **Scenario**: A node may belong to one group only, and routing leaves from the group.
#[tokio::test]
async fn compile_fails_on_inconsistent_groups() {
    let mut graph = StateGraph::new();
    graph
        .add_node("a", tag("a"))
        .add_node("b", tag("b"))
        .add_parallel_group(ParallelGroup::new("g1", ["a", "b"]))
        .add_parallel_group(ParallelGroup::new("g2", ["b"]))
        .add_edge(START, "g1");
    assert!(matches!(
        graph.compile(),
        Err(CompilationError::InvalidGroup { .. })
    ));

    let mut graph = StateGraph::new();
    graph
        .add_node("a", tag("a"))
        .add_node("b", tag("b"))
        .add_parallel_group(ParallelGroup::new("g", ["a", "b"]))
        .add_edge(START, "g")
        .add_edge("a", END);
    assert!(matches!(
        graph.compile(),
        Err(CompilationError::InvalidGroup { group, .. }) if group == "g"
    ));

    let mut graph = StateGraph::new();
    graph
        .add_node_in_group("a", tag("a"), "undeclared")
        .add_edge(START, "a");
    assert!(matches!(
        graph.compile(),
        Err(CompilationError::InvalidGroup { group, .. }) if group == "undeclared"
    ));
}

#[tokio::test]
async fn compile_fails_on_empty_group() {
    let mut graph = StateGraph::new();
    graph
        .add_parallel_group(ParallelGroup::new("g", Vec::<String>::new()))
        .add_edge(START, "g");
    assert!(matches!(
        graph.compile(),
        Err(CompilationError::InvalidGroup { group, .. }) if group == "g"
    ));
}
