//! Human-in-the-loop: suspend, resume, NoPendingInterrupt, resume after reopening a store.

use std::sync::Arc;

use serde_json::json;
use stategraph::{
    CheckpointSource, Checkpointer, GraphError, MemorySaver, PartialState, RoutingError,
    RunContext, RunOutcome, RunnableConfig, State, StateGraph, ThreadStatus, END, START,
};

use crate::common::{counter_schema, history_oldest_first, log_of, tag};

/// `draft -> approve -> publish`; `approve` asks for a decision and records it.
fn approval_graph() -> StateGraph {
    let mut graph = StateGraph::new().with_schema(counter_schema());
    graph
        .add_node("draft", tag("draft"))
        .add_fn_node("approve", |state: State, ctx: RunContext| async move {
            let answer = ctx.interrupt(json!({
                "question": "publish?",
                "draft": state.get("log").cloned(),
            }))?;
            let approved = answer.get("approved").and_then(|v| v.as_bool()).unwrap_or(false);
            Ok(PartialState::new()
                .with("decision", approved)
                .with("log", json!(["approve"]))
                .into())
        })
        .add_node("publish", tag("publish"))
        .add_edge(START, "draft")
        .add_edge("draft", "approve")
        .add_edge("approve", "publish")
        .add_edge("publish", END);
    graph
}

/// **Scenario**: A node interrupt suspends the thread; resume re-enters the node with the
/// value, which is also merged into state, and the run completes.
#[tokio::test]
async fn interrupt_then_resume_completes() {
    let saver = Arc::new(MemorySaver::new());
    let graph = approval_graph()
        .compile_with_checkpointer(saver.clone())
        .unwrap();
    let config = RunnableConfig::thread("doc-1");

    let first = graph
        .invoke(PartialState::new(), config.clone())
        .await
        .unwrap();
    assert!(first.is_interrupted());
    assert_eq!(first.interrupts()[0].node, "approve");
    assert_eq!(log_of(first.state()), vec!["draft"]);
    let value = first.clone().into_value();
    assert_eq!(value["__interrupt__"][0]["question"], json!("publish?"));

    match graph.thread_status("doc-1").await.unwrap() {
        ThreadStatus::Suspended(interrupt) => assert_eq!(interrupt.node, "approve"),
        other => panic!("expected Suspended, got {:?}", other),
    }

    let done = graph
        .resume(json!({"approved": true}), config.clone())
        .await
        .unwrap();
    let state = match done {
        RunOutcome::Complete(state) => state,
        other => panic!("expected Complete, got {:?}", other),
    };
    assert_eq!(state.get("decision"), Some(&json!(true)));
    assert_eq!(state.get("approved"), Some(&json!(true)));
    assert_eq!(log_of(&state), vec!["draft", "approve", "publish"]);
    assert_eq!(
        graph.thread_status("doc-1").await.unwrap(),
        ThreadStatus::Running
    );

    let sources: Vec<CheckpointSource> = history_oldest_first(saver.as_ref(), "doc-1")
        .await
        .iter()
        .map(|cp| cp.metadata.source)
        .collect();
    assert_eq!(
        sources,
        vec![
            CheckpointSource::AfterNode,
            CheckpointSource::Interrupt,
            CheckpointSource::Resume,
            CheckpointSource::AfterNode,
            CheckpointSource::AfterNode,
        ]
    );
}

/// **Scenario**: A non-object resume value is returned from ctx.interrupt but not merged.
#[tokio::test]
async fn scalar_resume_value_reaches_node_only() {
    let mut graph = StateGraph::new();
    graph
        .add_fn_node("ask", |_s: State, ctx: RunContext| async move {
            let answer = ctx.interrupt("name?")?;
            Ok(PartialState::new().with("name", answer).into())
        })
        .add_edge(START, "ask")
        .add_edge("ask", END);
    let graph = graph
        .compile_with_checkpointer(Arc::new(MemorySaver::new()))
        .unwrap();
    let config = RunnableConfig::thread("scalar");
    graph
        .invoke(PartialState::new(), config.clone())
        .await
        .unwrap();
    let out = graph.resume(json!("ada"), config).await.unwrap();
    assert_eq!(out.into_value(), json!({"name": "ada"}));
}

/// **Scenario**: resume on a thread with no pending interrupt returns NoPendingInterrupt.
#[tokio::test]
async fn resume_without_pending_interrupt() {
    let saver = Arc::new(MemorySaver::new());
    let graph = approval_graph()
        .compile_with_checkpointer(saver.clone())
        .unwrap();

    let err = graph
        .resume(json!({"approved": true}), RunnableConfig::thread("never-ran"))
        .await
        .unwrap_err();
    assert!(matches!(err.error, GraphError::NoPendingInterrupt { .. }));

    let config = RunnableConfig::thread("twice");
    graph.invoke(PartialState::new(), config.clone()).await.unwrap();
    graph
        .resume(json!({"approved": false}), config.clone())
        .await
        .unwrap();
    let err = graph
        .resume(json!({"approved": true}), config)
        .await
        .unwrap_err();
    assert!(matches!(err.error, GraphError::NoPendingInterrupt { .. }));
    assert_eq!(err.state.get("decision"), Some(&json!(false)));
}

/// **Scenario**: invoke on a suspended thread is rejected instead of discarding the interrupt.
#[tokio::test]
async fn invoke_on_suspended_thread_is_rejected() {
    let graph = approval_graph()
        .compile_with_checkpointer(Arc::new(MemorySaver::new()))
        .unwrap();
    let config = RunnableConfig::thread("busy");
    graph.invoke(PartialState::new(), config.clone()).await.unwrap();
    let err = graph
        .invoke(PartialState::new(), config.clone())
        .await
        .unwrap_err();
    assert!(matches!(err.error, GraphError::ThreadSuspended { .. }));
    let err = graph.continue_thread(config).await.unwrap_err();
    assert!(matches!(err.error, GraphError::ThreadSuspended { .. }));
}

/// **Scenario**: resume without a thread id is a MissingThreadId error.
#[tokio::test]
async fn resume_requires_thread_id() {
    let graph = approval_graph()
        .compile_with_checkpointer(Arc::new(MemorySaver::new()))
        .unwrap();
    let err = graph
        .resume(json!({}), RunnableConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err.error, GraphError::MissingThreadId));
}

/// **Scenario**: A suspended thread survives reopening the SQLite file, as after a restart.
#[cfg(feature = "sqlite")]
#[tokio::test]
async fn resume_after_reopening_sqlite_store() {
    use stategraph::SqliteSaver;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("checkpoints.db");
    let config = RunnableConfig::thread("durable");

    {
        let saver = Arc::new(SqliteSaver::open(&path).unwrap());
        let graph = approval_graph().compile_with_checkpointer(saver).unwrap();
        let out = graph.invoke(PartialState::new(), config.clone()).await.unwrap();
        assert!(out.is_interrupted());
    }

    let saver = Arc::new(SqliteSaver::open(&path).unwrap());
    let graph = approval_graph()
        .compile_with_checkpointer(saver.clone())
        .unwrap();
    assert!(matches!(
        graph.thread_status("durable").await.unwrap(),
        ThreadStatus::Suspended(_)
    ));
    let out = graph
        .resume(json!({"approved": true}), config)
        .await
        .unwrap();
    assert_eq!(log_of(out.state()), vec!["draft", "approve", "publish"]);
    assert_eq!(saver.sequence_numbers("durable").await.unwrap().len(), 5);
}

/// **Scenario**: Resuming through a graph that lacks the interrupted node fails with
/// InvalidEntry, writes no checkpoint and leaves the thread resumable by the right graph.
#[tokio::test]
async fn resume_with_foreign_graph_keeps_interrupt() {
    let saver = Arc::new(MemorySaver::new());
    let graph = approval_graph()
        .compile_with_checkpointer(saver.clone())
        .unwrap();
    let config = RunnableConfig::thread("doc-2");
    graph
        .invoke(PartialState::new(), config.clone())
        .await
        .unwrap();
    let saved = saver.checkpoint_count().await;

    let mut other = StateGraph::new().with_schema(counter_schema());
    other
        .add_node("draft", tag("draft"))
        .add_edge(START, "draft")
        .add_edge("draft", END);
    let other = other.compile_with_checkpointer(saver.clone()).unwrap();
    let err = other
        .resume(json!({"approved": true}), config.clone())
        .await
        .unwrap_err();
    assert!(matches!(
        &err.error,
        GraphError::Routing(RoutingError::InvalidEntry(node)) if node == "approve"
    ));
    assert_eq!(log_of(&err.state), vec!["draft"]);
    assert_eq!(saver.checkpoint_count().await, saved);
    assert!(matches!(
        graph.thread_status("doc-2").await.unwrap(),
        ThreadStatus::Suspended(_)
    ));

    let done = graph
        .resume(json!({"approved": true}), config)
        .await
        .unwrap();
    assert_eq!(log_of(done.state()), vec!["draft", "approve", "publish"]);
}
