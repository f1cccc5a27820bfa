//! Invoke: linear runs, Command goto, failures, continue_thread, middleware and monitors.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use stategraph::graph::{NodeCall, NodeStatus, RecordingMonitor};
use stategraph::{
    AgentError, CheckpointSource, Checkpointer, Command, GraphConfig, GraphError, MemorySaver,
    Next, NodeMiddleware, NodeOutput, PartialState, RunContext, RunOutcome, RunnableConfig,
    State, StateGraph, END, START,
};

use crate::common::{counter_schema, history_oldest_first, increment, linear_graph, log_of, tag};

/// **Scenario**: A -> B -> C with B incrementing yields counter 1 and exactly three
/// AfterNode checkpoints in order A, B, C.
#[tokio::test]
async fn linear_graph_counts_and_checkpoints_each_node() {
    let saver = Arc::new(MemorySaver::new());
    let graph = linear_graph().compile_with_checkpointer(saver.clone()).unwrap();

    let out = graph
        .invoke(
            PartialState::new().with("counter", 0),
            RunnableConfig::thread("t1"),
        )
        .await
        .unwrap();

    assert_eq!(out.state().get("counter"), Some(&json!(1)));
    let history = history_oldest_first(saver.as_ref(), "t1").await;
    let nodes: Vec<_> = history
        .iter()
        .map(|cp| cp.metadata.node.clone().unwrap_or_default())
        .collect();
    assert_eq!(nodes, vec!["A", "B", "C"]);
    assert!(history
        .iter()
        .all(|cp| cp.metadata.source == CheckpointSource::AfterNode));
    let seqs: Vec<u64> = history.iter().map(|cp| cp.sequence_no).collect();
    assert_eq!(seqs, vec![1, 2, 3]);
    assert_eq!(history[1].parent_sequence_no, Some(1));
    assert_eq!(history[0].metadata.next.as_deref(), Some("B"));
    assert_eq!(history[2].metadata.next, None);
}

/// **Scenario**: invoke with no input seeds declared defaults.
#[tokio::test]
async fn invoke_seeds_schema_defaults() {
    let graph = linear_graph().compile().unwrap();
    let out = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(out.state().get("counter"), Some(&json!(1)));
    assert_eq!(log_of(out.state()), vec!["A", "C"]);
}

/// **Scenario**: A Command goto overrides the node's static edge.
#[tokio::test]
async fn command_goto_overrides_static_edge() {
    let mut graph = StateGraph::new().with_schema(counter_schema());
    graph
        .add_fn_node("router", |_s: State, _c: RunContext| async move {
            Ok(Command::goto(Next::node("skip_to"))
                .with_update(PartialState::new().with("log", json!(["router"])))
                .into())
        })
        .add_node("normal", tag("normal"))
        .add_node("skip_to", tag("skip_to"))
        .add_edge(START, "router")
        .add_edge("router", "normal")
        .add_edge("normal", END)
        .add_edge("skip_to", END);
    let out = graph
        .compile()
        .unwrap()
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(log_of(out.state()), vec!["router", "skip_to"]);
}

/// **Scenario**: Command goto End stops the run even though an edge follows.
#[tokio::test]
async fn command_goto_end_terminates() {
    let mut graph = StateGraph::new().with_schema(counter_schema());
    graph
        .add_fn_node("stop", |_s: State, _c: RunContext| async move {
            Ok(Command::goto(Next::End).into())
        })
        .add_node("never", tag("never"))
        .add_edge(START, "stop")
        .add_edge("stop", "never");
    let out = graph
        .compile()
        .unwrap()
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert!(log_of(out.state()).is_empty());
}

/// **Scenario**: checkpoint_before_node adds a BeforeNode checkpoint ahead of every step.
#[tokio::test]
async fn checkpoint_before_node_writes_two_per_step() {
    let saver = Arc::new(MemorySaver::new());
    let graph = linear_graph()
        .with_config(GraphConfig::default().with_checkpoint_before_node(true))
        .compile_with_checkpointer(saver.clone())
        .unwrap();
    graph
        .invoke(PartialState::new(), RunnableConfig::thread("t"))
        .await
        .unwrap();
    let sources: Vec<CheckpointSource> = history_oldest_first(saver.as_ref(), "t")
        .await
        .iter()
        .map(|cp| cp.metadata.source)
        .collect();
    assert_eq!(sources.len(), 6);
    assert_eq!(sources[0], CheckpointSource::BeforeNode);
    assert_eq!(sources[1], CheckpointSource::AfterNode);
}

/// **Scenario**: A node failure writes an Error checkpoint; continue_thread retries the
/// failed node from the last committed state and finishes the run.
#[tokio::test]
async fn failure_then_continue_thread_retries_failed_node() {
    let failed_once = Arc::new(AtomicBool::new(false));
    let flag = failed_once.clone();
    let mut graph = StateGraph::new().with_schema(counter_schema());
    graph
        .add_node("A", tag("A"))
        .add_fn_node("flaky", move |_s: State, _c: RunContext| {
            let flag = flag.clone();
            async move {
                if !flag.swap(true, Ordering::SeqCst) {
                    return Err(AgentError::ExecutionFailed("transient".into()));
                }
                Ok(PartialState::new().with("log", json!(["flaky"])).into())
            }
        })
        .add_edge(START, "A")
        .add_edge("A", "flaky")
        .add_edge("flaky", END);
    let saver = Arc::new(MemorySaver::new());
    let graph = graph.compile_with_checkpointer(saver.clone()).unwrap();
    let config = RunnableConfig::thread("retry");

    let failure = graph
        .invoke(PartialState::new(), config.clone())
        .await
        .unwrap_err();
    assert!(matches!(&failure.error, GraphError::Node(e) if e.node == "flaky"));
    assert_eq!(log_of(&failure.state), vec!["A"]);
    let latest = saver.latest("retry").await.unwrap().unwrap();
    assert_eq!(latest.metadata.source, CheckpointSource::Error);
    assert_eq!(latest.metadata.next.as_deref(), Some("flaky"));
    assert!(latest.metadata.error.unwrap_or_default().contains("transient"));

    let out = graph.continue_thread(config.clone()).await.unwrap();
    assert_eq!(log_of(out.state()), vec!["A", "flaky"]);

    // nothing left to run
    let again = graph.continue_thread(config).await.unwrap();
    assert_eq!(again, RunOutcome::Complete(out.into_state()));
}

#[tokio::test]
async fn continue_thread_without_checkpoints_is_unknown_thread() {
    let graph = linear_graph()
        .compile_with_checkpointer(Arc::new(MemorySaver::new()))
        .unwrap();
    let err = graph
        .continue_thread(RunnableConfig::thread("nope"))
        .await
        .unwrap_err();
    assert!(matches!(err.error, GraphError::UnknownThread { .. }));
}

/// **Scenario**: Distinct threads run concurrently on one compiled graph.
#[tokio::test]
async fn concurrent_threads_are_independent() {
    let saver = Arc::new(MemorySaver::new());
    let graph = linear_graph().compile_with_checkpointer(saver.clone()).unwrap();
    let runs = (0..4).map(|i| {
        let graph = graph.clone();
        tokio::spawn(async move {
            graph
                .invoke(
                    PartialState::new().with("counter", i),
                    RunnableConfig::thread(format!("t{i}")),
                )
                .await
        })
    });
    for (i, run) in runs.enumerate() {
        let out = run.await.unwrap().unwrap();
        assert_eq!(out.state().get("counter"), Some(&json!(i + 1)));
    }
    let mut threads = saver.thread_ids().await.unwrap();
    threads.sort();
    assert_eq!(threads, vec!["t0", "t1", "t2", "t3"]);
}

struct CountingMiddleware {
    calls: AtomicUsize,
}

#[async_trait]
impl NodeMiddleware for CountingMiddleware {
    async fn around_run(
        &self,
        _node_id: &str,
        state: State,
        inner: NodeCall,
    ) -> Result<NodeOutput, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        inner(state).await
    }
}

/// **Scenario**: compile_with_middleware wraps every node invocation.
#[tokio::test]
async fn middleware_wraps_every_node() {
    let middleware = Arc::new(CountingMiddleware {
        calls: AtomicUsize::new(0),
    });
    let graph = linear_graph()
        .compile_with_middleware(middleware.clone())
        .unwrap();
    graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(middleware.calls.load(Ordering::SeqCst), 3);
}

/// **Scenario**: An installed monitor sees one event per node with its status.
#[tokio::test]
async fn monitor_receives_node_events() {
    let monitor = Arc::new(RecordingMonitor::new());
    let mut graph = StateGraph::new()
        .with_schema(counter_schema())
        .with_monitor(monitor.clone());
    graph
        .add_node("inc", increment())
        .add_edge(START, "inc")
        .add_edge("inc", END);
    graph
        .compile()
        .unwrap()
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    let events = monitor.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].node, "inc");
    assert_eq!(events[0].attempt, 1);
    assert_eq!(events[0].status, NodeStatus::Succeeded);
}

/// **Scenario**: A merge type mismatch fails the run with StateType and keeps prior state.
#[tokio::test]
async fn type_mismatch_is_fatal() {
    let mut graph = StateGraph::new().with_schema(counter_schema());
    graph
        .add_fn_node("bad", |_s: State, _c: RunContext| async move {
            Ok(PartialState::new().with("counter", "one").into())
        })
        .add_edge(START, "bad")
        .add_edge("bad", END);
    let err = graph
        .compile()
        .unwrap()
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err.error, GraphError::StateType(_)));
    assert_eq!(err.state.get("counter"), Some(&json!(0)));
}
