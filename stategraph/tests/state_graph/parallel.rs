//! Parallel groups inside a graph: fan-out merge, error strategies, joins, retry.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stategraph::{
    AgentError, CheckpointSource, Checkpointer, ErrorStrategy, FnNode, GraphError, JoinStrategy,
    MemorySaver, Node, NodeFailure, ParallelGroup, PartialState, QuorumSize, RetryPolicy,
    RunContext, RunnableConfig, State, StateGraph, END, ERRORS_KEY, START,
};

use crate::common::{counter_schema, failing, history_oldest_first, log_of, tag};

/// Member appending its id to `log` after `ms` milliseconds.
fn slow_tag(id: &'static str, ms: u64) -> Arc<dyn Node> {
    Arc::new(FnNode::new(move |_s: State, _c: RunContext| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(PartialState::new().with("log", json!([id])).into())
    }))
}

/// `prep -> group -> done -> END` with the given members.
fn fanout(group: ParallelGroup, members: Vec<(&'static str, Arc<dyn Node>)>) -> StateGraph {
    let name = group.name.clone();
    let mut graph = StateGraph::new().with_schema(counter_schema());
    graph.add_node("prep", tag("prep")).add_node("done", tag("done"));
    for (id, node) in members {
        graph.add_node(id, node);
    }
    graph
        .add_parallel_group(group)
        .add_edge(START, "prep")
        .add_edge("prep", name.clone())
        .add_edge(name, "done")
        .add_edge("done", END);
    graph
}

/// **Scenario**: Members run on the same snapshot and merge in declaration order even
/// when they finish in reverse; the group is one step with one checkpoint.
#[tokio::test(start_paused = true)]
async fn fanout_merges_in_declaration_order() {
    let saver = Arc::new(MemorySaver::new());
    let graph = fanout(
        ParallelGroup::new("fan", ["m1", "m2", "m3"]),
        vec![
            ("m1", slow_tag("m1", 30)),
            ("m2", slow_tag("m2", 20)),
            ("m3", slow_tag("m3", 10)),
        ],
    )
    .compile_with_checkpointer(saver.clone())
    .unwrap();

    let out = graph
        .invoke(PartialState::new(), RunnableConfig::thread("fan"))
        .await
        .unwrap();
    assert_eq!(log_of(out.state()), vec!["prep", "m1", "m2", "m3", "done"]);

    let history = history_oldest_first(saver.as_ref(), "fan").await;
    let nodes: Vec<_> = history
        .iter()
        .map(|cp| cp.metadata.node.clone().unwrap_or_default())
        .collect();
    assert_eq!(nodes, vec!["prep", "fan", "done"]);
    assert_eq!(history[1].metadata.source, CheckpointSource::AfterNode);
}

/// **Scenario**: Under CollectErrors a failing member is recorded in `__errors__` and the
/// graph continues with the successful members' updates.
#[tokio::test]
async fn collect_errors_records_member_failure() {
    let graph = fanout(
        ParallelGroup::new("fan", ["ok", "bad"]).with_error_strategy(ErrorStrategy::CollectErrors),
        vec![("ok", tag("ok")), ("bad", failing("boom"))],
    )
    .compile()
    .unwrap();
    let out = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(log_of(out.state()), vec!["prep", "ok", "done"]);
    let errors = out.state().get(ERRORS_KEY).cloned().unwrap_or_default();
    assert_eq!(errors[0]["node"], json!("bad"));
    assert!(errors[0]["error"].as_str().unwrap_or_default().contains("boom"));
}

/// **Scenario**: IgnoreErrors drops failures without recording them.
#[tokio::test]
async fn ignore_errors_drops_failure() {
    let graph = fanout(
        ParallelGroup::new("fan", ["ok", "bad"]).with_error_strategy(ErrorStrategy::IgnoreErrors),
        vec![("ok", tag("ok")), ("bad", failing("boom"))],
    )
    .compile()
    .unwrap();
    let out = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert!(out.state().get(ERRORS_KEY).is_none());
    assert_eq!(log_of(out.state()), vec!["prep", "ok", "done"]);
}

/// **Scenario**: Under FailFast a member failure fails the run with that node's error and
/// the state committed before the group.
#[tokio::test]
async fn fail_fast_member_failure_fails_run() {
    let saver = Arc::new(MemorySaver::new());
    let graph = fanout(
        ParallelGroup::new("fan", ["ok", "bad"]),
        vec![("ok", tag("ok")), ("bad", failing("boom"))],
    )
    .compile_with_checkpointer(saver.clone())
    .unwrap();
    let err = graph
        .invoke(PartialState::new(), RunnableConfig::thread("ff"))
        .await
        .unwrap_err();
    assert!(matches!(&err.error, GraphError::Node(e) if e.node == "bad"));
    assert_eq!(log_of(&err.state), vec!["prep"]);
    let latest = saver.latest("ff").await.unwrap().unwrap();
    assert_eq!(latest.metadata.source, CheckpointSource::Error);
    assert_eq!(latest.metadata.node.as_deref(), Some("fan"));
}

/// **Scenario**: Any completes with the fastest member and discards the others.
#[tokio::test(start_paused = true)]
async fn any_join_takes_first_success() {
    let graph = fanout(
        ParallelGroup::new("fan", ["slow", "fast"]).with_join(JoinStrategy::Any),
        vec![("slow", slow_tag("slow", 500)), ("fast", slow_tag("fast", 10))],
    )
    .compile()
    .unwrap();
    let out = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(log_of(out.state()), vec!["prep", "fast", "done"]);
}

/// **Scenario**: Quorum(0.66) of three completes after two successes.
#[tokio::test(start_paused = true)]
async fn quorum_join_completes_after_two() {
    let graph = fanout(
        ParallelGroup::new("fan", ["a", "b", "c"])
            .with_join(JoinStrategy::Quorum(QuorumSize::Fraction(0.66))),
        vec![
            ("a", slow_tag("a", 10)),
            ("b", slow_tag("b", 20)),
            ("c", slow_tag("c", 1_000)),
        ],
    )
    .compile()
    .unwrap();
    let out = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(log_of(out.state()), vec!["prep", "a", "b", "done"]);
}

/// **Scenario**: A member failing twice succeeds on its third attempt with retries enabled.
#[tokio::test(start_paused = true)]
async fn member_retries_until_success() {
    let calls = Arc::new(AtomicU32::new(0));
    let seen = calls.clone();
    let flaky: Arc<dyn Node> = Arc::new(FnNode::new(move |_s: State, ctx: RunContext| {
        let seen = seen.clone();
        async move {
            seen.fetch_add(1, Ordering::SeqCst);
            if ctx.attempt < 3 {
                return Err(AgentError::ExecutionFailed("flaky".into()));
            }
            Ok(PartialState::new().with("log", json!(["flaky"])).into())
        }
    }));
    let graph = fanout(
        ParallelGroup::new("fan", ["flaky"]).with_retry(
            RetryPolicy::new(2).with_backoff(Duration::from_millis(100), 2.0),
        ),
        vec![("flaky", flaky)],
    )
    .compile()
    .unwrap();
    let out = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(log_of(out.state()), vec!["prep", "flaky", "done"]);
}

/// **Scenario**: A group deadline under FailFast fails the run with GroupTimeout.
#[tokio::test(start_paused = true)]
async fn group_timeout_fails_run() {
    let graph = fanout(
        ParallelGroup::new("fan", ["slow"]).with_timeout(Duration::from_millis(50)),
        vec![("slow", slow_tag("slow", 5_000))],
    )
    .compile()
    .unwrap();
    let err = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err.error, GraphError::GroupTimeout { ref group, .. } if group == "fan"));
}

/// **Scenario**: An interrupt raised inside a group is a member failure.
#[tokio::test]
async fn interrupt_inside_group_is_member_failure() {
    let asking: Arc<dyn Node> = Arc::new(FnNode::new(|_s: State, ctx: RunContext| async move {
        let answer = ctx.interrupt(json!("approve?"))?;
        Ok(PartialState::new().with("answer", answer).into())
    }));
    let graph = fanout(
        ParallelGroup::new("fan", ["ask"]),
        vec![("ask", asking)],
    )
    .compile()
    .unwrap();
    let err = graph
        .invoke(PartialState::new(), RunnableConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(
        &err.error,
        GraphError::Node(e) if e.cause == NodeFailure::InterruptInGroup
    ));
}
