//! Checkpoint history through a compiled graph: replay determinism, retention, get_state.

use std::sync::Arc;

use futures::StreamExt;
use serde_json::json;
use stategraph::{
    replay, Checkpointer, MemorySaver, PartialState, RetentionPolicy, RunnableConfig,
};

use crate::common::{counter_schema, history_oldest_first, linear_graph};

/// **Scenario**: Folding the recorded updates over the initial state reproduces the final state.
#[tokio::test]
async fn replay_reconstructs_final_state() {
    let saver = Arc::new(MemorySaver::new());
    let graph = linear_graph().compile_with_checkpointer(saver.clone()).unwrap();
    let input = PartialState::new().with("counter", 41);
    let out = graph
        .invoke(input.clone(), RunnableConfig::thread("replay"))
        .await
        .unwrap();

    let schema = counter_schema();
    let base = schema.merge(&schema.initial_state(), &input).unwrap();
    let history = history_oldest_first(saver.as_ref(), "replay").await;
    let rebuilt = replay(&schema, &base, &history).unwrap();
    assert_eq!(&rebuilt, out.state());
    assert_eq!(rebuilt.get("counter"), Some(&json!(42)));
}

/// **Scenario**: With max 2 checkpoints per thread only the newest two survive a 3-step run,
/// and sequence numbers keep counting.
#[tokio::test]
async fn retention_keeps_newest_checkpoints() {
    let saver = Arc::new(MemorySaver::with_retention(
        RetentionPolicy::unbounded().with_max_checkpoints(2),
    ));
    let graph = linear_graph().compile_with_checkpointer(saver.clone()).unwrap();
    graph
        .invoke(PartialState::new(), RunnableConfig::thread("bounded"))
        .await
        .unwrap();
    assert_eq!(saver.sequence_numbers("bounded").await.unwrap(), vec![3, 2]);
    let latest = saver.latest("bounded").await.unwrap().unwrap();
    assert_eq!(latest.metadata.node.as_deref(), Some("C"));
}

/// **Scenario**: get_state returns the latest state; get_state_history is newest first and
/// can be restarted.
#[tokio::test]
async fn get_state_and_history() {
    let saver = Arc::new(MemorySaver::new());
    let graph = linear_graph().compile_with_checkpointer(saver).unwrap();
    let config = RunnableConfig::thread("inspect");
    let out = graph
        .invoke(PartialState::new(), config.clone())
        .await
        .unwrap();

    let latest = graph.get_state(&config).await.unwrap().unwrap();
    assert_eq!(&latest, out.state());

    for _ in 0..2 {
        let seqs: Vec<u64> = graph
            .get_state_history(&config)
            .unwrap()
            .map(|cp| cp.unwrap().sequence_no)
            .collect()
            .await;
        assert_eq!(seqs, vec![3, 2, 1]);
    }
    assert!(graph
        .get_state(&RunnableConfig::thread("other"))
        .await
        .unwrap()
        .is_none());
}

/// **Scenario**: Each invoke on a thread appends to its linear history.
#[tokio::test]
async fn repeated_invokes_append_history() {
    let saver = Arc::new(MemorySaver::new());
    let graph = linear_graph().compile_with_checkpointer(saver.clone()).unwrap();
    let config = RunnableConfig::thread("again");
    for _ in 0..2 {
        graph
            .invoke(PartialState::new(), config.clone())
            .await
            .unwrap();
    }
    let history = history_oldest_first(saver.as_ref(), "again").await;
    assert_eq!(history.len(), 6);
    assert!(history
        .windows(2)
        .all(|w| w[1].parent_sequence_no == Some(w[0].sequence_no)));
}

/// **Scenario**: The SQLite saver persists a graph run the same way the memory saver does.
#[cfg(feature = "sqlite")]
#[tokio::test]
async fn sqlite_saver_records_graph_run() {
    use stategraph::SqliteSaver;

    let dir = tempfile::tempdir().unwrap();
    let saver = Arc::new(SqliteSaver::open(dir.path().join("run.db")).unwrap());
    let graph = linear_graph().compile_with_checkpointer(saver.clone()).unwrap();
    graph
        .invoke(
            PartialState::new().with("counter", 0),
            RunnableConfig::thread("sql"),
        )
        .await
        .unwrap();
    let history = history_oldest_first(saver.as_ref(), "sql").await;
    let nodes: Vec<_> = history
        .iter()
        .map(|cp| cp.metadata.node.clone().unwrap_or_default())
        .collect();
    assert_eq!(nodes, vec!["A", "B", "C"]);
    assert_eq!(history[2].state.get("counter"), Some(&json!(1)));
}
