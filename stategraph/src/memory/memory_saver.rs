//! In-memory checkpointer for development and tests.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::state::State;

use super::checkpoint::{now_millis, Checkpoint, CheckpointMetadata};
use super::checkpointer::{CheckpointError, Checkpointer, RetentionPolicy};

#[derive(Default)]
struct ThreadLog {
    last_sequence_no: Option<u64>,
    entries: BTreeMap<u64, Checkpoint>,
}

/// Keeps every thread's checkpoints in memory; lost when dropped.
///
/// **Interaction**: Pass as `Arc<dyn Checkpointer>` to
/// [`StateGraph::compile_with_checkpointer`](crate::graph::StateGraph::compile_with_checkpointer).
#[derive(Default)]
pub struct MemorySaver {
    threads: RwLock<HashMap<String, ThreadLog>>,
    retention: RetentionPolicy,
}

impl MemorySaver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_retention(retention: RetentionPolicy) -> Self {
        Self {
            threads: RwLock::new(HashMap::new()),
            retention,
        }
    }

    /// Total checkpoints across all threads.
    pub async fn checkpoint_count(&self) -> usize {
        self.threads
            .read()
            .await
            .values()
            .map(|log| log.entries.len())
            .sum()
    }
}

#[async_trait]
impl Checkpointer for MemorySaver {
    async fn save(
        &self,
        thread_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<u64, CheckpointError> {
        let mut threads = self.threads.write().await;
        let log = threads.entry(thread_id.to_string()).or_default();
        let sequence_no = log.last_sequence_no.map_or(1, |n| n + 1);
        log.entries.insert(
            sequence_no,
            Checkpoint {
                thread_id: thread_id.to_string(),
                sequence_no,
                parent_sequence_no: log.last_sequence_no,
                state: state.clone(),
                metadata,
            },
        );
        log.last_sequence_no = Some(sequence_no);

        let ages: Vec<(u64, u64)> = log
            .entries
            .values()
            .map(|cp| (cp.sequence_no, cp.metadata.timestamp_ms))
            .collect();
        for seq in self.retention.evictions(&ages, now_millis()) {
            log.entries.remove(&seq);
        }
        Ok(sequence_no)
    }

    async fn get(
        &self,
        thread_id: &str,
        sequence_no: u64,
    ) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .and_then(|log| log.entries.get(&sequence_no).cloned()))
    }

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .and_then(|log| log.entries.values().next_back().cloned()))
    }

    async fn sequence_numbers(&self, thread_id: &str) -> Result<Vec<u64>, CheckpointError> {
        Ok(self
            .threads
            .read()
            .await
            .get(thread_id)
            .map(|log| log.entries.keys().rev().copied().collect())
            .unwrap_or_default())
    }

    async fn delete_thread(&self, thread_id: &str) -> Result<usize, CheckpointError> {
        Ok(self
            .threads
            .write()
            .await
            .remove(thread_id)
            .map(|log| log.entries.len())
            .unwrap_or(0))
    }

    async fn thread_ids(&self) -> Result<Vec<String>, CheckpointError> {
        let mut ids: Vec<String> = self.threads.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}
