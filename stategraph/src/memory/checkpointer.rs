//! Checkpointer trait, retention policy and replay.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use thiserror::Error;

use crate::state::{State, StateSchema, StateTypeError};

use super::checkpoint::{Checkpoint, CheckpointMetadata, ResumePoint};

/// Error from a checkpoint backend.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

/// Bounds how many checkpoints a thread keeps. The newest checkpoint of a thread is
/// never evicted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionPolicy {
    pub max_checkpoints_per_thread: Option<usize>,
    pub ttl: Option<Duration>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn with_max_checkpoints(mut self, max: usize) -> Self {
        self.max_checkpoints_per_thread = Some(max);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Sequence numbers to evict, given a thread's entries oldest-first as
    /// `(sequence_no, timestamp_ms)`.
    pub(crate) fn evictions(&self, entries: &[(u64, u64)], now_ms: u64) -> Vec<u64> {
        let Some(newest) = entries.len().checked_sub(1) else {
            return Vec::new();
        };
        let over_count = self
            .max_checkpoints_per_thread
            .map(|max| entries.len().saturating_sub(max.max(1)))
            .unwrap_or(0);
        let ttl_ms = self.ttl.map(|ttl| ttl.as_millis() as u64);
        entries
            .iter()
            .enumerate()
            .filter(|(i, (_, ts))| {
                *i != newest
                    && (*i < over_count
                        || ttl_ms.is_some_and(|ttl| now_ms.saturating_sub(*ts) > ttl))
            })
            .map(|(_, (seq, _))| *seq)
            .collect()
    }
}

/// Persists state snapshots per thread.
///
/// Sequence numbers are strictly increasing per thread starting at 1; `parent_sequence_no`
/// points at the previous checkpoint of the same thread, even if it was evicted since.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Appends a checkpoint and applies retention. Returns its sequence number.
    async fn save(
        &self,
        thread_id: &str,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<u64, CheckpointError>;

    async fn get(
        &self,
        thread_id: &str,
        sequence_no: u64,
    ) -> Result<Option<Checkpoint>, CheckpointError>;

    async fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>, CheckpointError>;

    /// Retained sequence numbers of a thread, newest first.
    async fn sequence_numbers(&self, thread_id: &str) -> Result<Vec<u64>, CheckpointError>;

    /// Removes every checkpoint of a thread; returns how many were removed.
    async fn delete_thread(&self, thread_id: &str) -> Result<usize, CheckpointError>;

    async fn thread_ids(&self) -> Result<Vec<String>, CheckpointError>;

    /// Newest-first history. Lazy: each checkpoint is loaded when the stream is polled.
    /// Calling it again starts over from the current newest checkpoint.
    fn history<'a>(&'a self, thread_id: &'a str) -> BoxStream<'a, Result<Checkpoint, CheckpointError>> {
        enum Cursor {
            Start,
            Pending(std::vec::IntoIter<u64>),
            Done,
        }

        stream::unfold(Cursor::Start, move |cursor| async move {
            let mut pending = match cursor {
                Cursor::Start => match self.sequence_numbers(thread_id).await {
                    Ok(seqs) => seqs.into_iter(),
                    Err(e) => return Some((Err(e), Cursor::Done)),
                },
                Cursor::Pending(pending) => pending,
                Cursor::Done => return None,
            };
            while let Some(seq) = pending.next() {
                match self.get(thread_id, seq).await {
                    Ok(Some(cp)) => return Some((Ok(cp), Cursor::Pending(pending))),
                    // evicted after the listing
                    Ok(None) => continue,
                    Err(e) => return Some((Err(e), Cursor::Done)),
                }
            }
            None
        })
        .boxed()
    }

    /// State and next target to re-enter the thread from.
    async fn resume(&self, thread_id: &str) -> Result<Option<ResumePoint>, CheckpointError> {
        Ok(self.latest(thread_id).await?.map(ResumePoint::from))
    }
}

/// Rebuilds state by folding the updates recorded in `checkpoints` (oldest first) over `base`.
pub fn replay(
    schema: &StateSchema,
    base: &State,
    checkpoints: &[Checkpoint],
) -> Result<State, StateTypeError> {
    schema.fold(
        base,
        checkpoints.iter().filter_map(|cp| cp.metadata.update.as_ref()),
    )
}
