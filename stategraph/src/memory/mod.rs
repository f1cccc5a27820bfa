//! # Memory: Checkpointing
//!
//! ## Overview
//!
//! A [`Checkpointer`] stores one snapshot per engine step for each thread, keyed by
//! `(thread_id, sequence_no)`. History per thread is linear and append-only; retention
//! ([`RetentionPolicy`]) is the only thing that removes entries, and it never removes a
//! thread's newest checkpoint.
//!
//! ## Config
//!
//! [`RunnableConfig`] is passed to `CompiledStateGraph::invoke`. `thread_id` is required
//! for checkpoints, interrupts/resume and history.
//!
//! ## Checkpointer Implementations
//!
//! | Type             | Persistence | Use case                    | Feature  |
//! |------------------|-------------|-----------------------------|----------|
//! | [`MemorySaver`]  | In-memory   | Dev, tests                  | none     |
//! | [`SqliteSaver`]  | SQLite file | Single-node, durable resume | `sqlite` |
//!
//! Use with [`StateGraph::compile_with_checkpointer`](crate::graph::StateGraph::compile_with_checkpointer).
//! [`JsonSerializer`] encodes records for `SqliteSaver`.

mod checkpoint;
mod checkpointer;
mod config;
mod memory_saver;
mod serializer;

#[cfg(feature = "sqlite")]
mod sqlite_saver;

pub use checkpoint::{Checkpoint, CheckpointMetadata, CheckpointSource, ResumePoint};
pub use checkpointer::{replay, CheckpointError, Checkpointer, RetentionPolicy};
pub use config::RunnableConfig;
pub use memory_saver::MemorySaver;
pub use serializer::{JsonSerializer, Serializer};

#[cfg(feature = "sqlite")]
pub use sqlite_saver::SqliteSaver;
