//! Compiled state graph: immutable, supports invoke, resume, continue and stream.
//!
//! Built by `StateGraph::compile` or `compile_with_checkpointer`. Each step executes one
//! node (or one parallel group), merges its update through the schema reducers, asks the
//! router for the next target and, when a checkpointer is set and `config.thread_id` is
//! provided, writes a checkpoint. Runs on the same thread are serialized by a per-thread lock.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use dashmap::DashMap;
use futures::stream::BoxStream;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_stream::wrappers::ReceiverStream;

use crate::error::{GraphError, RunFailure};
use crate::interrupt::{Interrupt, ThreadStatus, INTERRUPT_KEY};
use crate::memory::{
    Checkpoint, CheckpointError, CheckpointMetadata, CheckpointSource, Checkpointer,
    RunnableConfig,
};
use crate::parallel::GroupRunner;
use crate::state::{PartialState, State, StateSchema};
use crate::stream::{StreamEvent, StreamMode};

use super::config::GraphConfig;
use super::executor::{ExecutionError, NodeExecutor};
use super::logging::{
    log_checkpoint_failed, log_checkpoint_saved, log_graph_complete, log_graph_error,
    log_graph_interrupted, log_graph_start,
};
use super::router::{RouteTarget, Router, RoutingError};
use super::{RunContext, START};

/// How a run stopped without failing.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Routing reached END.
    Complete(State),
    /// A node suspended; call `resume` with a value to continue.
    Interrupted {
        interrupts: Vec<Interrupt>,
        state: State,
    },
}

impl RunOutcome {
    pub fn state(&self) -> &State {
        match self {
            RunOutcome::Complete(state) => state,
            RunOutcome::Interrupted { state, .. } => state,
        }
    }

    pub fn into_state(self) -> State {
        match self {
            RunOutcome::Complete(state) => state,
            RunOutcome::Interrupted { state, .. } => state,
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, RunOutcome::Interrupted { .. })
    }

    pub fn interrupts(&self) -> &[Interrupt] {
        match self {
            RunOutcome::Complete(_) => &[],
            RunOutcome::Interrupted { interrupts, .. } => interrupts,
        }
    }

    /// Final state, or `{"__interrupt__": [payload, ...]}` for a suspended run.
    pub fn into_value(self) -> Value {
        match self {
            RunOutcome::Complete(state) => state.into_value(),
            RunOutcome::Interrupted { interrupts, .. } => {
                let payloads: Vec<Value> = interrupts.into_iter().map(|i| i.payload).collect();
                json!({ INTERRUPT_KEY: payloads })
            }
        }
    }
}

/// Compiled graph: immutable structure, cheap to clone and share across tasks.
#[derive(Clone)]
pub struct CompiledStateGraph {
    pub(super) executor: NodeExecutor,
    pub(super) router: Arc<Router>,
    pub(super) groups: Arc<HashMap<String, GroupRunner>>,
    pub(super) schema: Arc<StateSchema>,
    pub(super) config: GraphConfig,
    pub(super) checkpointer: Option<Arc<dyn Checkpointer>>,
    pub(super) thread_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

/// Per-invocation settings shared by every step of one run.
struct RunScope {
    thread_id: Option<String>,
    ctx: RunContext,
    /// Raw invocation input (or resume value) seen by routing rule predicates.
    input: Option<Value>,
    max_steps: usize,
}

impl CompiledStateGraph {
    /// Runs the graph from START on `initial_state()` merged with `input`.
    ///
    /// Every invocation starts fresh; use `resume` for a suspended thread and
    /// `continue_thread` to retry from the latest checkpoint. Fails with `ThreadSuspended`
    /// while the thread waits for a resume value.
    pub async fn invoke(
        &self,
        input: PartialState,
        config: RunnableConfig,
    ) -> Result<RunOutcome, RunFailure> {
        let ctx = RunContext::new(config);
        self.start(input, ctx).await
    }

    /// Streams graph execution: events are sent on a bounded channel while the run
    /// proceeds on a spawned task. The stream ends when the run completes, suspends or fails;
    /// a failed run sends a final `StreamEvent::Error`.
    pub fn stream(
        &self,
        input: PartialState,
        config: RunnableConfig,
        stream_mode: impl Into<HashSet<StreamMode>>,
    ) -> ReceiverStream<StreamEvent> {
        let (tx, rx) = mpsc::channel(128);
        let graph = self.clone();
        let failures = tx.clone();
        let ctx = RunContext::new(config).with_stream(tx, stream_mode.into());

        tokio::spawn(async move {
            if let Err(failure) = graph.start(input, ctx).await {
                let event = StreamEvent::Error {
                    error: failure.error.to_string(),
                    state: failure.state,
                };
                let _ = failures.send(event).await;
            }
        });

        ReceiverStream::new(rx)
    }

    /// Re-enters the interrupted node of a suspended thread. `ctx.interrupt` returns
    /// `value` inside that node; an object `value` is also merged into state first.
    /// Fails with `RoutingError::InvalidEntry`, writing nothing, when this graph has no such
    /// node.
    pub async fn resume(
        &self,
        value: Value,
        config: RunnableConfig,
    ) -> Result<RunOutcome, RunFailure> {
        let Some((checkpointer, thread_id)) = self.persisted(&config) else {
            return Err(RunFailure::new(GraphError::MissingThreadId, State::new()));
        };
        let _guard = self.lock_thread(thread_id).await;

        let latest = checkpointer
            .latest(thread_id)
            .await
            .map_err(|e| RunFailure::new(e, State::new()))?;
        let interrupt = match ThreadStatus::from_latest(latest.as_ref()) {
            ThreadStatus::Suspended(interrupt) => interrupt,
            _ => {
                return Err(RunFailure::new(
                    GraphError::NoPendingInterrupt {
                        thread_id: thread_id.to_string(),
                    },
                    latest.map(|cp| cp.state).unwrap_or_default(),
                ))
            }
        };
        let Some(latest) = latest else {
            return Err(RunFailure::new(
                GraphError::NoPendingInterrupt {
                    thread_id: thread_id.to_string(),
                },
                State::new(),
            ));
        };

        // checked before any write so a mismatched graph leaves the interrupt pending
        if !matches!(
            self.router.resolve(START, &interrupt.node),
            Ok(RouteTarget::Node(_))
        ) {
            return Err(RunFailure::new(
                RoutingError::InvalidEntry(interrupt.node),
                latest.state,
            ));
        }

        let update = match &value {
            Value::Object(map) => PartialState::from(map.clone()),
            _ => PartialState::new(),
        };
        let state = self
            .schema
            .merge(&latest.state, &update)
            .map_err(|e| RunFailure::new(e, latest.state.clone()))?;

        let scope = self.scope(RunContext::new(config.clone()), Some(value.clone()));
        let step = latest.metadata.step;
        let metadata =
            CheckpointMetadata::new(CheckpointSource::Resume, Some(interrupt.node.clone()), step)
                .with_update(update)
                .with_next(Some(interrupt.node.clone()));
        self.checkpoint(&scope, &state, metadata)
            .await
            .map_err(|e| RunFailure::new(e, latest.state.clone()))?;

        log_graph_start(Some(thread_id), &interrupt.node);
        self.run_loop(
            state,
            RouteTarget::Node(interrupt.node),
            Some(value),
            step.saturating_sub(1),
            &scope,
        )
        .await
    }

    /// Re-enters a thread from its latest checkpoint's `next` target, e.g. to retry the
    /// step that failed. A thread whose latest checkpoint points at END is returned as is.
    pub async fn continue_thread(&self, config: RunnableConfig) -> Result<RunOutcome, RunFailure> {
        let Some((checkpointer, thread_id)) = self.persisted(&config) else {
            return Err(RunFailure::new(GraphError::MissingThreadId, State::new()));
        };
        let _guard = self.lock_thread(thread_id).await;

        let latest = checkpointer
            .latest(thread_id)
            .await
            .map_err(|e| RunFailure::new(e, State::new()))?;
        let Some(latest) = latest else {
            return Err(RunFailure::new(
                GraphError::UnknownThread {
                    thread_id: thread_id.to_string(),
                },
                State::new(),
            ));
        };
        if let ThreadStatus::Suspended(_) = ThreadStatus::from_latest(Some(&latest)) {
            return Err(RunFailure::new(
                GraphError::ThreadSuspended {
                    thread_id: thread_id.to_string(),
                },
                latest.state,
            ));
        }

        let Checkpoint {
            state, metadata, ..
        } = latest;
        let Some(next) = metadata.next else {
            return Ok(RunOutcome::Complete(state));
        };
        let target = match self.router.resolve(START, &next) {
            Ok(target) => target,
            Err(_) => {
                return Err(RunFailure::new(
                    RoutingError::InvalidEntry(next),
                    state,
                ))
            }
        };
        // only a committed step moves the counter forward
        let step = match metadata.source {
            CheckpointSource::AfterNode => metadata.step,
            _ => metadata.step.saturating_sub(1),
        };

        let scope = self.scope(RunContext::new(config.clone()), None);
        log_graph_start(Some(thread_id), &next);
        self.run_loop(state, target, None, step, &scope).await
    }

    /// Latest persisted state of `config.thread_id`.
    pub async fn get_state(&self, config: &RunnableConfig) -> Result<Option<State>, GraphError> {
        let (checkpointer, thread_id) =
            self.persisted(config).ok_or(GraphError::MissingThreadId)?;
        Ok(checkpointer.latest(thread_id).await?.map(|cp| cp.state))
    }

    /// Newest-first checkpoint history of `config.thread_id`, loaded lazily.
    pub fn get_state_history<'a>(
        &'a self,
        config: &'a RunnableConfig,
    ) -> Result<BoxStream<'a, Result<Checkpoint, CheckpointError>>, GraphError> {
        let (checkpointer, thread_id) =
            self.persisted(config).ok_or(GraphError::MissingThreadId)?;
        Ok(checkpointer.history(thread_id))
    }

    /// Status derived from the thread's latest checkpoint; `Unknown` without a checkpointer.
    pub async fn thread_status(&self, thread_id: &str) -> Result<ThreadStatus, GraphError> {
        let Some(checkpointer) = &self.checkpointer else {
            return Ok(ThreadStatus::Unknown);
        };
        let latest = checkpointer.latest(thread_id).await?;
        Ok(ThreadStatus::from_latest(latest.as_ref()))
    }

    pub fn schema(&self) -> &StateSchema {
        &self.schema
    }

    pub fn checkpointer(&self) -> Option<&Arc<dyn Checkpointer>> {
        self.checkpointer.as_ref()
    }

    async fn start(&self, input: PartialState, ctx: RunContext) -> Result<RunOutcome, RunFailure> {
        let thread_id = ctx.config.thread_id.clone();
        let _guard = match thread_id.as_deref() {
            Some(id) => Some(self.lock_thread(id).await),
            None => None,
        };

        if let (Some(checkpointer), Some(id)) = (&self.checkpointer, thread_id.as_deref()) {
            let latest = checkpointer
                .latest(id)
                .await
                .map_err(|e| RunFailure::new(e, State::new()))?;
            if let Some(latest) = latest {
                if let ThreadStatus::Suspended(_) = ThreadStatus::from_latest(Some(&latest)) {
                    return Err(RunFailure::new(
                        GraphError::ThreadSuspended {
                            thread_id: id.to_string(),
                        },
                        latest.state,
                    ));
                }
            }
        }

        let initial = self.schema.initial_state();
        let state = self
            .schema
            .merge(&initial, &input)
            .map_err(|e| RunFailure::new(e, initial))?;
        let scope = self.scope(ctx, Some(input.into_value()));

        log_graph_start(thread_id.as_deref(), START);
        let decision = match self
            .router
            .route(START, &state, scope.input.as_ref(), None)
            .await
        {
            Ok(decision) => decision,
            Err(e) => {
                let error = GraphError::from(e);
                log_graph_error(thread_id.as_deref(), &error);
                return Err(RunFailure::new(error, state));
            }
        };
        self.run_loop(state, decision.target, None, 0, &scope).await
    }

    /// Steps until END, an interrupt, a failure or the step limit.
    ///
    /// `step` is the number of the last committed step; `resume` is handed to the first
    /// node executed only.
    async fn run_loop(
        &self,
        mut state: State,
        mut target: RouteTarget,
        mut resume: Option<Value>,
        mut step: u64,
        scope: &RunScope,
    ) -> Result<RunOutcome, RunFailure> {
        let mut executed = 0usize;
        loop {
            let (name, is_group) = match &target {
                RouteTarget::End => {
                    log_graph_complete(scope.thread_id.as_deref(), executed);
                    return Ok(RunOutcome::Complete(state));
                }
                RouteTarget::Node(id) => (id.clone(), false),
                RouteTarget::Group(group) => (group.clone(), true),
            };
            step += 1;
            if executed >= scope.max_steps {
                let limit = GraphError::RecursionLimit {
                    limit: scope.max_steps,
                };
                return Err(self.abort(scope, state, step, &name, limit).await);
            }
            executed += 1;

            if self.config.checkpoint_before_node {
                let metadata =
                    CheckpointMetadata::new(CheckpointSource::BeforeNode, Some(name.clone()), step)
                        .with_next(Some(name.clone()));
                if let Err(e) = self.checkpoint(scope, &state, metadata).await {
                    return Err(self.abort(scope, state, step, &name, e.into()).await);
                }
            }

            let (update, goto) = if is_group {
                let Some(runner) = self.groups.get(&name) else {
                    let unknown = RoutingError::UnknownTarget {
                        from: name.clone(),
                        target: name.clone(),
                    };
                    return Err(self.abort(scope, state, step, &name, unknown.into()).await);
                };
                match runner
                    .run(&self.executor, &self.schema, &state, &scope.ctx)
                    .await
                {
                    // goto is only honoured for single nodes
                    Ok(outcome) => (outcome.update, None),
                    Err(error) => return Err(self.abort(scope, state, step, &name, error).await),
                }
            } else {
                let ctx = scope.ctx.for_node(&name, resume.take());
                match self.executor.execute(&name, state.clone(), &ctx).await {
                    Ok(output) => output.into_parts(),
                    Err(ExecutionError::Interrupted(interrupt)) => {
                        return self.suspend(scope, state, step, interrupt).await;
                    }
                    Err(ExecutionError::Failed(error)) => {
                        return Err(self.abort(scope, state, step, &name, error.into()).await);
                    }
                }
            };

            let merged = match self.schema.merge(&state, &update) {
                Ok(merged) => merged,
                Err(e) => return Err(self.abort(scope, state, step, &name, e.into()).await),
            };
            let decision = match self
                .router
                .route(&name, &merged, scope.input.as_ref(), goto.as_ref())
                .await
            {
                Ok(decision) => decision,
                Err(e) => return Err(self.abort(scope, state, step, &name, e.into()).await),
            };

            let next = decision.target.name().map(str::to_string);
            let metadata =
                CheckpointMetadata::new(CheckpointSource::AfterNode, Some(name.clone()), step)
                    .with_update(update.clone())
                    .with_next(next);
            if let Err(e) = self.checkpoint(scope, &merged, metadata).await {
                return Err(self.abort(scope, state, step, &name, e.into()).await);
            }
            state = merged;

            scope
                .ctx
                .send(StreamEvent::Updates {
                    node_id: name,
                    update,
                })
                .await;
            scope.ctx.send(StreamEvent::Values(state.clone())).await;
            target = decision.target;
        }
    }

    async fn suspend(
        &self,
        scope: &RunScope,
        state: State,
        step: u64,
        interrupt: Interrupt,
    ) -> Result<RunOutcome, RunFailure> {
        let node = interrupt.node.clone();
        let metadata = CheckpointMetadata::new(CheckpointSource::Interrupt, Some(node.clone()), step)
            .with_interrupt(interrupt.clone())
            .with_next(Some(node.clone()));
        if let Err(e) = self.checkpoint(scope, &state, metadata).await {
            return Err(self.abort(scope, state, step, &node, e.into()).await);
        }
        log_graph_interrupted(scope.thread_id.as_deref(), &node);
        scope.ctx.send(StreamEvent::Interrupt(interrupt.clone())).await;
        Ok(RunOutcome::Interrupted {
            interrupts: vec![interrupt],
            state,
        })
    }

    /// Records an `Error` checkpoint holding the last committed state and the target that
    /// failed, so `continue_thread` can retry it.
    async fn abort(
        &self,
        scope: &RunScope,
        state: State,
        step: u64,
        node: &str,
        error: GraphError,
    ) -> RunFailure {
        log_graph_error(scope.thread_id.as_deref(), &error);
        let metadata = CheckpointMetadata::new(CheckpointSource::Error, Some(node.to_string()), step)
            .with_error(&error)
            .with_next(Some(node.to_string()));
        if let Err(e) = self.checkpoint(scope, &state, metadata).await {
            log_checkpoint_failed(scope.thread_id.as_deref().unwrap_or_default(), &e);
        }
        RunFailure::new(error, state)
    }

    async fn checkpoint(
        &self,
        scope: &RunScope,
        state: &State,
        metadata: CheckpointMetadata,
    ) -> Result<(), CheckpointError> {
        let (Some(checkpointer), Some(thread_id)) = (&self.checkpointer, &scope.thread_id) else {
            return Ok(());
        };
        let source = metadata.source;
        let sequence_no = checkpointer.save(thread_id, state, metadata).await?;
        log_checkpoint_saved(thread_id, sequence_no, source);
        Ok(())
    }

    fn scope(&self, ctx: RunContext, input: Option<Value>) -> RunScope {
        RunScope {
            thread_id: ctx.config.thread_id.clone(),
            max_steps: ctx.config.max_steps.unwrap_or(self.config.max_steps),
            ctx,
            input,
        }
    }

    fn persisted<'a>(
        &'a self,
        config: &'a RunnableConfig,
    ) -> Option<(&'a Arc<dyn Checkpointer>, &'a str)> {
        Some((self.checkpointer.as_ref()?, config.thread_id.as_deref()?))
    }

    async fn lock_thread(&self, thread_id: &str) -> ThreadGuard {
        let lock = Arc::clone(self.thread_locks.entry(thread_id.to_string()).or_default().value());
        ThreadGuard {
            guard: Some(lock.lock_owned().await),
            thread_id: thread_id.to_string(),
            locks: Arc::clone(&self.thread_locks),
        }
    }
}

/// A held per-thread run lock. On drop the lock's map entry is removed unless another run
/// is holding or waiting on it, so the table only keeps threads that are in use.
struct ThreadGuard {
    guard: Option<OwnedMutexGuard<()>>,
    thread_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for ThreadGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        self.locks
            .remove_if(&self.thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}
