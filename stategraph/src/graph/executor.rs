//! Node registry and executor.
//!
//! The registry is the dispatch table (node id -> `Arc<dyn Node>`) plus group membership,
//! built once by `StateGraph` and read-only afterwards. The executor invokes one node
//! with the graph-wide timeout, turns returned errors and panics into [`NodeError`],
//! runs the optional middleware and reports a [`NodeEvent`] to the optional monitor.

use std::any::Any;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;

use crate::error::{AgentError, NodeError, NodeFailure};
use crate::interrupt::Interrupt;
use crate::state::State;

use super::logging::{log_node_complete, log_node_failed, log_node_start};
use super::monitor::{ExecutionMonitor, NodeEvent, NodeStatus};
use super::node_middleware::{NodeFuture, NodeMiddleware};
use super::{Node, NodeOutput, RunContext};

#[derive(Default, Clone)]
pub(crate) struct NodeRegistry {
    nodes: HashMap<String, Arc<dyn Node>>,
    group_of: HashMap<String, String>,
}

impl NodeRegistry {
    /// Registers a node; returns `false` when the id was already taken (the old node is replaced).
    pub(crate) fn register(
        &mut self,
        id: String,
        node: Arc<dyn Node>,
        group: Option<String>,
    ) -> bool {
        match group {
            Some(group) => {
                self.group_of.insert(id.clone(), group);
            }
            None => {
                self.group_of.remove(&id);
            }
        }
        self.nodes.insert(id, node).is_none()
    }

    pub(crate) fn set_group(&mut self, id: &str, group: &str) {
        self.group_of.insert(id.to_string(), group.to_string());
    }

    pub(crate) fn get(&self, id: &str) -> Option<Arc<dyn Node>> {
        self.nodes.get(id).cloned()
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub(crate) fn memberships(&self) -> impl Iterator<Item = (&String, &String)> {
        self.group_of.iter()
    }

    pub(crate) fn ids(&self) -> impl Iterator<Item = &String> {
        self.nodes.keys()
    }
}

/// Why a node invocation did not produce output.
#[derive(Debug)]
pub(crate) enum ExecutionError {
    Interrupted(Interrupt),
    Failed(NodeError),
}

#[derive(Clone)]
pub(crate) struct NodeExecutor {
    registry: Arc<NodeRegistry>,
    middleware: Option<Arc<dyn NodeMiddleware>>,
    monitor: Option<Arc<dyn ExecutionMonitor>>,
    node_timeout: Option<Duration>,
}

impl NodeExecutor {
    pub(crate) fn new(
        registry: NodeRegistry,
        middleware: Option<Arc<dyn NodeMiddleware>>,
        monitor: Option<Arc<dyn ExecutionMonitor>>,
        node_timeout: Option<Duration>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            middleware,
            monitor,
            node_timeout,
        }
    }

    /// Runs node `id` once. `ctx` must already be scoped to the node (`RunContext::for_node`).
    pub(crate) async fn execute(
        &self,
        id: &str,
        state: State,
        ctx: &RunContext,
    ) -> Result<NodeOutput, ExecutionError> {
        let attempt = ctx.attempt;
        let Some(node) = self.registry.get(id) else {
            return Err(ExecutionError::Failed(NodeError::new(
                id,
                NodeFailure::Failed(format!("node `{id}` is not registered")),
            )));
        };

        log_node_start(id, attempt);
        let started = Instant::now();
        let ctx = ctx.clone();
        let call: NodeFuture = match &self.middleware {
            Some(middleware) => {
                let middleware = Arc::clone(middleware);
                let node_id = id.to_string();
                Box::pin(async move {
                    middleware
                        .around_run(
                            &node_id,
                            state,
                            Box::new(move |s| {
                                Box::pin(async move { node.run(s, &ctx).await }) as NodeFuture
                            }),
                        )
                        .await
                })
            }
            None => Box::pin(async move { node.run(state, &ctx).await }),
        };

        let guarded = AssertUnwindSafe(call).catch_unwind();
        let settled = match self.node_timeout {
            Some(limit) => tokio::time::timeout(limit, guarded)
                .await
                .map_err(|_| NodeFailure::TimedOut(limit)),
            None => Ok(guarded.await),
        };

        let result = match settled {
            Ok(Ok(Ok(output))) => Ok(output),
            Ok(Ok(Err(AgentError::Interrupted(interrupt)))) => {
                Err(ExecutionError::Interrupted(interrupt))
            }
            Ok(Ok(Err(AgentError::ExecutionFailed(msg)))) => Err(ExecutionError::Failed(
                NodeError::new(id, NodeFailure::Failed(msg)),
            )),
            Ok(Err(panic)) => Err(ExecutionError::Failed(NodeError::new(
                id,
                NodeFailure::Panicked(panic_message(panic.as_ref())),
            ))),
            Err(timed_out) => Err(ExecutionError::Failed(NodeError::new(id, timed_out))),
        };

        let elapsed = started.elapsed();
        let status = match &result {
            Ok(_) => {
                log_node_complete(id, elapsed);
                NodeStatus::Succeeded
            }
            Err(ExecutionError::Interrupted(_)) => NodeStatus::Interrupted,
            Err(ExecutionError::Failed(error)) => {
                log_node_failed(error, elapsed);
                NodeStatus::Failed(error.cause.clone())
            }
        };
        if let Some(monitor) = &self.monitor {
            monitor.on_node(&NodeEvent {
                node: id.to_string(),
                duration: elapsed,
                attempt,
                status,
            });
        }
        result
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
