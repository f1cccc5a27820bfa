//! Node middleware: wraps each node invocation.
//!
//! Installed at compile time (`compile_with_middleware`). Runs inside the executor's
//! timeout and panic capture, for plain nodes and for parallel-group members alike.

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::state::State;

use super::NodeOutput;

/// Boxed future returned by the wrapped node call.
pub type NodeFuture = Pin<Box<dyn Future<Output = Result<NodeOutput, AgentError>> + Send>>;

/// Continuation handed to [`NodeMiddleware::around_run`]; calling it runs the node.
pub type NodeCall = Box<dyn FnOnce(State) -> NodeFuture + Send>;

/// Around-advice for node execution: may inspect or replace the state going in and the
/// output coming back, or skip the node entirely by not calling `inner`.
#[async_trait]
pub trait NodeMiddleware: Send + Sync {
    async fn around_run(
        &self,
        node_id: &str,
        state: State,
        inner: NodeCall,
    ) -> Result<NodeOutput, AgentError>;
}
