//! Logging middleware that traces node enter/exit around each node call.

use async_trait::async_trait;

use stategraph::{AgentError, NodeCall, NodeMiddleware, NodeOutput, State};

/// Middleware that logs node enter/exit around each node call.
///
/// Logs through `tracing` at debug level so stdout stays reserved for JSON results.
pub struct LoggingMiddleware;

#[async_trait]
impl NodeMiddleware for LoggingMiddleware {
    async fn around_run(
        &self,
        node_id: &str,
        state: State,
        inner: NodeCall,
    ) -> Result<NodeOutput, AgentError> {
        tracing::debug!(node = node_id, keys = state.len(), "node enter");
        let result = inner(state).await;
        match &result {
            Ok(NodeOutput::Update(update)) => {
                tracing::debug!(node = node_id, updated = update.len(), "node exit")
            }
            Ok(NodeOutput::Command(command)) => {
                tracing::debug!(node = node_id, goto = ?command.goto, "node exit")
            }
            Err(e) => tracing::debug!(node = node_id, error = %e, "node exit"),
        }
        result
    }
}
