//! Extension trait for a fluent build chain: attach node logging middleware then compile.
//!
//! Interacts with [`StateGraph`](stategraph::StateGraph) and
//! [`LoggingMiddleware`](super::logging::LoggingMiddleware).

use std::sync::Arc;

use stategraph::{Checkpointer, CompilationError, CompiledStateGraph, StateGraph};

use super::logging::LoggingMiddleware;

/// Compile a graph with [`LoggingMiddleware`] installed.
pub trait WithNodeLogging {
    /// Compiles with `LoggingMiddleware` and the given checkpointer.
    fn compile_with_node_logging(
        self,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<CompiledStateGraph, CompilationError>;
}

impl WithNodeLogging for StateGraph {
    fn compile_with_node_logging(
        self,
        checkpointer: Arc<dyn Checkpointer>,
    ) -> Result<CompiledStateGraph, CompilationError> {
        self.compile_with_checkpointer_and_middleware(checkpointer, Arc::new(LoggingMiddleware))
    }
}
