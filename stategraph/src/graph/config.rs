//! Engine configuration passed to `StateGraph::with_config` at build time.

use std::time::Duration;

/// Default step budget per invocation.
pub const DEFAULT_MAX_STEPS: usize = 25;

/// Default bound on one LLM router decision.
pub const DEFAULT_LLM_ROUTER_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LlmRouterConfig {
    /// When false an installed LLM router is skipped.
    pub enabled: bool,
    pub timeout: Duration,
}

impl Default for LlmRouterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: DEFAULT_LLM_ROUTER_TIMEOUT,
        }
    }
}

/// Graph-wide execution settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphConfig {
    /// Upper bound on one node invocation; `None` means unbounded.
    pub node_timeout: Option<Duration>,
    /// Nodes and groups executed per invocation before `RecursionLimit`.
    pub max_steps: usize,
    /// Also write a `BeforeNode` checkpoint ahead of every step.
    pub checkpoint_before_node: bool,
    pub llm_router: LlmRouterConfig,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            node_timeout: None,
            max_steps: DEFAULT_MAX_STEPS,
            checkpoint_before_node: false,
            llm_router: LlmRouterConfig::default(),
        }
    }
}

impl GraphConfig {
    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = Some(timeout);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn with_checkpoint_before_node(mut self, enabled: bool) -> Self {
        self.checkpoint_before_node = enabled;
        self
    }

    pub fn with_llm_router(mut self, llm_router: LlmRouterConfig) -> Self {
        self.llm_router = llm_router;
        self
    }
}
