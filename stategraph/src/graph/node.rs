//! Node trait, node output and the closure adapter.

use std::future::Future;

use async_trait::async_trait;

use crate::error::AgentError;
use crate::state::PartialState;
use crate::state::State;

use super::{Next, RunContext};

/// What a node hands back: a partial update, or an update plus an explicit next step.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeOutput {
    Update(PartialState),
    Command(Command),
}

impl NodeOutput {
    /// Splits into the update and the optional `goto`.
    pub fn into_parts(self) -> (PartialState, Option<Next>) {
        match self {
            NodeOutput::Update(update) => (update, None),
            NodeOutput::Command(Command { update, goto }) => (update, goto),
        }
    }
}

impl From<PartialState> for NodeOutput {
    fn from(update: PartialState) -> Self {
        NodeOutput::Update(update)
    }
}

impl From<Command> for NodeOutput {
    fn from(command: Command) -> Self {
        NodeOutput::Command(command)
    }
}

/// Update plus routing override. `goto` wins over every edge and rule.
///
/// Inside a parallel group only the update is used.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub update: PartialState,
    pub goto: Option<Next>,
}

impl Command {
    pub fn goto(next: Next) -> Self {
        Self {
            update: PartialState::new(),
            goto: Some(next),
        }
    }

    pub fn with_update(mut self, update: PartialState) -> Self {
        self.update = update;
        self
    }
}

/// One step in a graph: reads the full state, returns only the keys it changed.
///
/// **Interaction**: Registered on [`StateGraph`](super::StateGraph) with `add_node`; run by
/// the executor with a per-invocation [`RunContext`]. Return
/// `Err(AgentError::Interrupted(..))` (usually via `ctx.interrupt(payload)?`) to suspend.
#[async_trait]
pub trait Node: Send + Sync {
    async fn run(&self, state: State, ctx: &RunContext) -> Result<NodeOutput, AgentError>;
}

/// Adapts an async closure `(State, RunContext) -> Result<NodeOutput, AgentError>` into a [`Node`].
pub struct FnNode<F> {
    f: F,
}

impl<F> FnNode<F> {
    pub fn new<Fut>(f: F) -> Self
    where
        F: Fn(State, RunContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<NodeOutput, AgentError>> + Send,
    {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> Node for FnNode<F>
where
    F: Fn(State, RunContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<NodeOutput, AgentError>> + Send,
{
    async fn run(&self, state: State, ctx: &RunContext) -> Result<NodeOutput, AgentError> {
        (self.f)(state, ctx.clone()).await
    }
}
