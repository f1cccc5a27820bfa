//! Explicit next step carried by a [`Command`](super::Command).

use serde::{Deserialize, Serialize};

/// Where a `Command` sends execution, ahead of edges and routing rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Next {
    /// Run this node (or parallel group) next.
    Node(String),
    /// Stop the run.
    End,
}

impl Next {
    pub fn node(id: impl Into<String>) -> Self {
        Next::Node(id.into())
    }
}
