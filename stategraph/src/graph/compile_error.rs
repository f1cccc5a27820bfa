//! Graph compilation error.
//!
//! Returned by `StateGraph::compile` when the graph has no entry, references unknown
//! nodes, or declares inconsistent parallel groups.

use thiserror::Error;

/// Error when compiling a state graph.
///
/// Validation ensures node ids are unique and not reserved, every edge, path-table entry,
/// rule and default target names a registered node, group or END, exactly one entry is
/// declared from START, and each node belongs to at most one group.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CompilationError {
    /// An id used in an edge, rule, path table or group was never registered.
    #[error("node not found: {0}")]
    NodeNotFound(String),

    /// `add_node` was called twice with the same id.
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    /// START, END and group names cannot be reused as node ids.
    #[error("reserved id used as node: {0}")]
    ReservedId(String),

    /// No static or conditional edge leaves START.
    #[error("graph must have an edge from START")]
    MissingStart,

    /// More than one unconditional edge, or more than one conditional edge, leaves the
    /// same source.
    #[error("more than one edge of the same kind from `{0}`")]
    DuplicateEdge(String),

    /// Empty group, node in two groups, edge out of a group member, undeclared group.
    #[error("invalid parallel group `{group}`: {reason}")]
    InvalidGroup { group: String, reason: String },
}
