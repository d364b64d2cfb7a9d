//! Edge types for workflow graphs.
//!
//! Edges are directed dependencies from one node's output to another
//! node's input. Multiple edges may target the same node, and parallel
//! edges between the same pair are allowed; each edge counts separately
//! toward the target's in-degree.

use crate::node::NodeId;
use serde::{Deserialize, Serialize};

/// An edge connecting two nodes in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edge {
    /// The name of the output on the source node.
    pub from_output: String,
    /// The name of the input on the target node.
    pub to_input: String,
}

impl Edge {
    /// Creates a new edge between the named output and input.
    #[must_use]
    pub fn new(from_output: impl Into<String>, to_input: impl Into<String>) -> Self {
        Self {
            from_output: from_output.into(),
            to_input: to_input.into(),
        }
    }

    /// Creates an edge using default names ("output" -> "input").
    #[must_use]
    pub fn default_ports() -> Self {
        Self::new("output", "input")
    }
}

impl Default for Edge {
    fn default() -> Self {
        Self::default_ports()
    }
}

/// A complete edge reference including source and target node IDs.
///
/// This is the external representation used by graph snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeRef {
    /// The source node ID.
    pub source_node: NodeId,
    /// The target node ID.
    pub target_node: NodeId,
    /// The source output name.
    pub from_output: String,
    /// The target input name.
    pub to_input: String,
}

impl EdgeRef {
    /// Creates a new edge reference.
    #[must_use]
    pub fn new(
        source_node: NodeId,
        target_node: NodeId,
        from_output: impl Into<String>,
        to_input: impl Into<String>,
    ) -> Self {
        Self {
            source_node,
            target_node,
            from_output: from_output.into(),
            to_input: to_input.into(),
        }
    }

    /// Creates an edge reference using default names.
    #[must_use]
    pub fn with_default_ports(source_node: NodeId, target_node: NodeId) -> Self {
        Self::new(source_node, target_node, "output", "input")
    }
}
