//! Workflow graph implementation using petgraph.
//!
//! Workflows are directed graphs where nodes are trigger/action steps and
//! edges are execution dependencies. The graph structure serializes as a
//! flat node list plus `(source, target, edge)` triples, which is also how
//! it is stored as JSONB.
//!
//! At execution time the graph is a read-only snapshot: the orchestrator
//! loads it once per run and never mutates it.

use crate::edge::Edge;
use crate::error::GraphError;
use crate::node::{Node, NodeId};
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A workflow graph using petgraph's directed graph.
///
/// Parallel edges between the same pair of nodes are permitted and each
/// counts separately toward the target's in-degree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowGraph {
    /// The underlying directed graph.
    #[serde(with = "graph_serde")]
    graph: DiGraph<Node, Edge>,
    /// Map from NodeId to petgraph's NodeIndex for O(1) lookup.
    #[serde(skip)]
    node_index_map: HashMap<NodeId, NodeIndex>,
}

impl WorkflowGraph {
    /// Creates a new empty workflow graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_index_map: HashMap::new(),
        }
    }

    /// Adds a node to the graph.
    ///
    /// Returns the node ID.
    pub fn add_node(&mut self, node: Node) -> NodeId {
        let node_id = node.id;
        let index = self.graph.add_node(node);
        self.node_index_map.insert(node_id, index);
        node_id
    }

    /// Returns a reference to a node by its ID.
    #[must_use]
    pub fn get_node(&self, node_id: NodeId) -> Option<&Node> {
        let index = self.node_index_map.get(&node_id)?;
        self.graph.node_weight(*index)
    }

    /// Adds an edge between two nodes.
    ///
    /// # Errors
    ///
    /// Returns an error if the source or target node doesn't exist.
    pub fn add_edge(
        &mut self,
        source_id: NodeId,
        target_id: NodeId,
        edge: Edge,
    ) -> Result<(), GraphError> {
        let source_index = self
            .node_index_map
            .get(&source_id)
            .ok_or(GraphError::NodeNotFound { node_id: source_id })?;

        let target_index = self
            .node_index_map
            .get(&target_id)
            .ok_or(GraphError::NodeNotFound { node_id: target_id })?;

        self.graph.add_edge(*source_index, *target_index, edge);
        Ok(())
    }

    /// Returns all nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.graph.node_weights()
    }

    /// Returns all node IDs in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_weights().map(|node| node.id)
    }

    /// Returns the number of nodes in the graph.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns the number of edges in the graph.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns every edge with its endpoint node IDs resolved.
    pub fn edge_refs(&self) -> Vec<crate::edge::EdgeRef> {
        self.graph
            .edge_references()
            .filter_map(|e| {
                let source = self.graph.node_weight(e.source())?.id;
                let target = self.graph.node_weight(e.target())?.id;
                Some(crate::edge::EdgeRef::new(
                    source,
                    target,
                    e.weight().from_output.clone(),
                    e.weight().to_input.clone(),
                ))
            })
            .collect()
    }

    /// Returns nodes that have no incoming edges (the triggers).
    pub fn entry_nodes(&self) -> Vec<&Node> {
        self.graph
            .node_indices()
            .filter(|&idx| self.graph.edges_directed(idx, Direction::Incoming).count() == 0)
            .filter_map(|idx| self.graph.node_weight(idx))
            .collect()
    }

    /// Returns the in-degree of a node, counting edge multiplicity:
    /// parallel edges from the same predecessor each contribute one unit.
    #[must_use]
    pub fn in_degree(&self, node_id: NodeId) -> usize {
        let Some(&index) = self.node_index_map.get(&node_id) else {
            return 0;
        };
        self.graph.edges_directed(index, Direction::Incoming).count()
    }

    /// Returns the successor node ID for each outgoing edge.
    ///
    /// A target reached by two parallel edges appears twice.
    pub fn successors(&self, node_id: NodeId) -> Vec<NodeId> {
        let Some(&index) = self.node_index_map.get(&node_id) else {
            return Vec::new();
        };

        self.graph
            .edges_directed(index, Direction::Outgoing)
            .filter_map(|edge| self.graph.node_weight(edge.target()).map(|n| n.id))
            .collect()
    }

    /// Validates the graph is acyclic.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::CycleDetected`] if the graph contains a cycle.
    pub fn validate(&self) -> Result<(), GraphError> {
        if petgraph::algo::is_cyclic_directed(&self.graph) {
            return Err(GraphError::CycleDetected);
        }
        Ok(())
    }

    /// Rebuilds the node index map after deserialization.
    pub fn rebuild_index_map(&mut self) {
        self.node_index_map.clear();
        for index in self.graph.node_indices() {
            if let Some(node) = self.graph.node_weight(index) {
                self.node_index_map.insert(node.id, index);
            }
        }
    }
}

impl Default for WorkflowGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Custom serde for petgraph DiGraph.
mod graph_serde {
    use super::*;
    use serde::de::{MapAccess, Visitor};
    use serde::ser::SerializeStruct;

    pub fn serialize<S>(graph: &DiGraph<Node, Edge>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let nodes: Vec<_> = graph.node_weights().cloned().collect();
        let edges: Vec<_> = graph
            .edge_references()
            .map(|e| {
                let source_id = graph.node_weight(e.source()).map(|n| n.id);
                let target_id = graph.node_weight(e.target()).map(|n| n.id);
                (source_id, target_id, e.weight().clone())
            })
            .collect();

        let mut state = serializer.serialize_struct("Graph", 2)?;
        state.serialize_field("nodes", &nodes)?;
        state.serialize_field("edges", &edges)?;
        state.end()
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<DiGraph<Node, Edge>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        type EdgeTuple = (Option<NodeId>, Option<NodeId>, Edge);

        struct GraphVisitor;

        impl<'de> Visitor<'de> for GraphVisitor {
            type Value = DiGraph<Node, Edge>;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a workflow graph with nodes and edges")
            }

            fn visit_map<M>(self, mut map: M) -> Result<Self::Value, M::Error>
            where
                M: MapAccess<'de>,
            {
                let mut nodes: Option<Vec<Node>> = None;
                let mut edges: Option<Vec<EdgeTuple>> = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "nodes" => nodes = Some(map.next_value()?),
                        "edges" => edges = Some(map.next_value()?),
                        _ => {
                            let _ = map.next_value::<serde::de::IgnoredAny>()?;
                        }
                    }
                }

                let nodes = nodes.unwrap_or_default();
                let edges = edges.unwrap_or_default();

                let mut graph = DiGraph::new();
                let mut id_to_index = HashMap::new();

                for node in nodes {
                    let id = node.id;
                    let index = graph.add_node(node);
                    id_to_index.insert(id, index);
                }

                for (source_id, target_id, edge) in edges {
                    let (Some(source), Some(target)) = (source_id, target_id) else {
                        continue;
                    };
                    let (Some(&source_idx), Some(&target_idx)) =
                        (id_to_index.get(&source), id_to_index.get(&target))
                    else {
                        continue;
                    };
                    graph.add_edge(source_idx, target_idx, edge);
                }

                Ok(graph)
            }
        }

        deserializer.deserialize_struct("Graph", &["nodes", "edges"], GraphVisitor)
    }
}
