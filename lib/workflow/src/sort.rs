//! Topological ordering of workflow graphs.
//!
//! Kahn's algorithm over node IDs. The orchestrator sorts once per run and
//! then executes nodes strictly in the returned order.

use crate::error::GraphError;
use crate::graph::WorkflowGraph;
use crate::node::NodeId;
use std::collections::{HashMap, VecDeque};

/// Returns the graph's nodes in dependency order.
///
/// Nodes with no incoming edges come first, in insertion order. Ties
/// between newly-unblocked nodes resolve in the order their final
/// predecessor releases them. Parallel edges each count toward the
/// in-degree, so a node behind two parallel edges from the same
/// predecessor is only released once both are consumed.
///
/// # Errors
///
/// Returns [`GraphError::CycleDetected`] if any node is unreachable by
/// dependency order, which is exactly the nodes on or behind a cycle.
pub fn topological_sort(graph: &WorkflowGraph) -> Result<Vec<NodeId>, GraphError> {
    let mut in_degree: HashMap<NodeId, usize> = graph
        .node_ids()
        .map(|id| (id, graph.in_degree(id)))
        .collect();

    let mut queue: VecDeque<NodeId> = graph
        .node_ids()
        .filter(|id| in_degree.get(id) == Some(&0))
        .collect();

    let mut order = Vec::with_capacity(graph.node_count());

    while let Some(node_id) = queue.pop_front() {
        order.push(node_id);

        for successor in graph.successors(node_id) {
            let Some(degree) = in_degree.get_mut(&successor) else {
                continue;
            };
            *degree -= 1;
            if *degree == 0 {
                queue.push_back(successor);
            }
        }
    }

    if order.len() != graph.node_count() {
        return Err(GraphError::CycleDetected);
    }

    Ok(order)
}
