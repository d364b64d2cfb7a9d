//! Realtime execution status updates.
//!
//! One channel per workflow, two topics: per-node status and whole-run
//! status. Publishes are fire-and-forget; a dropped update is tolerable
//! because consumers keep only the latest value per key and the terminal
//! state also lands in storage. Subscribers must treat arrival order as
//! authoritative, not timestamps.

use crate::node::NodeId;
use amber_relay_core::{ExecutionId, WorkflowId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The transient status of a single node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    /// Not yet reached by the run.
    Initial,
    /// Currently executing.
    Loading,
    /// Completed successfully.
    Success,
    /// Failed; the run aborts after this.
    Error,
    /// The run was cancelled before or during this node.
    Cancelled,
}

/// The status of the whole run, as published on the workflow topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

/// A per-node status update on the `nodestatus` topic.
///
/// `message` carries the node's failure detail on `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeStatusUpdate {
    pub workflow_id: WorkflowId,
    pub node_id: NodeId,
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// A whole-run status update on the `workflowstatus` topic.
///
/// `message` carries the failure detail on `failed`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatusUpdate {
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub status: WorkflowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Publishes status updates to whoever is watching the run.
///
/// Implementations must not fail the run: a publish error is logged and
/// swallowed by the caller.
#[async_trait]
pub trait StatusSink: Send + Sync {
    async fn publish_node_status(&self, update: NodeStatusUpdate);
    async fn publish_workflow_status(&self, update: WorkflowStatusUpdate);
}

/// Collects published updates in memory, in arrival order.
#[derive(Default)]
pub struct InMemoryStatusSink {
    node_updates: std::sync::Mutex<Vec<NodeStatusUpdate>>,
    workflow_updates: std::sync::Mutex<Vec<WorkflowStatusUpdate>>,
}

impl InMemoryStatusSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All node updates published so far.
    #[must_use]
    pub fn node_updates(&self) -> Vec<NodeStatusUpdate> {
        self.node_updates.lock().expect("status lock").clone()
    }

    /// All workflow updates published so far.
    #[must_use]
    pub fn workflow_updates(&self) -> Vec<WorkflowStatusUpdate> {
        self.workflow_updates.lock().expect("status lock").clone()
    }

    /// The statuses published for one node, in arrival order.
    #[must_use]
    pub fn statuses_for(&self, node_id: NodeId) -> Vec<NodeStatus> {
        self.node_updates()
            .into_iter()
            .filter(|update| update.node_id == node_id)
            .map(|update| update.status)
            .collect()
    }
}

#[async_trait]
impl StatusSink for InMemoryStatusSink {
    async fn publish_node_status(&self, update: NodeStatusUpdate) {
        self.node_updates.lock().expect("status lock").push(update);
    }

    async fn publish_workflow_status(&self, update: WorkflowStatusUpdate) {
        self.workflow_updates
            .lock()
            .expect("status lock")
            .push(update);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&NodeStatus::Loading).unwrap(),
            "\"loading\""
        );
        assert_eq!(
            serde_json::to_string(&WorkflowStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn failure_message_is_omitted_when_absent() {
        let update = WorkflowStatusUpdate {
            workflow_id: WorkflowId::new(),
            execution_id: ExecutionId::new(),
            status: WorkflowStatus::Running,
            message: None,
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(!json.contains("message"));

        let node_update = NodeStatusUpdate {
            workflow_id: WorkflowId::new(),
            node_id: NodeId::new(),
            status: NodeStatus::Success,
            message: None,
        };
        let json = serde_json::to_string(&node_update).unwrap();
        assert!(!json.contains("message"));
    }

    #[tokio::test]
    async fn in_memory_sink_preserves_arrival_order() {
        let sink = InMemoryStatusSink::new();
        let workflow_id = WorkflowId::new();
        let node_id = NodeId::new();

        for status in [NodeStatus::Loading, NodeStatus::Success] {
            sink.publish_node_status(NodeStatusUpdate {
                workflow_id,
                node_id,
                status,
                message: None,
            })
            .await;
        }

        assert_eq!(
            sink.statuses_for(node_id),
            vec![NodeStatus::Loading, NodeStatus::Success]
        );
    }
}
