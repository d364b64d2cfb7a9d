//! Run cancellation.
//!
//! Cancellation is cooperative: the orchestrator polls a per-run flag
//! between nodes and backs out when it flips. The handler that flips the
//! flag owns the terminal CANCELLED write and the cancelled status
//! publishes; the interrupted orchestrator writes nothing, so the record
//! can never flip back to SUCCESS or FAILED afterwards.

use crate::error::StoreError;
use crate::event::CancelWorkflowEvent;
use crate::status::{
    NodeStatus, NodeStatusUpdate, StatusSink, WorkflowStatus, WorkflowStatusUpdate,
};
use crate::store::{ExecutionStore, GraphStore};
use amber_relay_core::{ExecutionId, WorkflowId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Live cancellation flags for in-flight runs.
///
/// The orchestrator registers a flag when a run starts and deregisters it
/// when the run leaves the main loop, however it leaves.
#[derive(Default)]
pub struct CancellationRegistry {
    flags: Mutex<HashMap<ExecutionId, (WorkflowId, Arc<AtomicBool>)>>,
}

impl CancellationRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a run, returning its cancellation flag.
    pub fn register(&self, execution_id: ExecutionId, workflow_id: WorkflowId) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        self.flags
            .lock()
            .expect("cancellation lock")
            .insert(execution_id, (workflow_id, Arc::clone(&flag)));
        flag
    }

    /// Removes a run's flag. Safe to call for unknown runs.
    pub fn deregister(&self, execution_id: ExecutionId) {
        self.flags
            .lock()
            .expect("cancellation lock")
            .remove(&execution_id);
    }

    /// Flips the flag for one run. Returns false if the run is not
    /// registered (already finished or never started here).
    pub fn cancel_execution(&self, execution_id: ExecutionId) -> bool {
        let flags = self.flags.lock().expect("cancellation lock");
        match flags.get(&execution_id) {
            Some((_, flag)) => {
                flag.store(true, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Flips the flag for every registered run of a workflow, returning
    /// the execution IDs that were flagged.
    pub fn cancel_workflow(&self, workflow_id: WorkflowId) -> Vec<ExecutionId> {
        let flags = self.flags.lock().expect("cancellation lock");
        flags
            .iter()
            .filter(|(_, (wf, _))| *wf == workflow_id)
            .map(|(execution_id, (_, flag))| {
                flag.store(true, Ordering::SeqCst);
                *execution_id
            })
            .collect()
    }

    /// Returns the registered runs for a workflow without flipping flags.
    #[must_use]
    pub fn executions_for(&self, workflow_id: WorkflowId) -> Vec<ExecutionId> {
        let flags = self.flags.lock().expect("cancellation lock");
        flags
            .iter()
            .filter(|(_, (wf, _))| *wf == workflow_id)
            .map(|(execution_id, _)| *execution_id)
            .collect()
    }
}

/// Handles cancel events.
///
/// Owns the whole cancellation protocol: flip the in-flight flag, write
/// the unconditional CANCELLED record, and publish cancelled statuses for
/// the run and for every node so watchers converge without waiting for
/// the interrupted orchestrator.
pub struct CancellationHandler {
    registry: Arc<CancellationRegistry>,
    executions: Arc<dyn ExecutionStore>,
    graphs: Arc<dyn GraphStore>,
    status: Arc<dyn StatusSink>,
}

impl CancellationHandler {
    #[must_use]
    pub fn new(
        registry: Arc<CancellationRegistry>,
        executions: Arc<dyn ExecutionStore>,
        graphs: Arc<dyn GraphStore>,
        status: Arc<dyn StatusSink>,
    ) -> Self {
        Self {
            registry,
            executions,
            graphs,
            status,
        }
    }

    /// Processes one cancel event. Idempotent: re-cancelling a finished
    /// or already-cancelled run only rewrites the same terminal state.
    pub async fn handle(&self, event: CancelWorkflowEvent) -> Result<(), StoreError> {
        let targets = match event.execution_id {
            Some(execution_id) => vec![execution_id],
            None => {
                let mut registered = self.registry.executions_for(event.workflow_id);
                registered.sort();
                registered
            }
        };

        if targets.is_empty() {
            info!(workflow_id = %event.workflow_id, "cancel event matched no in-flight runs");
            return Ok(());
        }

        for execution_id in targets {
            self.cancel_one(event.workflow_id, execution_id).await?;
        }
        Ok(())
    }

    async fn cancel_one(
        &self,
        workflow_id: WorkflowId,
        execution_id: ExecutionId,
    ) -> Result<(), StoreError> {
        let flagged = self.registry.cancel_execution(execution_id);
        info!(%workflow_id, %execution_id, flagged, "cancelling execution");

        match self.executions.mark_cancelled(execution_id).await {
            Ok(()) => {}
            Err(StoreError::ExecutionNotFound { .. }) => {
                warn!(%execution_id, "cancel requested for unknown execution");
                return Ok(());
            }
            Err(err) => return Err(err),
        }

        self.status
            .publish_workflow_status(WorkflowStatusUpdate {
                workflow_id,
                execution_id,
                status: WorkflowStatus::Cancelled,
                message: None,
            })
            .await;

        // Watchers keyed by node need every node to converge, not just
        // the one that was mid-flight.
        match self.graphs.load_graph(workflow_id).await {
            Ok(graph) => {
                for node_id in graph.node_ids() {
                    self.status
                        .publish_node_status(NodeStatusUpdate {
                            workflow_id,
                            node_id,
                            status: NodeStatus::Cancelled,
                            message: None,
                        })
                        .await;
                }
            }
            Err(err) => {
                warn!(%workflow_id, error = %err, "graph unavailable for node cancel statuses");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::{Execution, ExecutionStatus};
    use crate::graph::WorkflowGraph;
    use crate::node::{Node, NodeKind};
    use crate::status::InMemoryStatusSink;
    use crate::store::{InMemoryExecutionStore, InMemoryGraphStore};
    use amber_relay_core::{EventId, UserId};

    #[test]
    fn registry_flag_flips_on_cancel() {
        let registry = CancellationRegistry::new();
        let execution_id = ExecutionId::new();
        let flag = registry.register(execution_id, WorkflowId::new());

        assert!(!flag.load(Ordering::SeqCst));
        assert!(registry.cancel_execution(execution_id));
        assert!(flag.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_workflow_flips_every_registered_run() {
        let registry = CancellationRegistry::new();
        let workflow_id = WorkflowId::new();
        let a = registry.register(ExecutionId::new(), workflow_id);
        let b = registry.register(ExecutionId::new(), workflow_id);
        let other = registry.register(ExecutionId::new(), WorkflowId::new());

        let flagged = registry.cancel_workflow(workflow_id);
        assert_eq!(flagged.len(), 2);
        assert!(a.load(Ordering::SeqCst));
        assert!(b.load(Ordering::SeqCst));
        assert!(!other.load(Ordering::SeqCst));
    }

    #[test]
    fn deregistered_run_cannot_be_cancelled() {
        let registry = CancellationRegistry::new();
        let execution_id = ExecutionId::new();
        registry.register(execution_id, WorkflowId::new());
        registry.deregister(execution_id);
        assert!(!registry.cancel_execution(execution_id));
    }

    struct Harness {
        handler: CancellationHandler,
        registry: Arc<CancellationRegistry>,
        executions: Arc<InMemoryExecutionStore>,
        status: Arc<InMemoryStatusSink>,
        workflow_id: WorkflowId,
        node_count: usize,
    }

    async fn harness() -> Harness {
        let registry = Arc::new(CancellationRegistry::new());
        let executions = Arc::new(InMemoryExecutionStore::new());
        let graphs = Arc::new(InMemoryGraphStore::new());
        let status = Arc::new(InMemoryStatusSink::new());

        let workflow_id = WorkflowId::new();
        let mut graph = WorkflowGraph::new();
        graph.add_node(Node::new("Start", NodeKind::ManualTrigger));
        graphs.insert(workflow_id, graph, UserId::new());

        let handler = CancellationHandler::new(
            Arc::clone(&registry),
            Arc::clone(&executions) as Arc<dyn ExecutionStore>,
            Arc::clone(&graphs) as Arc<dyn GraphStore>,
            Arc::clone(&status) as Arc<dyn StatusSink>,
        );

        Harness {
            handler,
            registry,
            executions,
            status,
            workflow_id,
            node_count: 1,
        }
    }

    #[tokio::test]
    async fn cancel_writes_terminal_state_and_statuses() {
        let h = harness().await;
        let execution = Execution::start(h.workflow_id, EventId::new());
        let execution_id = execution.id;
        h.executions.create(execution).await.unwrap();
        h.registry.register(execution_id, h.workflow_id);

        h.handler
            .handle(CancelWorkflowEvent {
                workflow_id: h.workflow_id,
                execution_id: Some(execution_id),
            })
            .await
            .unwrap();

        let stored = h.executions.get(execution_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);

        let workflow_updates = h.status.workflow_updates();
        assert_eq!(workflow_updates.len(), 1);
        assert_eq!(workflow_updates[0].status, WorkflowStatus::Cancelled);

        let node_updates = h.status.node_updates();
        assert_eq!(node_updates.len(), h.node_count);
        assert!(
            node_updates
                .iter()
                .all(|update| update.status == NodeStatus::Cancelled)
        );
    }

    #[tokio::test]
    async fn cancel_without_execution_id_targets_registered_runs() {
        let h = harness().await;
        let execution = Execution::start(h.workflow_id, EventId::new());
        let execution_id = execution.id;
        h.executions.create(execution).await.unwrap();
        let flag = h.registry.register(execution_id, h.workflow_id);

        h.handler
            .handle(CancelWorkflowEvent {
                workflow_id: h.workflow_id,
                execution_id: None,
            })
            .await
            .unwrap();

        assert!(flag.load(Ordering::SeqCst));
        let stored = h.executions.get(execution_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let h = harness().await;
        let execution = Execution::start(h.workflow_id, EventId::new());
        let execution_id = execution.id;
        h.executions.create(execution).await.unwrap();

        let event = CancelWorkflowEvent {
            workflow_id: h.workflow_id,
            execution_id: Some(execution_id),
        };
        h.handler.handle(event.clone()).await.unwrap();
        h.handler.handle(event).await.unwrap();

        let stored = h.executions.get(execution_id).await.unwrap().unwrap();
        assert_eq!(stored.status, ExecutionStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_of_unknown_execution_is_a_noop() {
        let h = harness().await;
        let result = h
            .handler
            .handle(CancelWorkflowEvent {
                workflow_id: h.workflow_id,
                execution_id: Some(ExecutionId::new()),
            })
            .await;
        assert!(result.is_ok());
        assert!(h.status.workflow_updates().is_empty());
    }
}
