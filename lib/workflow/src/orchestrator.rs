//! The run orchestrator.
//!
//! Drives one workflow run end to end: load the graph, sort it, execute
//! each node in order while publishing statuses, and close the execution
//! record exactly once. Cancellation is the one terminal state this code
//! never writes; see [`crate::cancel`] for why.

use crate::cancel::CancellationRegistry;
use crate::context::ExecutionContext;
use crate::error::{ExecutionError, GraphError, StoreError};
use crate::event::ExecuteWorkflowEvent;
use crate::execution::Execution;
use crate::executor::{ExecutorParams, ExecutorServices};
use crate::node::NodeId;
use crate::registry::ExecutorRegistry;
use crate::sort::topological_sort;
use crate::status::{
    NodeStatus, NodeStatusUpdate, StatusSink, WorkflowStatus, WorkflowStatusUpdate,
};
use crate::step::StepRunner;
use crate::store::{ExecutionStore, GraphStore, TerminalWrite};
use amber_relay_core::{EventId, WorkflowId};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{error, info, instrument, warn};

/// Errors that abort a run.
#[derive(Debug)]
pub enum OrchestratorError {
    /// A storage collaborator failed.
    Store(StoreError),
    /// The graph is malformed.
    Graph(GraphError),
    /// A node's executor failed.
    Node {
        node_id: NodeId,
        source: ExecutionError,
    },
    /// The run was cancelled while in flight. The cancellation handler
    /// owns the terminal write for this case.
    Cancelled,
}

impl std::fmt::Display for OrchestratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Store(err) => write!(f, "{err}"),
            Self::Graph(err) => write!(f, "{err}"),
            Self::Node { node_id, source } => write!(f, "node {node_id} failed: {source}"),
            Self::Cancelled => write!(f, "execution cancelled"),
        }
    }
}

impl std::error::Error for OrchestratorError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Store(err) => Some(err),
            Self::Graph(err) => Some(err),
            Self::Node { source, .. } => Some(source),
            Self::Cancelled => None,
        }
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(err: StoreError) -> Self {
        Self::Store(err)
    }
}

impl From<GraphError> for OrchestratorError {
    fn from(err: GraphError) -> Self {
        Self::Graph(err)
    }
}

/// Executes workflow runs.
pub struct Orchestrator {
    graphs: Arc<dyn GraphStore>,
    executions: Arc<dyn ExecutionStore>,
    registry: Arc<ExecutorRegistry>,
    services: ExecutorServices,
    status: Arc<dyn StatusSink>,
    step: Arc<dyn StepRunner>,
    cancellations: Arc<CancellationRegistry>,
}

impl Orchestrator {
    #[must_use]
    pub fn new(
        graphs: Arc<dyn GraphStore>,
        executions: Arc<dyn ExecutionStore>,
        registry: Arc<ExecutorRegistry>,
        services: ExecutorServices,
        status: Arc<dyn StatusSink>,
        step: Arc<dyn StepRunner>,
        cancellations: Arc<CancellationRegistry>,
    ) -> Self {
        Self {
            graphs,
            executions,
            registry,
            services,
            status,
            step,
            cancellations,
        }
    }

    /// Runs a workflow for one execute event.
    ///
    /// Creates the RUNNING execution record, walks the sorted graph, and
    /// closes the record as SUCCESS or FAILED. On cancellation the record
    /// is left to the cancellation handler.
    #[instrument(skip(self, event), fields(workflow_id = %event.workflow_id))]
    pub async fn run(&self, event: ExecuteWorkflowEvent) -> Result<Execution, OrchestratorError> {
        let graph = self.graphs.load_graph(event.workflow_id).await?;
        let owner = self.graphs.load_owner(event.workflow_id).await?;

        let execution = Execution::start(event.workflow_id, event.event_id);
        let execution_id = execution.id;
        self.executions.create(execution).await?;
        info!(%execution_id, "execution started");

        self.publish_workflow(event.workflow_id, execution_id, WorkflowStatus::Running, None)
            .await;

        let flag = self.cancellations.register(execution_id, event.workflow_id);
        let seed = ExecutionContext::from_value(event.initial_data.unwrap_or_default());
        let result = self
            .run_nodes(&graph, event.workflow_id, owner, seed, &flag)
            .await;
        self.cancellations.deregister(execution_id);

        match result {
            Ok(context) => {
                let write = self
                    .executions
                    .mark_succeeded(execution_id, context)
                    .await?;
                match write {
                    TerminalWrite::Applied => {
                        self.publish_workflow(
                            event.workflow_id,
                            execution_id,
                            WorkflowStatus::Completed,
                            None,
                        )
                        .await;
                        info!(%execution_id, "execution completed");
                    }
                    TerminalWrite::SupersededByCancellation => {
                        // The handler already closed the record and told
                        // the watchers; a completed publish here would
                        // contradict it.
                        warn!(%execution_id, "completion superseded by cancellation");
                        return Err(OrchestratorError::Cancelled);
                    }
                }

                let stored = self
                    .executions
                    .get(execution_id)
                    .await?
                    .ok_or(StoreError::ExecutionNotFound { execution_id })?;
                Ok(stored)
            }
            Err(OrchestratorError::Cancelled) => {
                info!(%execution_id, "execution cancelled mid-run");
                Err(OrchestratorError::Cancelled)
            }
            Err(err) => {
                error!(%execution_id, error = %err, "execution failed");
                self.finish_failed(event.workflow_id, execution_id, &err).await?;
                Err(err)
            }
        }
    }

    /// Crash-recovery hook: closes the record for a triggering event as
    /// FAILED if it is still RUNNING, so a dead engine never leaves a run
    /// open. Uses the same not-cancelled guard as the normal failure path.
    pub async fn fail_abandoned(
        &self,
        workflow_id: WorkflowId,
        event_id: EventId,
        detail: impl Into<String>,
    ) -> Result<(), StoreError> {
        let detail = detail.into();
        warn!(%workflow_id, %event_id, %detail, "closing abandoned execution");
        let write = self
            .executions
            .fail_running_by_event(workflow_id, event_id, detail.clone())
            .await?;

        if write == TerminalWrite::Applied
            && let Some(execution) = self.executions.find_by_event(workflow_id, event_id).await?
        {
            self.publish_workflow(
                workflow_id,
                execution.id,
                WorkflowStatus::Failed,
                Some(detail),
            )
            .await;
        }
        Ok(())
    }

    async fn run_nodes(
        &self,
        graph: &crate::graph::WorkflowGraph,
        workflow_id: WorkflowId,
        owner: amber_relay_core::UserId,
        seed: ExecutionContext,
        cancel_flag: &AtomicBool,
    ) -> Result<ExecutionContext, OrchestratorError> {
        let order = topological_sort(graph)?;
        let mut context = seed;

        for node_id in order {
            if cancel_flag.load(Ordering::SeqCst) {
                return Err(OrchestratorError::Cancelled);
            }

            let node = graph
                .get_node(node_id)
                .ok_or(GraphError::NodeNotFound { node_id })?;

            self.publish_node(workflow_id, node_id, NodeStatus::Loading, None)
                .await;
            info!(%node_id, node_type = %node.node_type(), "executing node");

            let executor = match self.registry.executor(node.node_type()) {
                Ok(executor) => executor,
                Err(err) => {
                    self.publish_node(workflow_id, node_id, NodeStatus::Error, Some(err.to_string()))
                        .await;
                    return Err(OrchestratorError::Node {
                        node_id,
                        source: err,
                    });
                }
            };

            let params = ExecutorParams {
                node,
                context,
                user_id: owner,
                step: self.step.as_ref(),
            };

            match executor.execute(&self.services, params).await {
                Ok(next) => {
                    self.publish_node(workflow_id, node_id, NodeStatus::Success, None)
                        .await;
                    context = next;
                }
                Err(ExecutionError::Cancelled) => {
                    return Err(OrchestratorError::Cancelled);
                }
                Err(err) => {
                    self.publish_node(workflow_id, node_id, NodeStatus::Error, Some(err.to_string()))
                        .await;
                    return Err(OrchestratorError::Node {
                        node_id,
                        source: err,
                    });
                }
            }
        }

        Ok(context)
    }

    async fn finish_failed(
        &self,
        workflow_id: WorkflowId,
        execution_id: amber_relay_core::ExecutionId,
        err: &OrchestratorError,
    ) -> Result<(), StoreError> {
        let message = err.to_string();
        let detail = std::error::Error::source(err).map(|source| source.to_string());

        let write = self
            .executions
            .mark_failed(execution_id, message.clone(), detail)
            .await?;

        if write == TerminalWrite::Applied {
            self.publish_workflow(
                workflow_id,
                execution_id,
                WorkflowStatus::Failed,
                Some(message),
            )
            .await;
        }
        Ok(())
    }

    async fn publish_node(
        &self,
        workflow_id: WorkflowId,
        node_id: NodeId,
        status: NodeStatus,
        message: Option<String>,
    ) {
        self.status
            .publish_node_status(NodeStatusUpdate {
                workflow_id,
                node_id,
                status,
                message,
            })
            .await;
    }

    async fn publish_workflow(
        &self,
        workflow_id: WorkflowId,
        execution_id: amber_relay_core::ExecutionId,
        status: WorkflowStatus,
        message: Option<String>,
    ) {
        self.status
            .publish_workflow_status(WorkflowStatusUpdate {
                workflow_id,
                execution_id,
                status,
                message,
            })
            .await;
    }
}
