//! Storage collaborators for executions and workflow graphs.
//!
//! The execution record is the only shared mutable state of a run, and
//! every writer goes through these traits. Success and failure writes are
//! conditional on the record not already being CANCELLED; the cancellation
//! write is unconditional. That conditional-write discipline is the whole
//! concurrency story: no other locking is involved.

use crate::context::ExecutionContext;
use crate::error::StoreError;
use crate::execution::{Execution, ExecutionStatus};
use crate::graph::WorkflowGraph;
use amber_relay_core::{EventId, ExecutionId, UserId, WorkflowId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// The outcome of a guarded terminal write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalWrite {
    /// The record transitioned to the requested terminal state.
    Applied,
    /// The record was already CANCELLED; the write was dropped.
    SupersededByCancellation,
}

/// Persistence for execution records.
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Inserts a new RUNNING record.
    async fn create(&self, execution: Execution) -> Result<(), StoreError>;

    /// Fetches a record by ID.
    async fn get(&self, execution_id: ExecutionId) -> Result<Option<Execution>, StoreError>;

    /// Fetches the record created for a triggering event.
    async fn find_by_event(
        &self,
        workflow_id: WorkflowId,
        event_id: EventId,
    ) -> Result<Option<Execution>, StoreError>;

    /// Marks a record SUCCESS with its final context, unless it was
    /// cancelled in the meantime.
    async fn mark_succeeded(
        &self,
        execution_id: ExecutionId,
        output: ExecutionContext,
    ) -> Result<TerminalWrite, StoreError>;

    /// Marks a record FAILED with the failure message, unless it was
    /// cancelled in the meantime.
    async fn mark_failed(
        &self,
        execution_id: ExecutionId,
        error: String,
        error_detail: Option<String>,
    ) -> Result<TerminalWrite, StoreError>;

    /// Marks a record CANCELLED. Unconditional: cancellation wins every
    /// race with the other terminal writers.
    async fn mark_cancelled(&self, execution_id: ExecutionId) -> Result<(), StoreError>;

    /// Crash-recovery hook: closes the record for a triggering event as
    /// FAILED if it is still RUNNING. Same not-cancelled guard as
    /// [`Self::mark_failed`].
    async fn fail_running_by_event(
        &self,
        workflow_id: WorkflowId,
        event_id: EventId,
        error: String,
    ) -> Result<TerminalWrite, StoreError>;
}

/// Read access to stored workflow graphs.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Loads the graph for a workflow.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::WorkflowNotFound`] for an unknown workflow.
    async fn load_graph(&self, workflow_id: WorkflowId) -> Result<WorkflowGraph, StoreError>;

    /// Resolves the owner of a workflow, for credential scoping.
    async fn load_owner(&self, workflow_id: WorkflowId) -> Result<UserId, StoreError>;
}

/// In-memory execution store for tests and the demo engine.
#[derive(Clone, Default)]
pub struct InMemoryExecutionStore {
    executions: Arc<Mutex<HashMap<ExecutionId, Execution>>>,
}

impl InMemoryExecutionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionStore for InMemoryExecutionStore {
    async fn create(&self, execution: Execution) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().expect("store lock");
        executions.insert(execution.id, execution);
        Ok(())
    }

    async fn get(&self, execution_id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        let executions = self.executions.lock().expect("store lock");
        Ok(executions.get(&execution_id).cloned())
    }

    async fn find_by_event(
        &self,
        workflow_id: WorkflowId,
        event_id: EventId,
    ) -> Result<Option<Execution>, StoreError> {
        let executions = self.executions.lock().expect("store lock");
        Ok(executions
            .values()
            .find(|execution| {
                execution.workflow_id == workflow_id && execution.event_id == event_id
            })
            .cloned())
    }

    async fn mark_succeeded(
        &self,
        execution_id: ExecutionId,
        output: ExecutionContext,
    ) -> Result<TerminalWrite, StoreError> {
        let mut executions = self.executions.lock().expect("store lock");
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound { execution_id })?;

        if execution.status == ExecutionStatus::Cancelled {
            return Ok(TerminalWrite::SupersededByCancellation);
        }
        execution.complete(output);
        Ok(TerminalWrite::Applied)
    }

    async fn mark_failed(
        &self,
        execution_id: ExecutionId,
        error: String,
        error_detail: Option<String>,
    ) -> Result<TerminalWrite, StoreError> {
        let mut executions = self.executions.lock().expect("store lock");
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound { execution_id })?;

        if execution.status == ExecutionStatus::Cancelled {
            return Ok(TerminalWrite::SupersededByCancellation);
        }
        execution.fail(error, error_detail);
        Ok(TerminalWrite::Applied)
    }

    async fn mark_cancelled(&self, execution_id: ExecutionId) -> Result<(), StoreError> {
        let mut executions = self.executions.lock().expect("store lock");
        let execution = executions
            .get_mut(&execution_id)
            .ok_or(StoreError::ExecutionNotFound { execution_id })?;
        execution.cancel();
        Ok(())
    }

    async fn fail_running_by_event(
        &self,
        workflow_id: WorkflowId,
        event_id: EventId,
        error: String,
    ) -> Result<TerminalWrite, StoreError> {
        let mut executions = self.executions.lock().expect("store lock");
        let Some(execution) = executions.values_mut().find(|execution| {
            execution.workflow_id == workflow_id && execution.event_id == event_id
        }) else {
            return Ok(TerminalWrite::Applied);
        };

        match execution.status {
            ExecutionStatus::Cancelled => Ok(TerminalWrite::SupersededByCancellation),
            ExecutionStatus::Running => {
                execution.fail(error, None);
                Ok(TerminalWrite::Applied)
            }
            _ => Ok(TerminalWrite::Applied),
        }
    }
}

/// In-memory graph store for tests and the demo engine.
#[derive(Clone, Default)]
pub struct InMemoryGraphStore {
    graphs: Arc<Mutex<HashMap<WorkflowId, (WorkflowGraph, UserId)>>>,
}

impl InMemoryGraphStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a graph with its owner.
    pub fn insert(&self, workflow_id: WorkflowId, graph: WorkflowGraph, owner: UserId) {
        let mut graphs = self.graphs.lock().expect("store lock");
        graphs.insert(workflow_id, (graph, owner));
    }
}

#[async_trait]
impl GraphStore for InMemoryGraphStore {
    async fn load_graph(&self, workflow_id: WorkflowId) -> Result<WorkflowGraph, StoreError> {
        let graphs = self.graphs.lock().expect("store lock");
        graphs
            .get(&workflow_id)
            .map(|(graph, _)| graph.clone())
            .ok_or(StoreError::WorkflowNotFound)
    }

    async fn load_owner(&self, workflow_id: WorkflowId) -> Result<UserId, StoreError> {
        let graphs = self.graphs.lock().expect("store lock");
        graphs
            .get(&workflow_id)
            .map(|(_, owner)| *owner)
            .ok_or(StoreError::WorkflowNotFound)
    }
}
