//! Inbound engine events.
//!
//! Events arrive as JSON on the transport. `workflowId` is mandatory for
//! both event kinds; a payload without it is a configuration failure, not
//! something to retry.

use crate::error::ExecutionError;
use amber_relay_core::{EventId, ExecutionId, WorkflowId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Requests a workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteWorkflowEvent {
    pub workflow_id: WorkflowId,
    /// Identifies this triggering event; the execution record is keyed by
    /// `(workflow_id, event_id)` so the crash hook can find it. Assigned
    /// by the publisher, generated when absent.
    #[serde(default = "EventId::new")]
    pub event_id: EventId,
    /// Seed context for the run (form answers, webhook payload, manual
    /// input). Absent or non-object seeds an empty context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_data: Option<Value>,
}

impl ExecuteWorkflowEvent {
    /// Parses an execute event from its wire form.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when the payload is malformed or
    /// `workflowId` is missing.
    pub fn from_json(payload: &[u8]) -> Result<Self, ExecutionError> {
        serde_json::from_slice(payload).map_err(|err| ExecutionError::Configuration {
            detail: format!("invalid execute event: {err}"),
        })
    }
}

/// Requests cancellation of a run.
///
/// `execution_id` pins the exact run to cancel. When absent, every
/// registered run of the workflow is cancelled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelWorkflowEvent {
    pub workflow_id: WorkflowId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<ExecutionId>,
}

impl CancelWorkflowEvent {
    /// Parses a cancel event from its wire form.
    ///
    /// # Errors
    ///
    /// Fails with a configuration error when the payload is malformed or
    /// `workflowId` is missing.
    pub fn from_json(payload: &[u8]) -> Result<Self, ExecutionError> {
        serde_json::from_slice(payload).map_err(|err| ExecutionError::Configuration {
            detail: format!("invalid cancel event: {err}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn execute_event_requires_workflow_id() {
        let result = ExecuteWorkflowEvent::from_json(br#"{"initialData": {}}"#);
        assert!(matches!(result, Err(ExecutionError::Configuration { .. })));
    }

    #[test]
    fn execute_event_parses_with_seed_data() {
        let workflow_id = WorkflowId::new();
        let payload = format!(
            r#"{{"workflowId": "{}", "initialData": {{"input": "hi"}}}}"#,
            workflow_id.as_ulid()
        );
        let event = ExecuteWorkflowEvent::from_json(payload.as_bytes()).unwrap();
        assert_eq!(event.workflow_id, workflow_id);
        assert!(event.initial_data.is_some());
    }

    #[test]
    fn execute_event_generates_event_id_when_absent() {
        let workflow_id = WorkflowId::new();
        let payload = format!(r#"{{"workflowId": "{}"}}"#, workflow_id.as_ulid());
        let first = ExecuteWorkflowEvent::from_json(payload.as_bytes()).unwrap();
        let second = ExecuteWorkflowEvent::from_json(payload.as_bytes()).unwrap();
        assert_ne!(first.event_id, second.event_id);
    }

    #[test]
    fn cancel_event_execution_id_is_optional() {
        let workflow_id = WorkflowId::new();
        let payload = format!(r#"{{"workflowId": "{}"}}"#, workflow_id.as_ulid());
        let event = CancelWorkflowEvent::from_json(payload.as_bytes()).unwrap();
        assert!(event.execution_id.is_none());
    }

    #[test]
    fn execute_event_wire_form_roundtrips() {
        let event = ExecuteWorkflowEvent {
            workflow_id: WorkflowId::new(),
            event_id: EventId::new(),
            initial_data: Some(serde_json::json!({"input": "hi"})),
        };
        let bytes = serde_json::to_vec(&event).unwrap();
        let parsed = ExecuteWorkflowEvent::from_json(&bytes).unwrap();
        assert_eq!(event, parsed);
    }
}
