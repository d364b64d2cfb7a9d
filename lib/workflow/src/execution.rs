//! Persisted execution records.

use crate::context::ExecutionContext;
use amber_relay_core::{EventId, ExecutionId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of an execution record.
///
/// RUNNING admits exactly one transition, to one of the three terminal
/// states. CANCELLED wins every race: a record that reached CANCELLED is
/// never rewritten by a late success or failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Running,
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    /// Returns the stable string tag used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "RUNNING",
            Self::Success => "SUCCESS",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Parses a storage tag.
    #[must_use]
    pub fn from_str_tag(tag: &str) -> Option<Self> {
        match tag {
            "RUNNING" => Some(Self::Running),
            "SUCCESS" => Some(Self::Success),
            "FAILED" => Some(Self::Failed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether this status admits no further transitions.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One run of a workflow, created RUNNING when the run starts and closed
/// exactly once by whichever terminal writer gets there first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    /// The triggering event, used to correlate the crash-recovery hook
    /// with the record it must close.
    pub event_id: EventId,
    pub status: ExecutionStatus,
    /// The final accumulated context, set on success.
    pub output: Option<ExecutionContext>,
    /// The failure message, set on failure.
    pub error: Option<String>,
    /// The failure detail chain, set on failure.
    pub error_detail: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Execution {
    /// Creates a new RUNNING execution for a triggering event.
    #[must_use]
    pub fn start(workflow_id: WorkflowId, event_id: EventId) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            event_id,
            status: ExecutionStatus::Running,
            output: None,
            error: None,
            error_detail: None,
            started_at: Utc::now(),
            completed_at: None,
        }
    }

    /// Closes the record as SUCCESS with the final context.
    pub fn complete(&mut self, output: ExecutionContext) {
        self.status = ExecutionStatus::Success;
        self.output = Some(output);
        self.completed_at = Some(Utc::now());
    }

    /// Closes the record as FAILED with the failure message.
    pub fn fail(&mut self, error: impl Into<String>, detail: Option<String>) {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self.error_detail = detail;
        self.completed_at = Some(Utc::now());
    }

    /// Closes the record as CANCELLED.
    pub fn cancel(&mut self) {
        self.status = ExecutionStatus::Cancelled;
        self.completed_at = Some(Utc::now());
    }
}
