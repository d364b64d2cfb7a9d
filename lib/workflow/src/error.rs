//! Error types for workflow construction and execution.

use crate::node::{NodeId, NodeType};
use amber_relay_core::ExecutionId;

/// Errors that can occur during graph operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    /// The graph contains a cycle and cannot be executed.
    CycleDetected,
    /// A referenced node doesn't exist in the graph.
    NodeNotFound { node_id: NodeId },
    /// The workflow was not found in storage.
    WorkflowNotFound,
}

impl std::fmt::Display for GraphError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CycleDetected => write!(f, "workflow graph contains a cycle"),
            Self::NodeNotFound { node_id } => write!(f, "node not found: {node_id}"),
            Self::WorkflowNotFound => write!(f, "workflow not found"),
        }
    }
}

impl std::error::Error for GraphError {}

/// Errors produced while rendering `{{path}}` templates against the
/// execution context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateError {
    /// The template source failed to parse.
    Parse { detail: String },
    /// Rendering failed against the supplied context.
    Render { detail: String },
}

impl std::fmt::Display for TemplateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Parse { detail } => write!(f, "template parse error: {detail}"),
            Self::Render { detail } => write!(f, "template render error: {detail}"),
        }
    }
}

impl std::error::Error for TemplateError {}

/// Errors that can occur while executing a single node.
#[derive(Debug)]
pub enum ExecutionError {
    /// The node's configuration is invalid. Not retriable: retrying the
    /// same configuration would fail the same way.
    Configuration { detail: String },
    /// A credential lookup or decryption failed. Not retriable.
    Credential { detail: String },
    /// No executor is registered for the node's type. Not retriable.
    UnknownNodeType { node_type: NodeType },
    /// Template rendering against the execution context failed.
    Template(TemplateError),
    /// An outbound request failed or returned a non-success status.
    Request { detail: String },
    /// The durable step boundary failed.
    Step { detail: String },
    /// The execution was cancelled while this node was pending.
    Cancelled,
}

impl ExecutionError {
    /// Whether retrying the node could plausibly succeed.
    ///
    /// Configuration and credential problems are deterministic, so a retry
    /// is wasted work and should surface to the operator instead.
    #[must_use]
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Configuration { .. }
            | Self::Credential { .. }
            | Self::UnknownNodeType { .. }
            | Self::Template(_)
            | Self::Cancelled => false,
            Self::Request { .. } | Self::Step { .. } => true,
        }
    }
}

impl std::fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Configuration { detail } => write!(f, "invalid node configuration: {detail}"),
            Self::Credential { detail } => write!(f, "credential error: {detail}"),
            Self::UnknownNodeType { node_type } => {
                write!(f, "no executor registered for node type: {node_type}")
            }
            Self::Template(err) => write!(f, "{err}"),
            Self::Request { detail } => write!(f, "request failed: {detail}"),
            Self::Step { detail } => write!(f, "step failed: {detail}"),
            Self::Cancelled => write!(f, "execution cancelled"),
        }
    }
}

impl std::error::Error for ExecutionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Template(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TemplateError> for ExecutionError {
    fn from(err: TemplateError) -> Self {
        Self::Template(err)
    }
}

impl From<reqwest::Error> for ExecutionError {
    fn from(err: reqwest::Error) -> Self {
        Self::Request {
            detail: err.to_string(),
        }
    }
}

/// Errors from the execution record store.
#[derive(Debug)]
pub enum StoreError {
    /// The execution record was not found.
    ExecutionNotFound { execution_id: ExecutionId },
    /// The workflow graph was not found.
    WorkflowNotFound,
    /// The storage backend failed.
    Backend { detail: String },
}

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ExecutionNotFound { execution_id } => {
                write!(f, "execution not found: {execution_id}")
            }
            Self::WorkflowNotFound => write!(f, "workflow not found"),
            Self::Backend { detail } => write!(f, "storage backend error: {detail}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from publishing status updates.
#[derive(Debug)]
pub enum StatusError {
    /// The transport rejected or dropped the publish.
    Publish { detail: String },
}

impl std::fmt::Display for StatusError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Publish { detail } => write!(f, "status publish failed: {detail}"),
        }
    }
}

impl std::error::Error for StatusError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_retriable() {
        let err = ExecutionError::Configuration {
            detail: "missing endpoint".to_string(),
        };
        assert!(!err.is_retriable());
    }

    #[test]
    fn request_errors_are_retriable() {
        let err = ExecutionError::Request {
            detail: "connection refused".to_string(),
        };
        assert!(err.is_retriable());
    }

    #[test]
    fn unknown_node_type_display_names_the_type() {
        let err = ExecutionError::UnknownNodeType {
            node_type: NodeType::HttpRequest,
        };
        assert!(err.to_string().contains("http_request"));
    }
}
