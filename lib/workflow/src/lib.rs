//! Workflow execution engine for amber-relay.
//!
//! Workflows are directed acyclic graphs of trigger and action nodes.
//! A run sorts the graph topologically, executes each node through the
//! executor registry while threading an accumulated JSON context through
//! the chain, publishes realtime status updates, and closes a persisted
//! execution record exactly once. Cancellation is cooperative and always
//! wins races against late success or failure writes.

pub mod cancel;
pub mod context;
pub mod edge;
pub mod error;
pub mod event;
pub mod execution;
pub mod executor;
pub mod executors;
pub mod graph;
pub mod nats;
pub mod node;
pub mod orchestrator;
pub mod registry;
pub mod sort;
pub mod status;
pub mod step;
pub mod store;
pub mod template;

pub use cancel::{CancellationHandler, CancellationRegistry};
pub use context::ExecutionContext;
pub use edge::{Edge, EdgeRef};
pub use error::{ExecutionError, GraphError, StatusError, StoreError, TemplateError};
pub use event::{CancelWorkflowEvent, ExecuteWorkflowEvent};
pub use execution::{Execution, ExecutionStatus};
pub use executor::{ExecutorParams, ExecutorServices, MockExecutor, NodeExecutor};
pub use graph::WorkflowGraph;
pub use nats::{NatsConfig, NatsTransport};
pub use node::{HttpMethod, HttpRequestConfig, LlmConfig, Node, NodeId, NodeKind, NodeType};
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use registry::ExecutorRegistry;
pub use sort::topological_sort;
pub use status::{
    InMemoryStatusSink, NodeStatus, NodeStatusUpdate, StatusSink, WorkflowStatus,
    WorkflowStatusUpdate,
};
pub use step::{PassthroughStepRunner, StepRunner, run_step};
pub use store::{
    ExecutionStore, GraphStore, InMemoryExecutionStore, InMemoryGraphStore, TerminalWrite,
};
pub use template::TemplateEngine;
