//! The executor registry.
//!
//! Maps node type tags to executor instances. The orchestrator looks up
//! the executor for each node as it reaches it; an unregistered type fails
//! that node with [`ExecutionError::UnknownNodeType`].

use crate::error::ExecutionError;
use crate::executor::NodeExecutor;
use crate::executors::{HttpRequestExecutor, LlmExecutor, LlmProvider, TriggerExecutor};
use crate::node::NodeType;
use std::collections::HashMap;
use std::sync::Arc;

/// Registry of node executors keyed by node type.
#[derive(Default)]
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            executors: HashMap::new(),
        }
    }

    /// Creates a registry with every built-in executor registered.
    #[must_use]
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(
            NodeType::ManualTrigger,
            Arc::new(TriggerExecutor::new("manual-trigger")),
        );
        registry.register(
            NodeType::GoogleFormTrigger,
            Arc::new(TriggerExecutor::new("google-form-trigger")),
        );
        registry.register(
            NodeType::StripeTrigger,
            Arc::new(TriggerExecutor::new("stripe-trigger")),
        );
        registry.register(NodeType::HttpRequest, Arc::new(HttpRequestExecutor::new()));
        registry.register(
            NodeType::Gemini,
            Arc::new(LlmExecutor::new(LlmProvider::Gemini)),
        );
        registry.register(
            NodeType::OpenAi,
            Arc::new(LlmExecutor::new(LlmProvider::OpenAi)),
        );
        registry.register(
            NodeType::Anthropic,
            Arc::new(LlmExecutor::new(LlmProvider::Anthropic)),
        );
        registry
    }

    /// Registers an executor for a node type, replacing any existing one.
    pub fn register(&mut self, node_type: NodeType, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(node_type, executor);
    }

    /// Returns the executor for a node type.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionError::UnknownNodeType`] if no executor is
    /// registered for the type.
    pub fn executor(&self, node_type: NodeType) -> Result<Arc<dyn NodeExecutor>, ExecutionError> {
        self.executors
            .get(&node_type)
            .cloned()
            .ok_or(ExecutionError::UnknownNodeType { node_type })
    }
}
