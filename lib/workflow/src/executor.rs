//! The node executor contract.
//!
//! Executors are stateless: everything a node run needs arrives through
//! [`ExecutorParams`], and everything shared across runs lives in
//! [`ExecutorServices`]. An executor returns the full context for the next
//! node, not a delta.

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::node::Node;
use crate::step::StepRunner;
use crate::template::TemplateEngine;
use amber_relay_core::UserId;
use amber_relay_integration::{CredentialCipher, CredentialVault};
use async_trait::async_trait;
use std::sync::Arc;

/// Shared services available to every executor.
pub struct ExecutorServices {
    /// Credential lookup, scoped to the workflow owner at call time.
    pub vault: Arc<dyn CredentialVault>,
    /// Decrypts sealed credential secrets.
    pub cipher: Arc<dyn CredentialCipher>,
    /// Outbound HTTP client, shared so connections pool across nodes.
    pub http: reqwest::Client,
    /// Template engine for `{{path}}` resolution.
    pub templates: TemplateEngine,
}

impl ExecutorServices {
    #[must_use]
    pub fn new(vault: Arc<dyn CredentialVault>, cipher: Arc<dyn CredentialCipher>) -> Self {
        Self {
            vault,
            cipher,
            http: reqwest::Client::new(),
            templates: TemplateEngine::new(),
        }
    }
}

/// Per-node inputs to an executor.
pub struct ExecutorParams<'a> {
    /// The node being executed.
    pub node: &'a Node,
    /// The context accumulated by upstream nodes.
    pub context: ExecutionContext,
    /// The owner of the workflow, for credential scoping.
    pub user_id: UserId,
    /// Runs the executor's side effects as named steps.
    pub step: &'a dyn StepRunner,
}

/// Executes a single node kind.
///
/// Implementations validate configuration before touching the network and
/// run every side effect through `params.step`.
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Executes the node, returning the context for the next node.
    async fn execute(
        &self,
        services: &ExecutorServices,
        params: ExecutorParams<'_>,
    ) -> Result<ExecutionContext, ExecutionError>;
}

/// A scripted executor for orchestrator tests.
///
/// Returns its context unchanged with `extra` merged in, or fails with a
/// configured error.
pub struct MockExecutor {
    extra: Option<(String, serde_json::Value)>,
    fail_with: std::sync::Mutex<Option<ExecutionError>>,
    /// Invoked on every execution, before the scripted outcome. Lets a
    /// test flip a cancellation flag mid-run.
    on_execute: Option<Box<dyn Fn() + Send + Sync>>,
}

impl MockExecutor {
    /// An executor that passes the context through untouched.
    #[must_use]
    pub fn passthrough() -> Self {
        Self {
            extra: None,
            fail_with: std::sync::Mutex::new(None),
            on_execute: None,
        }
    }

    /// An executor that merges `key: value` into the context.
    #[must_use]
    pub fn producing(key: impl Into<String>, value: serde_json::Value) -> Self {
        Self {
            extra: Some((key.into(), value)),
            fail_with: std::sync::Mutex::new(None),
            on_execute: None,
        }
    }

    /// An executor that fails once with the given error.
    #[must_use]
    pub fn failing(error: ExecutionError) -> Self {
        Self {
            extra: None,
            fail_with: std::sync::Mutex::new(Some(error)),
            on_execute: None,
        }
    }

    /// Registers a hook that runs on every execution.
    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_execute = Some(Box::new(hook));
        self
    }
}

#[async_trait]
impl NodeExecutor for MockExecutor {
    async fn execute(
        &self,
        _services: &ExecutorServices,
        params: ExecutorParams<'_>,
    ) -> Result<ExecutionContext, ExecutionError> {
        if let Some(hook) = &self.on_execute {
            hook();
        }

        if let Some(error) = self.fail_with.lock().expect("mock lock").take() {
            return Err(error);
        }

        let mut context = params.context;
        if let Some((key, value)) = &self.extra {
            context.insert(key.clone(), value.clone());
        }
        Ok(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;
    use crate::step::PassthroughStepRunner;
    use amber_relay_integration::{Base64Cipher, InMemoryVault};
    use serde_json::json;

    fn services() -> ExecutorServices {
        ExecutorServices::new(Arc::new(InMemoryVault::new()), Arc::new(Base64Cipher))
    }

    #[tokio::test]
    async fn mock_merges_extra_into_context() {
        let node = Node::new("n", NodeKind::ManualTrigger);
        let executor = MockExecutor::producing("out", json!({"ok": true}));
        let step = PassthroughStepRunner;

        let context = executor
            .execute(
                &services(),
                ExecutorParams {
                    node: &node,
                    context: ExecutionContext::from_value(json!({"seed": 1})),
                    user_id: UserId::new(),
                    step: &step,
                },
            )
            .await
            .unwrap();

        assert_eq!(context.get("seed"), Some(&json!(1)));
        assert_eq!(context.get("out"), Some(&json!({"ok": true})));
    }

    #[tokio::test]
    async fn mock_fails_once_then_passes_through() {
        let node = Node::new("n", NodeKind::ManualTrigger);
        let executor = MockExecutor::failing(ExecutionError::Request {
            detail: "scripted".to_string(),
        });
        let step = PassthroughStepRunner;

        let first = executor
            .execute(
                &services(),
                ExecutorParams {
                    node: &node,
                    context: ExecutionContext::new(),
                    user_id: UserId::new(),
                    step: &step,
                },
            )
            .await;
        assert!(first.is_err());

        let second = executor
            .execute(
                &services(),
                ExecutorParams {
                    node: &node,
                    context: ExecutionContext::new(),
                    user_id: UserId::new(),
                    step: &step,
                },
            )
            .await;
        assert!(second.is_ok());
    }
}
