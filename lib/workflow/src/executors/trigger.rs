//! Trigger executors.
//!
//! Triggers don't produce new data: the trigger payload (form answers,
//! webhook body, manual input) already arrived as the seed context with
//! the execute event. The executor passes the context through a named
//! step anyway so the handoff is checkpointed like every other node.

use crate::context::ExecutionContext;
use crate::error::ExecutionError;
use crate::executor::{ExecutorParams, ExecutorServices, NodeExecutor};
use crate::step::run_step;
use async_trait::async_trait;

/// Executor for trigger node types.
///
/// One instance per trigger type, differing only in the step name.
pub struct TriggerExecutor {
    step_name: &'static str,
}

impl TriggerExecutor {
    #[must_use]
    pub fn new(step_name: &'static str) -> Self {
        Self { step_name }
    }
}

#[async_trait]
impl NodeExecutor for TriggerExecutor {
    async fn execute(
        &self,
        _services: &ExecutorServices,
        params: ExecutorParams<'_>,
    ) -> Result<ExecutionContext, ExecutionError> {
        let context = params.context;
        run_step(params.step, self.step_name, async move { Ok(context) }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Node, NodeKind};
    use crate::step::RecordingStepRunner;
    use amber_relay_core::UserId;
    use amber_relay_integration::{Base64Cipher, InMemoryVault};
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn passes_seed_context_through_named_step() {
        let services = ExecutorServices::new(Arc::new(InMemoryVault::new()), Arc::new(Base64Cipher));
        let node = Node::new("Start", NodeKind::ManualTrigger);
        let step = RecordingStepRunner::new();
        let executor = TriggerExecutor::new("manual-trigger");

        let seed = ExecutionContext::from_value(json!({"input": "hello"}));
        let context = executor
            .execute(
                &services,
                ExecutorParams {
                    node: &node,
                    context: seed.clone(),
                    user_id: UserId::new(),
                    step: &step,
                },
            )
            .await
            .unwrap();

        assert_eq!(context, seed);
        assert_eq!(step.names(), vec!["manual-trigger"]);
    }
}
