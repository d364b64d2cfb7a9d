//! NATS transport.
//!
//! Engine events (execute/cancel) and realtime status updates both ride
//! NATS. Status updates go out on a per-workflow subject with one topic
//! segment per kind, so a watcher subscribes to
//! `workflow.status.<workflow_id>.>` and sees both topics for one run.

use crate::error::StatusError;
use crate::event::{CancelWorkflowEvent, ExecuteWorkflowEvent};
use crate::status::{NodeStatusUpdate, StatusSink, WorkflowStatusUpdate};
use amber_relay_core::WorkflowId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// NATS connection and subject configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NatsConfig {
    /// Server URL.
    #[serde(default = "NatsConfig::default_url")]
    pub url: String,
    /// Subject the engine listens on for execute events.
    #[serde(default = "NatsConfig::default_execute_subject")]
    pub execute_subject: String,
    /// Subject the engine listens on for cancel events.
    #[serde(default = "NatsConfig::default_cancel_subject")]
    pub cancel_subject: String,
    /// Prefix for per-workflow status subjects.
    #[serde(default = "NatsConfig::default_status_prefix")]
    pub status_prefix: String,
}

impl NatsConfig {
    fn default_url() -> String {
        "nats://localhost:4222".to_string()
    }

    fn default_execute_subject() -> String {
        "workflow.execute".to_string()
    }

    fn default_cancel_subject() -> String {
        "workflow.cancel".to_string()
    }

    fn default_status_prefix() -> String {
        "workflow.status".to_string()
    }

    /// Subject for per-node status updates of one workflow.
    #[must_use]
    pub fn node_status_subject(&self, workflow_id: WorkflowId) -> String {
        format!("{}.{}.nodestatus", self.status_prefix, workflow_id.as_ulid())
    }

    /// Subject for whole-run status updates of one workflow.
    #[must_use]
    pub fn workflow_status_subject(&self, workflow_id: WorkflowId) -> String {
        format!(
            "{}.{}.workflowstatus",
            self.status_prefix,
            workflow_id.as_ulid()
        )
    }

    /// Wildcard subject covering both topics of one workflow.
    #[must_use]
    pub fn status_wildcard(&self, workflow_id: WorkflowId) -> String {
        format!("{}.{}.>", self.status_prefix, workflow_id.as_ulid())
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: Self::default_url(),
            execute_subject: Self::default_execute_subject(),
            cancel_subject: Self::default_cancel_subject(),
            status_prefix: Self::default_status_prefix(),
        }
    }
}

/// NATS-backed event bus and status sink.
#[derive(Clone)]
pub struct NatsTransport {
    client: async_nats::Client,
    config: NatsConfig,
}

impl NatsTransport {
    /// Connects to the configured server.
    ///
    /// # Errors
    ///
    /// Fails if the server is unreachable.
    pub async fn connect(config: NatsConfig) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(&config.url).await?;
        Ok(Self { client, config })
    }

    /// Wraps an existing client, for tests against a shared server.
    #[must_use]
    pub fn with_client(client: async_nats::Client, config: NatsConfig) -> Self {
        Self { client, config }
    }

    /// Publishes an execute event to the engine.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the publish fails.
    pub async fn publish_execute(&self, event: &ExecuteWorkflowEvent) -> Result<(), StatusError> {
        self.publish_json(&self.config.execute_subject, event).await
    }

    /// Publishes a cancel event to the engine.
    ///
    /// # Errors
    ///
    /// Fails if serialization or the publish fails.
    pub async fn publish_cancel(&self, event: &CancelWorkflowEvent) -> Result<(), StatusError> {
        self.publish_json(&self.config.cancel_subject, event).await
    }

    /// Subscribes to inbound execute events.
    ///
    /// # Errors
    ///
    /// Fails if the subscription cannot be established.
    pub async fn subscribe_execute(
        &self,
    ) -> Result<async_nats::Subscriber, async_nats::SubscribeError> {
        self.client
            .subscribe(self.config.execute_subject.clone())
            .await
    }

    /// Subscribes to inbound cancel events.
    ///
    /// # Errors
    ///
    /// Fails if the subscription cannot be established.
    pub async fn subscribe_cancel(
        &self,
    ) -> Result<async_nats::Subscriber, async_nats::SubscribeError> {
        self.client
            .subscribe(self.config.cancel_subject.clone())
            .await
    }

    /// Subscribes to both status topics of one workflow.
    ///
    /// # Errors
    ///
    /// Fails if the subscription cannot be established.
    pub async fn subscribe_status(
        &self,
        workflow_id: WorkflowId,
    ) -> Result<async_nats::Subscriber, async_nats::SubscribeError> {
        self.client
            .subscribe(self.config.status_wildcard(workflow_id))
            .await
    }

    async fn publish_json<T: Serialize>(
        &self,
        subject: &str,
        value: &T,
    ) -> Result<(), StatusError> {
        let payload = serde_json::to_vec(value).map_err(|err| StatusError::Publish {
            detail: err.to_string(),
        })?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|err| StatusError::Publish {
                detail: err.to_string(),
            })
    }
}

#[async_trait]
impl StatusSink for NatsTransport {
    // Fire-and-forget: a lost status update is tolerable, the terminal
    // state also lands in storage.
    async fn publish_node_status(&self, update: NodeStatusUpdate) {
        let subject = self.config.node_status_subject(update.workflow_id);
        if let Err(err) = self.publish_json(&subject, &update).await {
            warn!(%subject, error = %err, "node status publish dropped");
        }
    }

    async fn publish_workflow_status(&self, update: WorkflowStatusUpdate) {
        let subject = self.config.workflow_status_subject(update.workflow_id);
        if let Err(err) = self.publish_json(&subject, &update).await {
            warn!(%subject, error = %err, "workflow status publish dropped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_subjects() {
        let config = NatsConfig::default();
        assert_eq!(config.execute_subject, "workflow.execute");
        assert_eq!(config.cancel_subject, "workflow.cancel");
    }

    #[test]
    fn status_subjects_are_scoped_per_workflow() {
        let config = NatsConfig::default();
        let workflow_id = WorkflowId::new();

        let node = config.node_status_subject(workflow_id);
        let workflow = config.workflow_status_subject(workflow_id);
        assert!(node.starts_with("workflow.status."));
        assert!(node.ends_with(".nodestatus"));
        assert!(workflow.ends_with(".workflowstatus"));
        assert_ne!(node, config.node_status_subject(WorkflowId::new()));
    }

    #[test]
    fn wildcard_covers_both_topics() {
        let config = NatsConfig::default();
        let workflow_id = WorkflowId::new();
        let wildcard = config.status_wildcard(workflow_id);
        assert!(wildcard.ends_with(".>"));
        let base = wildcard.trim_end_matches('>');
        assert!(config.node_status_subject(workflow_id).starts_with(base));
        assert!(
            config
                .workflow_status_subject(workflow_id)
                .starts_with(base)
        );
    }
}
