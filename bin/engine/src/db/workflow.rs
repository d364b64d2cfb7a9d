//! Postgres workflow graph store.
//!
//! Graphs are stored as a JSONB snapshot of the node list plus edge
//! triples, the same shape the editor saves. The engine only reads them.

use amber_relay_core::{UserId, WorkflowId};
use amber_relay_workflow::{GraphStore, StoreError, WorkflowGraph};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

use super::backend;

/// Repository for workflow definitions.
pub struct PostgresGraphStore {
    pool: PgPool,
}

impl PostgresGraphStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct WorkflowRow {
    user_id: String,
    graph: serde_json::Value,
}

#[async_trait]
impl GraphStore for PostgresGraphStore {
    async fn load_graph(&self, workflow_id: WorkflowId) -> Result<WorkflowGraph, StoreError> {
        let row: Option<WorkflowRow> =
            sqlx::query_as("SELECT user_id, graph FROM workflows WHERE id = $1")
                .bind(workflow_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        let row = row.ok_or(StoreError::WorkflowNotFound)?;
        let mut graph: WorkflowGraph =
            serde_json::from_value(row.graph).map_err(|e| StoreError::Backend {
                detail: format!("invalid graph snapshot for {workflow_id}: {e}"),
            })?;
        graph.rebuild_index_map();
        Ok(graph)
    }

    async fn load_owner(&self, workflow_id: WorkflowId) -> Result<UserId, StoreError> {
        let row: Option<WorkflowRow> =
            sqlx::query_as("SELECT user_id, graph FROM workflows WHERE id = $1")
                .bind(workflow_id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(backend)?;

        let row = row.ok_or(StoreError::WorkflowNotFound)?;
        UserId::from_str(&row.user_id).map_err(|e| StoreError::Backend {
            detail: format!("invalid owner id '{}': {e}", row.user_id),
        })
    }
}
