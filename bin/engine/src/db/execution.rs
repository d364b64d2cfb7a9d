//! Postgres execution record store.
//!
//! Terminal writes enforce the conditional-update discipline in SQL: the
//! success and failure updates carry `AND status <> 'CANCELLED'`, the
//! cancellation update is unconditional. Concurrent writers race on the
//! row itself, not on any application lock.

use amber_relay_core::{EventId, ExecutionId, WorkflowId};
use amber_relay_workflow::{
    Execution, ExecutionContext, ExecutionStatus, ExecutionStore, StoreError, TerminalWrite,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

use super::backend;

/// Repository for execution records.
pub struct PostgresExecutionStore {
    pool: PgPool,
}

impl PostgresExecutionStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(FromRow)]
struct ExecutionRow {
    id: String,
    workflow_id: String,
    event_id: String,
    status: String,
    output: Option<serde_json::Value>,
    error: Option<String>,
    error_detail: Option<String>,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
}

impl ExecutionRow {
    fn try_into_execution(self) -> Result<Execution, StoreError> {
        let id = ExecutionId::from_str(&self.id).map_err(|e| StoreError::Backend {
            detail: format!("invalid execution id '{}': {e}", self.id),
        })?;
        let workflow_id = WorkflowId::from_str(&self.workflow_id).map_err(|e| {
            StoreError::Backend {
                detail: format!("invalid workflow id '{}': {e}", self.workflow_id),
            }
        })?;
        let event_id = EventId::from_str(&self.event_id).map_err(|e| StoreError::Backend {
            detail: format!("invalid event id '{}': {e}", self.event_id),
        })?;
        let status =
            ExecutionStatus::from_str_tag(&self.status).ok_or_else(|| StoreError::Backend {
                detail: format!("invalid execution status '{}'", self.status),
            })?;
        let output = self
            .output
            .map(ExecutionContext::from_value);

        Ok(Execution {
            id,
            workflow_id,
            event_id,
            status,
            output,
            error: self.error,
            error_detail: self.error_detail,
            started_at: self.started_at,
            completed_at: self.completed_at,
        })
    }
}

const SELECT_COLUMNS: &str = "id, workflow_id, event_id, status, output, error, error_detail, \
                              started_at, completed_at";

#[async_trait]
impl ExecutionStore for PostgresExecutionStore {
    async fn create(&self, execution: Execution) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO executions
                (id, workflow_id, event_id, status, output, error, error_detail,
                 started_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.event_id.to_string())
        .bind(execution.status.as_str())
        .bind(execution.output.as_ref().map(ExecutionContext::as_value))
        .bind(&execution.error)
        .bind(&execution.error_detail)
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(())
    }

    async fn get(&self, execution_id: ExecutionId) -> Result<Option<Execution>, StoreError> {
        let row: Option<ExecutionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM executions WHERE id = $1"
        ))
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(ExecutionRow::try_into_execution).transpose()
    }

    async fn find_by_event(
        &self,
        workflow_id: WorkflowId,
        event_id: EventId,
    ) -> Result<Option<Execution>, StoreError> {
        let row: Option<ExecutionRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM executions WHERE workflow_id = $1 AND event_id = $2"
        ))
        .bind(workflow_id.to_string())
        .bind(event_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        row.map(ExecutionRow::try_into_execution).transpose()
    }

    async fn mark_succeeded(
        &self,
        execution_id: ExecutionId,
        output: ExecutionContext,
    ) -> Result<TerminalWrite, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = 'SUCCESS', output = $2, completed_at = now()
            WHERE id = $1 AND status <> 'CANCELLED'
            "#,
        )
        .bind(execution_id.to_string())
        .bind(output.as_value())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() > 0 {
            return Ok(TerminalWrite::Applied);
        }
        self.classify_skipped_write(execution_id).await
    }

    async fn mark_failed(
        &self,
        execution_id: ExecutionId,
        error: String,
        error_detail: Option<String>,
    ) -> Result<TerminalWrite, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = 'FAILED', error = $2, error_detail = $3, completed_at = now()
            WHERE id = $1 AND status <> 'CANCELLED'
            "#,
        )
        .bind(execution_id.to_string())
        .bind(&error)
        .bind(&error_detail)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() > 0 {
            return Ok(TerminalWrite::Applied);
        }
        self.classify_skipped_write(execution_id).await
    }

    async fn mark_cancelled(&self, execution_id: ExecutionId) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = 'CANCELLED', completed_at = now()
            WHERE id = $1
            "#,
        )
        .bind(execution_id.to_string())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::ExecutionNotFound { execution_id });
        }
        Ok(())
    }

    async fn fail_running_by_event(
        &self,
        workflow_id: WorkflowId,
        event_id: EventId,
        error: String,
    ) -> Result<TerminalWrite, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE executions
            SET status = 'FAILED', error = $3, completed_at = now()
            WHERE workflow_id = $1 AND event_id = $2 AND status = 'RUNNING'
            "#,
        )
        .bind(workflow_id.to_string())
        .bind(event_id.to_string())
        .bind(&error)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() > 0 {
            return Ok(TerminalWrite::Applied);
        }

        match self.find_by_event(workflow_id, event_id).await? {
            Some(execution) if execution.status == ExecutionStatus::Cancelled => {
                Ok(TerminalWrite::SupersededByCancellation)
            }
            _ => Ok(TerminalWrite::Applied),
        }
    }
}

impl PostgresExecutionStore {
    /// A guarded update that touched no rows either raced a cancellation
    /// or targeted a record that doesn't exist; tell them apart.
    async fn classify_skipped_write(
        &self,
        execution_id: ExecutionId,
    ) -> Result<TerminalWrite, StoreError> {
        match self.get(execution_id).await? {
            Some(execution) if execution.status == ExecutionStatus::Cancelled => {
                Ok(TerminalWrite::SupersededByCancellation)
            }
            Some(_) => Ok(TerminalWrite::Applied),
            None => Err(StoreError::ExecutionNotFound { execution_id }),
        }
    }
}
