//! PostgreSQL implementation of ExecutionRepository
//!
//! Terminal-status protection is enforced in SQL: every transition updates
//! only rows still in a non-terminal status and inspects `rows_affected`.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::PgPool;
use std::collections::BTreeMap;

use axon_domain::{ExecutionId, NodeResult, WorkflowExecution, WorkflowId};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;
use crate::repo::traits::ExecutionRepository;

/// PostgreSQL workflow execution repository
pub struct PgExecutionRepository {
    pool: PgPool,
}

impl PgExecutionRepository {
    /// Create a new repository over the given pool
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Distinguish "row missing" from "row already terminal" after a guarded
    /// update touched zero rows.
    async fn classify_miss(&self, id: &ExecutionId) -> UpdateExecutionError {
        let exists =
            sqlx::query_scalar::<_, String>("SELECT id FROM workflow_executions WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await;

        match exists {
            Ok(Some(_)) => UpdateExecutionError::Terminal(*id),
            Ok(None) => UpdateExecutionError::NotFound(*id),
            Err(e) => UpdateExecutionError::Database(e),
        }
    }
}

#[async_trait]
impl ExecutionRepository for PgExecutionRepository {
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), CreateExecutionError> {
        sqlx::query(
            r#"
            INSERT INTO workflow_executions
                (id, workflow_id, user_id, execution_mode, execution_status,
                 input_data, output_data, node_results, started_at, completed_at,
                 duration_ms, error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.workflow_id.to_string())
        .bind(execution.user_id.to_string())
        .bind(enum_str(&execution.execution_mode))
        .bind(enum_str(&execution.execution_status))
        .bind(&execution.input_data)
        .bind(&execution.output_data)
        .bind(serde_json::to_value(&execution.node_results).unwrap_or_default())
        .bind(execution.started_at)
        .bind(execution.completed_at)
        .bind(execution.duration_ms)
        .bind(&execution.error_message)
        .execute(&self.pool)
        .await
        .map_err(CreateExecutionError::Database)?;

        Ok(())
    }

    async fn find(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<WorkflowExecution>, FindExecutionError> {
        let row =
            sqlx::query_as::<_, ExecutionRow>("SELECT * FROM workflow_executions WHERE id = $1")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await
                .map_err(FindExecutionError::Database)?;

        row.map(|r| WorkflowExecution::try_from(r).map_err(FindExecutionError::Corrupt))
            .transpose()
    }

    async fn mark_running(&self, id: &ExecutionId) -> Result<(), UpdateExecutionError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET execution_status = 'running'
            WHERE id = $1 AND execution_status = 'pending'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(UpdateExecutionError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.classify_miss(id).await);
        }

        Ok(())
    }

    async fn complete(
        &self,
        id: &ExecutionId,
        output: Value,
        node_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), UpdateExecutionError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET execution_status = 'completed',
                output_data = $2,
                node_results = $3,
                completed_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1 AND execution_status IN ('pending', 'running')
            "#,
        )
        .bind(id.to_string())
        .bind(output)
        .bind(serde_json::to_value(node_results).unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(UpdateExecutionError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.classify_miss(id).await);
        }

        Ok(())
    }

    async fn fail(
        &self,
        id: &ExecutionId,
        error: &str,
        node_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), UpdateExecutionError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET execution_status = 'failed',
                error_message = $2,
                node_results = $3,
                completed_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1 AND execution_status IN ('pending', 'running')
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .bind(serde_json::to_value(node_results).unwrap_or_default())
        .execute(&self.pool)
        .await
        .map_err(UpdateExecutionError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.classify_miss(id).await);
        }

        Ok(())
    }

    async fn cancel(&self, id: &ExecutionId) -> Result<(), UpdateExecutionError> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_executions
            SET execution_status = 'cancelled',
                completed_at = NOW(),
                duration_ms = (EXTRACT(EPOCH FROM (NOW() - started_at)) * 1000)::BIGINT
            WHERE id = $1 AND execution_status IN ('pending', 'running')
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(UpdateExecutionError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.classify_miss(id).await);
        }

        Ok(())
    }

    async fn list_for_workflow(
        &self,
        workflow_id: &WorkflowId,
        pagination: &Pagination,
    ) -> Result<Page<WorkflowExecution>, ListExecutionsError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workflow_executions WHERE workflow_id = $1",
        )
        .bind(workflow_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(ListExecutionsError::Database)?;

        let rows = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT * FROM workflow_executions
            WHERE workflow_id = $1
            ORDER BY started_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(workflow_id.to_string())
        .bind(pagination.offset)
        .bind(pagination.clamped_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(ListExecutionsError::Database)?;

        let items = rows
            .into_iter()
            .map(|r| WorkflowExecution::try_from(r).map_err(ListExecutionsError::Corrupt))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total, pagination))
    }
}

fn enum_str<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_default()
}

// =============================================================================
// Row Types for SQLx
// =============================================================================

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    id: String,
    workflow_id: String,
    user_id: String,
    execution_mode: String,
    execution_status: String,
    input_data: serde_json::Value,
    output_data: Option<serde_json::Value>,
    node_results: serde_json::Value,
    started_at: chrono::DateTime<chrono::Utc>,
    completed_at: Option<chrono::DateTime<chrono::Utc>>,
    duration_ms: Option<i64>,
    error_message: Option<String>,
}

impl TryFrom<ExecutionRow> for WorkflowExecution {
    type Error = String;

    fn try_from(r: ExecutionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id.parse().map_err(|e| format!("id: {e}"))?,
            workflow_id: r
                .workflow_id
                .parse()
                .map_err(|e| format!("workflow_id: {e}"))?,
            user_id: r.user_id.parse().map_err(|e| format!("user_id: {e}"))?,
            execution_mode: serde_json::from_value(serde_json::Value::String(r.execution_mode))
                .map_err(|e| format!("execution_mode: {e}"))?,
            execution_status: serde_json::from_value(serde_json::Value::String(
                r.execution_status,
            ))
            .map_err(|e| format!("execution_status: {e}"))?,
            input_data: r.input_data,
            output_data: r.output_data,
            node_results: serde_json::from_value(r.node_results)
                .map_err(|e| format!("node_results: {e}"))?,
            started_at: r.started_at,
            completed_at: r.completed_at,
            duration_ms: r.duration_ms,
            error_message: r.error_message,
        })
    }
}
