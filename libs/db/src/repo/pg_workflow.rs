//! PostgreSQL implementation of WorkflowRepository

use async_trait::async_trait;
use sqlx::PgPool;

use axon_domain::{UserId, Workflow, WorkflowId, WorkflowStatus};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;
use crate::repo::traits::WorkflowRepository;

/// PostgreSQL workflow repository
pub struct PgWorkflowRepository {
    pool: PgPool,
}

impl PgWorkflowRepository {
    /// Create a new repository over the given pool
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkflowRepository for PgWorkflowRepository {
    async fn create(&self, workflow: &Workflow) -> Result<(), CreateWorkflowError> {
        // Slug uniqueness applies only to live (draft/active) workflows so a
        // reinstall after uninstall-archive can reuse the manifest slug.
        let existing = sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM workflows
            WHERE user_id = $1 AND slug = $2 AND workflow_status IN ('draft', 'active')
            "#,
        )
        .bind(workflow.user_id.to_string())
        .bind(&workflow.slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(CreateWorkflowError::Database)?;

        if existing.is_some() {
            return Err(CreateWorkflowError::SlugExists(workflow.slug.clone()));
        }

        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, user_id, slug, name, description, definition, trigger_type,
                 trigger_config, workflow_status, environment_variables,
                 execution_count, success_count, failure_count, last_executed_at,
                 last_execution_status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17)
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(workflow.user_id.to_string())
        .bind(&workflow.slug)
        .bind(&workflow.name)
        .bind(&workflow.description)
        .bind(serde_json::to_value(&workflow.definition).unwrap_or_default())
        .bind(enum_str(&workflow.trigger_type))
        .bind(serde_json::Value::Object(workflow.trigger_config.clone()))
        .bind(enum_str(&workflow.workflow_status))
        .bind(serde_json::Value::Object(
            workflow.environment_variables.clone(),
        ))
        .bind(workflow.execution_count)
        .bind(workflow.success_count)
        .bind(workflow.failure_count)
        .bind(workflow.last_executed_at)
        .bind(&workflow.last_execution_status)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await
        .map_err(CreateWorkflowError::Database)?;

        Ok(())
    }

    async fn find(&self, id: &WorkflowId) -> Result<Option<Workflow>, FindWorkflowError> {
        let row = sqlx::query_as::<_, WorkflowRow>("SELECT * FROM workflows WHERE id = $1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(FindWorkflowError::Database)?;

        row.map(|r| Workflow::try_from(r).map_err(FindWorkflowError::Corrupt))
            .transpose()
    }

    async fn find_by_slug(
        &self,
        user_id: &UserId,
        slug: &str,
    ) -> Result<Option<Workflow>, FindWorkflowError> {
        let row = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT * FROM workflows
            WHERE user_id = $1 AND slug = $2 AND workflow_status IN ('draft', 'active')
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.to_string())
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(FindWorkflowError::Database)?;

        row.map(|r| Workflow::try_from(r).map_err(FindWorkflowError::Corrupt))
            .transpose()
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        pagination: &Pagination,
    ) -> Result<Page<Workflow>, ListWorkflowsError> {
        let total = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM workflows WHERE user_id = $1 AND workflow_status != 'deleted'",
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(ListWorkflowsError::Database)?;

        let rows = sqlx::query_as::<_, WorkflowRow>(
            r#"
            SELECT * FROM workflows
            WHERE user_id = $1 AND workflow_status != 'deleted'
            ORDER BY created_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id.to_string())
        .bind(pagination.offset)
        .bind(pagination.clamped_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(ListWorkflowsError::Database)?;

        let items = rows
            .into_iter()
            .map(|r| Workflow::try_from(r).map_err(ListWorkflowsError::Corrupt))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total, pagination))
    }

    async fn update_status(
        &self,
        id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<(), UpdateWorkflowError> {
        let result = sqlx::query(
            "UPDATE workflows SET workflow_status = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id.to_string())
        .bind(enum_str(&status))
        .execute(&self.pool)
        .await
        .map_err(UpdateWorkflowError::Database)?;

        if result.rows_affected() == 0 {
            return Err(UpdateWorkflowError::NotFound(*id));
        }

        Ok(())
    }

    async fn record_execution(&self, id: &WorkflowId) -> Result<(), UpdateWorkflowError> {
        let result = sqlx::query(
            r#"
            UPDATE workflows
            SET execution_count = execution_count + 1, last_executed_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(UpdateWorkflowError::Database)?;

        if result.rows_affected() == 0 {
            return Err(UpdateWorkflowError::NotFound(*id));
        }

        Ok(())
    }

    async fn record_outcome(
        &self,
        id: &WorkflowId,
        success: bool,
    ) -> Result<(), UpdateWorkflowError> {
        let query = if success {
            r#"
            UPDATE workflows
            SET success_count = success_count + 1, last_execution_status = 'completed'
            WHERE id = $1
            "#
        } else {
            r#"
            UPDATE workflows
            SET failure_count = failure_count + 1, last_execution_status = 'failed'
            WHERE id = $1
            "#
        };

        let result = sqlx::query(query)
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(UpdateWorkflowError::Database)?;

        if result.rows_affected() == 0 {
            return Err(UpdateWorkflowError::NotFound(*id));
        }

        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> Result<bool, DeleteWorkflowError> {
        let result = sqlx::query("DELETE FROM workflows WHERE id = $1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(DeleteWorkflowError::Database)?;

        Ok(result.rows_affected() > 0)
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
struct WorkflowRow {
    id: String,
    user_id: String,
    slug: String,
    name: String,
    description: Option<String>,
    definition: serde_json::Value,
    trigger_type: String,
    trigger_config: serde_json::Value,
    workflow_status: String,
    environment_variables: serde_json::Value,
    execution_count: i64,
    success_count: i64,
    failure_count: i64,
    last_executed_at: Option<chrono::DateTime<chrono::Utc>>,
    last_execution_status: Option<String>,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = String;

    fn try_from(r: WorkflowRow) -> Result<Self, Self::Error> {
        let as_map = |v: serde_json::Value, field: &str| match v {
            serde_json::Value::Object(map) => Ok(map),
            other => Err(format!("{field} is not an object: {other}")),
        };

        Ok(Self {
            id: r.id.parse().map_err(|e| format!("id: {e}"))?,
            user_id: r.user_id.parse().map_err(|e| format!("user_id: {e}"))?,
            slug: r.slug,
            name: r.name,
            description: r.description,
            definition: serde_json::from_value(r.definition)
                .map_err(|e| format!("definition: {e}"))?,
            trigger_type: serde_json::from_value(serde_json::Value::String(r.trigger_type))
                .map_err(|e| format!("trigger_type: {e}"))?,
            trigger_config: as_map(r.trigger_config, "trigger_config")?,
            workflow_status: serde_json::from_value(serde_json::Value::String(r.workflow_status))
                .map_err(|e| format!("workflow_status: {e}"))?,
            environment_variables: as_map(r.environment_variables, "environment_variables")?,
            execution_count: r.execution_count,
            success_count: r.success_count,
            failure_count: r.failure_count,
            last_executed_at: r.last_executed_at,
            last_execution_status: r.last_execution_status,
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}
