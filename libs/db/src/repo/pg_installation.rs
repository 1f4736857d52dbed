//! PostgreSQL implementation of InstallationRepository

use async_trait::async_trait;
use sqlx::PgPool;

use axon_domain::{InstallationId, InstallationStatus, SkillInstallation, UserId};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;
use crate::repo::traits::InstallationRepository;

/// PostgreSQL skill installation repository
pub struct PgInstallationRepository {
    pool: PgPool,
}

impl PgInstallationRepository {
    /// Create a new repository over the given pool
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl InstallationRepository for PgInstallationRepository {
    async fn create(
        &self,
        installation: &SkillInstallation,
    ) -> Result<(), CreateInstallationError> {
        if installation.installation_status == InstallationStatus::Installed {
            let existing = sqlx::query_scalar::<_, String>(
                r#"
                SELECT id FROM skill_installations
                WHERE user_id = $1 AND package_id = $2 AND installation_status = 'installed'
                "#,
            )
            .bind(installation.user_id.to_string())
            .bind(&installation.package_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(CreateInstallationError::Database)?;

            if existing.is_some() {
                return Err(CreateInstallationError::AlreadyInstalled {
                    user_id: installation.user_id,
                    package_id: installation.package_id.clone(),
                });
            }
        }

        sqlx::query(
            r#"
            INSERT INTO skill_installations
                (id, user_id, package_id, workflow_id, adapter_id,
                 installation_status, manifest, installed_at, uninstalled_at,
                 error_message)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(installation.id.to_string())
        .bind(installation.user_id.to_string())
        .bind(&installation.package_id)
        .bind(installation.workflow_id.map(|id| id.to_string()))
        .bind(&installation.adapter_id)
        .bind(installation.installation_status.to_string())
        .bind(&installation.manifest)
        .bind(installation.installed_at)
        .bind(installation.uninstalled_at)
        .bind(&installation.error_message)
        .execute(&self.pool)
        .await
        .map_err(CreateInstallationError::Database)?;

        Ok(())
    }

    async fn find_installed(
        &self,
        user_id: &UserId,
        package_id: &str,
    ) -> Result<Option<SkillInstallation>, FindInstallationError> {
        let row = sqlx::query_as::<_, InstallationRow>(
            r#"
            SELECT * FROM skill_installations
            WHERE user_id = $1 AND package_id = $2 AND installation_status = 'installed'
            "#,
        )
        .bind(user_id.to_string())
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FindInstallationError::Database)?;

        row.map(|r| SkillInstallation::try_from(r).map_err(FindInstallationError::Corrupt))
            .transpose()
    }

    async fn find_any(
        &self,
        user_id: &UserId,
        package_id: &str,
    ) -> Result<Option<SkillInstallation>, FindInstallationError> {
        let row = sqlx::query_as::<_, InstallationRow>(
            r#"
            SELECT * FROM skill_installations
            WHERE user_id = $1 AND package_id = $2
            ORDER BY installed_at DESC
            LIMIT 1
            "#,
        )
        .bind(user_id.to_string())
        .bind(package_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FindInstallationError::Database)?;

        row.map(|r| SkillInstallation::try_from(r).map_err(FindInstallationError::Corrupt))
            .transpose()
    }

    async fn list_installed(
        &self,
        user_id: &UserId,
        pagination: &Pagination,
    ) -> Result<Page<SkillInstallation>, ListInstallationsError> {
        let total = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*) FROM skill_installations
            WHERE user_id = $1 AND installation_status = 'installed'
            "#,
        )
        .bind(user_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(ListInstallationsError::Database)?;

        let rows = sqlx::query_as::<_, InstallationRow>(
            r#"
            SELECT * FROM skill_installations
            WHERE user_id = $1 AND installation_status = 'installed'
            ORDER BY installed_at DESC
            OFFSET $2 LIMIT $3
            "#,
        )
        .bind(user_id.to_string())
        .bind(pagination.offset)
        .bind(pagination.clamped_limit())
        .fetch_all(&self.pool)
        .await
        .map_err(ListInstallationsError::Database)?;

        let items = rows
            .into_iter()
            .map(|r| SkillInstallation::try_from(r).map_err(ListInstallationsError::Corrupt))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page::new(items, total, pagination))
    }

    async fn mark_uninstalled(&self, id: &InstallationId) -> Result<(), UpdateInstallationError> {
        let result = sqlx::query(
            r#"
            UPDATE skill_installations
            SET installation_status = 'uninstalled', uninstalled_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await
        .map_err(UpdateInstallationError::Database)?;

        if result.rows_affected() == 0 {
            return Err(UpdateInstallationError::NotFound(*id));
        }

        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &InstallationId,
        error: &str,
    ) -> Result<(), UpdateInstallationError> {
        let result = sqlx::query(
            r#"
            UPDATE skill_installations
            SET installation_status = 'failed', error_message = $2
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(UpdateInstallationError::Database)?;

        if result.rows_affected() == 0 {
            return Err(UpdateInstallationError::NotFound(*id));
        }

        Ok(())
    }
}

// =============================================================================
// Row Types for SQLx
// =============================================================================

#[derive(sqlx::FromRow)]
struct InstallationRow {
    id: String,
    user_id: String,
    package_id: String,
    workflow_id: Option<String>,
    adapter_id: Option<String>,
    installation_status: String,
    manifest: serde_json::Value,
    installed_at: chrono::DateTime<chrono::Utc>,
    uninstalled_at: Option<chrono::DateTime<chrono::Utc>>,
    error_message: Option<String>,
}

impl TryFrom<InstallationRow> for SkillInstallation {
    type Error = String;

    fn try_from(r: InstallationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: r.id.parse().map_err(|e| format!("id: {e}"))?,
            user_id: r.user_id.parse().map_err(|e| format!("user_id: {e}"))?,
            package_id: r.package_id,
            workflow_id: r
                .workflow_id
                .map(|id| id.parse())
                .transpose()
                .map_err(|e| format!("workflow_id: {e}"))?,
            adapter_id: r.adapter_id,
            installation_status: serde_json::from_value(serde_json::Value::String(
                r.installation_status,
            ))
            .map_err(|e| format!("installation_status: {e}"))?,
            manifest: r.manifest,
            installed_at: r.installed_at,
            uninstalled_at: r.uninstalled_at,
            error_message: r.error_message,
        })
    }
}
