//! PostgreSQL implementation of AdapterConfigRepository

use async_trait::async_trait;
use sqlx::PgPool;

use axon_domain::AdapterConfig;

use crate::repo::errors::*;
use crate::repo::traits::AdapterConfigRepository;

/// PostgreSQL adapter configuration repository
pub struct PgAdapterConfigRepository {
    pool: PgPool,
}

impl PgAdapterConfigRepository {
    /// Create a new repository over the given pool
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AdapterConfigRepository for PgAdapterConfigRepository {
    async fn upsert(&self, config: &AdapterConfig) -> Result<(), UpsertAdapterConfigError> {
        sqlx::query(
            r#"
            INSERT INTO adapter_configurations
                (adapter_id, name, adapter_type, adapter_class, version, config,
                 dependencies, description, author, tags, is_enabled, status,
                 created_at, updated_at, last_used_at, usage_count)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
            ON CONFLICT (adapter_id) DO UPDATE SET
                name = EXCLUDED.name,
                adapter_type = EXCLUDED.adapter_type,
                adapter_class = EXCLUDED.adapter_class,
                version = EXCLUDED.version,
                config = EXCLUDED.config,
                dependencies = EXCLUDED.dependencies,
                description = EXCLUDED.description,
                author = EXCLUDED.author,
                tags = EXCLUDED.tags,
                is_enabled = EXCLUDED.is_enabled,
                status = EXCLUDED.status,
                updated_at = NOW()
            "#,
        )
        .bind(&config.adapter_id)
        .bind(&config.name)
        .bind(enum_str(&config.adapter_type))
        .bind(&config.adapter_class)
        .bind(&config.version)
        .bind(serde_json::Value::Object(config.config.clone()))
        .bind(serde_json::to_value(&config.dependencies).unwrap_or_default())
        .bind(&config.description)
        .bind(&config.author)
        .bind(serde_json::to_value(&config.tags).unwrap_or_default())
        .bind(config.is_enabled)
        .bind(&config.status)
        .bind(config.created_at)
        .bind(config.updated_at)
        .bind(config.last_used_at)
        .bind(config.usage_count)
        .execute(&self.pool)
        .await
        .map_err(UpsertAdapterConfigError::Database)?;

        Ok(())
    }

    async fn find(
        &self,
        adapter_id: &str,
    ) -> Result<Option<AdapterConfig>, FindAdapterConfigError> {
        let row = sqlx::query_as::<_, AdapterConfigRow>(
            "SELECT * FROM adapter_configurations WHERE adapter_id = $1",
        )
        .bind(adapter_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(FindAdapterConfigError::Database)?;

        row.map(|r| {
            AdapterConfig::try_from(r).map_err(FindAdapterConfigError::Corrupt)
        })
        .transpose()
    }

    async fn list_enabled(&self) -> Result<Vec<AdapterConfig>, ListAdapterConfigsError> {
        let rows = sqlx::query_as::<_, AdapterConfigRow>(
            "SELECT * FROM adapter_configurations WHERE is_enabled = TRUE ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(ListAdapterConfigsError::Database)?;

        rows.into_iter()
            .map(|r| AdapterConfig::try_from(r).map_err(ListAdapterConfigsError::Corrupt))
            .collect()
    }

    async fn delete(&self, adapter_id: &str) -> Result<bool, DeleteAdapterConfigError> {
        let result = sqlx::query("DELETE FROM adapter_configurations WHERE adapter_id = $1")
            .bind(adapter_id)
            .execute(&self.pool)
            .await
            .map_err(DeleteAdapterConfigError::Database)?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_usage(&self, adapter_id: &str) -> Result<(), RecordAdapterUsageError> {
        let result = sqlx::query(
            r#"
            UPDATE adapter_configurations
            SET usage_count = usage_count + 1, last_used_at = NOW()
            WHERE adapter_id = $1
            "#,
        )
        .bind(adapter_id)
        .execute(&self.pool)
        .await
        .map_err(RecordAdapterUsageError::Database)?;

        if result.rows_affected() == 0 {
            return Err(RecordAdapterUsageError::NotFound(adapter_id.to_string()));
        }

        Ok(())
    }
}

fn enum_str<T: serde::Serialize>(value: &T) -> String {
    // Serde snake_case representation without the surrounding quotes.
    serde_json::to_value(value)
        .ok()
        .and_then(|v| v.as_str().map(ToString::to_string))
        .unwrap_or_default()
}

// =============================================================================
// Row Types for SQLx
// =============================================================================

#[derive(sqlx::FromRow)]
struct AdapterConfigRow {
    adapter_id: String,
    name: String,
    adapter_type: String,
    adapter_class: String,
    version: String,
    config: serde_json::Value,
    dependencies: Option<serde_json::Value>,
    description: Option<String>,
    author: Option<String>,
    tags: Option<serde_json::Value>,
    is_enabled: bool,
    status: String,
    created_at: chrono::DateTime<chrono::Utc>,
    updated_at: chrono::DateTime<chrono::Utc>,
    last_used_at: Option<chrono::DateTime<chrono::Utc>>,
    usage_count: i64,
}

impl TryFrom<AdapterConfigRow> for AdapterConfig {
    type Error = String;

    fn try_from(r: AdapterConfigRow) -> Result<Self, Self::Error> {
        let adapter_type = serde_json::from_value(serde_json::Value::String(r.adapter_type))
            .map_err(|e| format!("adapter_type: {e}"))?;
        let config = match r.config {
            serde_json::Value::Object(map) => map,
            other => return Err(format!("config is not an object: {other}")),
        };
        let dependencies = r
            .dependencies
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| format!("dependencies: {e}"))?
            .unwrap_or_default();
        let tags = r
            .tags
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| format!("tags: {e}"))?
            .unwrap_or_default();

        Ok(Self {
            adapter_id: r.adapter_id,
            name: r.name,
            adapter_type,
            adapter_class: r.adapter_class,
            version: r.version,
            config,
            dependencies,
            description: r.description,
            author: r.author,
            tags,
            is_enabled: r.is_enabled,
            status: r.status,
            created_at: r.created_at,
            updated_at: r.updated_at,
            last_used_at: r.last_used_at,
            usage_count: r.usage_count,
        })
    }
}
