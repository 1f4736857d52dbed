//! In-memory repository implementations
//!
//! Used by the test suites and the dev profile. Each repository guards its
//! map with a `tokio::sync::RwLock` and enforces the same invariants as the
//! PostgreSQL implementations (slug uniqueness among live workflows, one
//! `installed` row per user+package, terminal executions never transition).

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use axon_domain::{
    AdapterConfig, ExecutionId, ExecutionStatus, InstallationId, InstallationStatus, NodeResult,
    SkillInstallation, UserId, Workflow, WorkflowExecution, WorkflowId, WorkflowStatus,
};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;
use crate::repo::traits::*;

fn paginate<T: Clone>(items: &[T], pagination: &Pagination) -> Page<T> {
    let total = items.len() as i64;
    let start = usize::try_from(pagination.offset.max(0)).unwrap_or(0);
    let limit = usize::try_from(pagination.clamped_limit()).unwrap_or(20);
    let page: Vec<T> = items.iter().skip(start).take(limit).cloned().collect();
    Page::new(page, total, pagination)
}

// =============================================================================
// Adapter Configurations
// =============================================================================

/// In-memory adapter configuration store
#[derive(Default)]
pub struct InMemoryAdapterConfigRepository {
    configs: RwLock<HashMap<String, AdapterConfig>>,
}

impl InMemoryAdapterConfigRepository {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AdapterConfigRepository for InMemoryAdapterConfigRepository {
    async fn upsert(&self, config: &AdapterConfig) -> Result<(), UpsertAdapterConfigError> {
        let mut configs = self.configs.write().await;
        configs.insert(config.adapter_id.clone(), config.clone());
        Ok(())
    }

    async fn find(
        &self,
        adapter_id: &str,
    ) -> Result<Option<AdapterConfig>, FindAdapterConfigError> {
        let configs = self.configs.read().await;
        Ok(configs.get(adapter_id).cloned())
    }

    async fn list_enabled(&self) -> Result<Vec<AdapterConfig>, ListAdapterConfigsError> {
        let configs = self.configs.read().await;
        let mut enabled: Vec<AdapterConfig> =
            configs.values().filter(|c| c.is_enabled).cloned().collect();
        enabled.sort_by_key(|c| c.created_at);
        Ok(enabled)
    }

    async fn delete(&self, adapter_id: &str) -> Result<bool, DeleteAdapterConfigError> {
        let mut configs = self.configs.write().await;
        Ok(configs.remove(adapter_id).is_some())
    }

    async fn record_usage(&self, adapter_id: &str) -> Result<(), RecordAdapterUsageError> {
        let mut configs = self.configs.write().await;
        let config = configs
            .get_mut(adapter_id)
            .ok_or_else(|| RecordAdapterUsageError::NotFound(adapter_id.to_string()))?;

        config.usage_count += 1;
        config.last_used_at = Some(Utc::now());
        Ok(())
    }
}

// =============================================================================
// Workflows
// =============================================================================

/// In-memory workflow store
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<WorkflowId, Workflow>>,
}

impl InMemoryWorkflowRepository {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn is_live(status: WorkflowStatus) -> bool {
    matches!(status, WorkflowStatus::Draft | WorkflowStatus::Active)
}

#[async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, workflow: &Workflow) -> Result<(), CreateWorkflowError> {
        let mut workflows = self.workflows.write().await;

        let slug_taken = workflows.values().any(|w| {
            w.user_id == workflow.user_id
                && w.slug == workflow.slug
                && is_live(w.workflow_status)
        });
        if slug_taken {
            return Err(CreateWorkflowError::SlugExists(workflow.slug.clone()));
        }

        workflows.insert(workflow.id, workflow.clone());
        Ok(())
    }

    async fn find(&self, id: &WorkflowId) -> Result<Option<Workflow>, FindWorkflowError> {
        let workflows = self.workflows.read().await;
        Ok(workflows.get(id).cloned())
    }

    async fn find_by_slug(
        &self,
        user_id: &UserId,
        slug: &str,
    ) -> Result<Option<Workflow>, FindWorkflowError> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .values()
            .filter(|w| w.user_id == *user_id && w.slug == slug && is_live(w.workflow_status))
            .max_by_key(|w| w.created_at)
            .cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &UserId,
        pagination: &Pagination,
    ) -> Result<Page<Workflow>, ListWorkflowsError> {
        let workflows = self.workflows.read().await;
        let mut owned: Vec<Workflow> = workflows
            .values()
            .filter(|w| w.user_id == *user_id && w.workflow_status != WorkflowStatus::Deleted)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(&owned, pagination))
    }

    async fn update_status(
        &self,
        id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<(), UpdateWorkflowError> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or(UpdateWorkflowError::NotFound(*id))?;
        workflow.workflow_status = status;
        workflow.touch();
        Ok(())
    }

    async fn record_execution(&self, id: &WorkflowId) -> Result<(), UpdateWorkflowError> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or(UpdateWorkflowError::NotFound(*id))?;
        workflow.execution_count += 1;
        workflow.last_executed_at = Some(Utc::now());
        Ok(())
    }

    async fn record_outcome(
        &self,
        id: &WorkflowId,
        success: bool,
    ) -> Result<(), UpdateWorkflowError> {
        let mut workflows = self.workflows.write().await;
        let workflow = workflows
            .get_mut(id)
            .ok_or(UpdateWorkflowError::NotFound(*id))?;
        if success {
            workflow.success_count += 1;
            workflow.last_execution_status = Some("completed".to_string());
        } else {
            workflow.failure_count += 1;
            workflow.last_execution_status = Some("failed".to_string());
        }
        Ok(())
    }

    async fn delete(&self, id: &WorkflowId) -> Result<bool, DeleteWorkflowError> {
        let mut workflows = self.workflows.write().await;
        Ok(workflows.remove(id).is_some())
    }
}

// =============================================================================
// Executions
// =============================================================================

/// In-memory execution store
#[derive(Default)]
pub struct InMemoryExecutionRepository {
    executions: RwLock<HashMap<ExecutionId, WorkflowExecution>>,
}

impl InMemoryExecutionRepository {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn finish(
        execution: &mut WorkflowExecution,
        status: ExecutionStatus,
        output: Option<Value>,
        error: Option<String>,
        node_results: Option<&BTreeMap<String, NodeResult>>,
    ) {
        let now = Utc::now();
        execution.execution_status = status;
        execution.completed_at = Some(now);
        execution.duration_ms = Some((now - execution.started_at).num_milliseconds());
        if let Some(output) = output {
            execution.output_data = Some(output);
        }
        if let Some(error) = error {
            execution.error_message = Some(error);
        }
        if let Some(results) = node_results {
            execution.node_results = results.clone();
        }
    }
}

#[async_trait]
impl ExecutionRepository for InMemoryExecutionRepository {
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), CreateExecutionError> {
        let mut executions = self.executions.write().await;
        executions.insert(execution.id, execution.clone());
        Ok(())
    }

    async fn find(
        &self,
        id: &ExecutionId,
    ) -> Result<Option<WorkflowExecution>, FindExecutionError> {
        let executions = self.executions.read().await;
        Ok(executions.get(id).cloned())
    }

    async fn mark_running(&self, id: &ExecutionId) -> Result<(), UpdateExecutionError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(id)
            .ok_or(UpdateExecutionError::NotFound(*id))?;
        if execution.execution_status != ExecutionStatus::Pending {
            return Err(UpdateExecutionError::Terminal(*id));
        }
        execution.execution_status = ExecutionStatus::Running;
        Ok(())
    }

    async fn complete(
        &self,
        id: &ExecutionId,
        output: Value,
        node_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), UpdateExecutionError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(id)
            .ok_or(UpdateExecutionError::NotFound(*id))?;
        if execution.is_terminal() {
            return Err(UpdateExecutionError::Terminal(*id));
        }
        Self::finish(
            execution,
            ExecutionStatus::Completed,
            Some(output),
            None,
            Some(node_results),
        );
        Ok(())
    }

    async fn fail(
        &self,
        id: &ExecutionId,
        error: &str,
        node_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), UpdateExecutionError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(id)
            .ok_or(UpdateExecutionError::NotFound(*id))?;
        if execution.is_terminal() {
            return Err(UpdateExecutionError::Terminal(*id));
        }
        Self::finish(
            execution,
            ExecutionStatus::Failed,
            None,
            Some(error.to_string()),
            Some(node_results),
        );
        Ok(())
    }

    async fn cancel(&self, id: &ExecutionId) -> Result<(), UpdateExecutionError> {
        let mut executions = self.executions.write().await;
        let execution = executions
            .get_mut(id)
            .ok_or(UpdateExecutionError::NotFound(*id))?;
        if execution.is_terminal() {
            return Err(UpdateExecutionError::Terminal(*id));
        }
        Self::finish(execution, ExecutionStatus::Cancelled, None, None, None);
        Ok(())
    }

    async fn list_for_workflow(
        &self,
        workflow_id: &WorkflowId,
        pagination: &Pagination,
    ) -> Result<Page<WorkflowExecution>, ListExecutionsError> {
        let executions = self.executions.read().await;
        let mut owned: Vec<WorkflowExecution> = executions
            .values()
            .filter(|e| e.workflow_id == *workflow_id)
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(paginate(&owned, pagination))
    }
}

// =============================================================================
// Installations
// =============================================================================

/// In-memory skill installation store
#[derive(Default)]
pub struct InMemoryInstallationRepository {
    installations: RwLock<HashMap<InstallationId, SkillInstallation>>,
}

impl InMemoryInstallationRepository {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InstallationRepository for InMemoryInstallationRepository {
    async fn create(
        &self,
        installation: &SkillInstallation,
    ) -> Result<(), CreateInstallationError> {
        let mut installations = self.installations.write().await;

        if installation.installation_status == InstallationStatus::Installed {
            let duplicate = installations.values().any(|i| {
                i.user_id == installation.user_id
                    && i.package_id == installation.package_id
                    && i.installation_status == InstallationStatus::Installed
            });
            if duplicate {
                return Err(CreateInstallationError::AlreadyInstalled {
                    user_id: installation.user_id,
                    package_id: installation.package_id.clone(),
                });
            }
        }

        installations.insert(installation.id, installation.clone());
        Ok(())
    }

    async fn find_installed(
        &self,
        user_id: &UserId,
        package_id: &str,
    ) -> Result<Option<SkillInstallation>, FindInstallationError> {
        let installations = self.installations.read().await;
        Ok(installations
            .values()
            .find(|i| {
                i.user_id == *user_id
                    && i.package_id == package_id
                    && i.installation_status == InstallationStatus::Installed
            })
            .cloned())
    }

    async fn find_any(
        &self,
        user_id: &UserId,
        package_id: &str,
    ) -> Result<Option<SkillInstallation>, FindInstallationError> {
        let installations = self.installations.read().await;
        Ok(installations
            .values()
            .filter(|i| i.user_id == *user_id && i.package_id == package_id)
            .max_by_key(|i| i.installed_at)
            .cloned())
    }

    async fn list_installed(
        &self,
        user_id: &UserId,
        pagination: &Pagination,
    ) -> Result<Page<SkillInstallation>, ListInstallationsError> {
        let installations = self.installations.read().await;
        let mut owned: Vec<SkillInstallation> = installations
            .values()
            .filter(|i| {
                i.user_id == *user_id && i.installation_status == InstallationStatus::Installed
            })
            .cloned()
            .collect();
        owned.sort_by(|a, b| b.installed_at.cmp(&a.installed_at));
        Ok(paginate(&owned, pagination))
    }

    async fn mark_uninstalled(&self, id: &InstallationId) -> Result<(), UpdateInstallationError> {
        let mut installations = self.installations.write().await;
        let installation = installations
            .get_mut(id)
            .ok_or(UpdateInstallationError::NotFound(*id))?;
        installation.installation_status = InstallationStatus::Uninstalled;
        installation.uninstalled_at = Some(Utc::now());
        Ok(())
    }

    async fn mark_failed(
        &self,
        id: &InstallationId,
        error: &str,
    ) -> Result<(), UpdateInstallationError> {
        let mut installations = self.installations.write().await;
        let installation = installations
            .get_mut(id)
            .ok_or(UpdateInstallationError::NotFound(*id))?;
        installation.installation_status = InstallationStatus::Failed;
        installation.error_message = Some(error.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::{ExecutionMode, TriggerType, WorkflowDefinition};
    use serde_json::json;

    fn sample_workflow(user_id: UserId, slug: &str) -> Workflow {
        Workflow::new(
            user_id,
            slug,
            "Test",
            WorkflowDefinition::default(),
            TriggerType::Manual,
        )
    }

    #[tokio::test]
    async fn test_slug_unique_among_live_workflows() {
        let repo = InMemoryWorkflowRepository::new();
        let user = UserId::new();

        let first = sample_workflow(user, "hello");
        repo.create(&first).await.unwrap();

        let duplicate = sample_workflow(user, "hello");
        assert!(matches!(
            repo.create(&duplicate).await,
            Err(CreateWorkflowError::SlugExists(_))
        ));

        // Archiving the first frees the slug.
        repo.update_status(&first.id, WorkflowStatus::Archived)
            .await
            .unwrap();
        repo.create(&duplicate).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminal_execution_never_transitions() {
        let repo = InMemoryExecutionRepository::new();
        let execution = WorkflowExecution::new(
            WorkflowId::new(),
            UserId::new(),
            ExecutionMode::Manual,
            json!({}),
        );
        repo.create(&execution).await.unwrap();
        repo.mark_running(&execution.id).await.unwrap();
        repo.complete(&execution.id, json!({"ok": true}), &BTreeMap::new())
            .await
            .unwrap();

        assert!(matches!(
            repo.fail(&execution.id, "late failure", &BTreeMap::new())
                .await,
            Err(UpdateExecutionError::Terminal(_))
        ));
        assert!(matches!(
            repo.cancel(&execution.id).await,
            Err(UpdateExecutionError::Terminal(_))
        ));

        let stored = repo.find(&execution.id).await.unwrap().unwrap();
        assert_eq!(stored.execution_status, ExecutionStatus::Completed);
        assert!(stored.completed_at.unwrap() >= stored.started_at);
    }

    #[tokio::test]
    async fn test_single_installed_row_per_user_and_package() {
        let repo = InMemoryInstallationRepository::new();
        let user = UserId::new();

        let first = SkillInstallation::installed(
            user,
            "skill.example.hello",
            WorkflowId::new(),
            "tool.workflow.abc123",
            json!({}),
        );
        repo.create(&first).await.unwrap();

        let second = SkillInstallation::installed(
            user,
            "skill.example.hello",
            WorkflowId::new(),
            "tool.workflow.def456",
            json!({}),
        );
        assert!(matches!(
            repo.create(&second).await,
            Err(CreateInstallationError::AlreadyInstalled { .. })
        ));

        // After uninstall, a fresh installed row is accepted.
        repo.mark_uninstalled(&first.id).await.unwrap();
        repo.create(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_record_usage_bumps_counter() {
        let repo = InMemoryAdapterConfigRepository::new();
        let config = AdapterConfig::new(
            "system.logger",
            "Logger",
            axon_domain::AdapterType::Hard,
            "LoggerAdapter",
        );
        repo.upsert(&config).await.unwrap();

        repo.record_usage("system.logger").await.unwrap();
        repo.record_usage("system.logger").await.unwrap();

        let stored = repo.find("system.logger").await.unwrap().unwrap();
        assert_eq!(stored.usage_count, 2);
        assert!(stored.last_used_at.is_some());
    }
}
