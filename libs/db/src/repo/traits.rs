//! Repository trait definitions
//!
//! These traits define the interface for data access operations.
//! PostgreSQL implementations live in the `pg_*` modules; in-memory
//! implementations (tests, dev profile) in `memory`.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

use axon_domain::{
    AdapterConfig, ExecutionId, InstallationId, NodeResult, SkillInstallation, UserId, Workflow,
    WorkflowExecution, WorkflowId, WorkflowStatus,
};

use crate::pagination::{Page, Pagination};
use crate::repo::errors::*;

/// Repository for persisted adapter configurations
#[async_trait]
pub trait AdapterConfigRepository: Send + Sync {
    /// Insert or update a configuration keyed by `adapter_id`.
    async fn upsert(&self, config: &AdapterConfig) -> Result<(), UpsertAdapterConfigError>;

    /// Find a configuration by adapter id.
    async fn find(&self, adapter_id: &str)
        -> Result<Option<AdapterConfig>, FindAdapterConfigError>;

    /// List all enabled configurations, oldest first.
    async fn list_enabled(&self) -> Result<Vec<AdapterConfig>, ListAdapterConfigsError>;

    /// Delete a configuration. Returns whether a row existed.
    async fn delete(&self, adapter_id: &str) -> Result<bool, DeleteAdapterConfigError>;

    /// Increment `usage_count` and stamp `last_used_at`.
    async fn record_usage(&self, adapter_id: &str) -> Result<(), RecordAdapterUsageError>;
}

/// Repository for workflows
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Insert a workflow. Fails when the user already owns the slug.
    async fn create(&self, workflow: &Workflow) -> Result<(), CreateWorkflowError>;

    /// Find a workflow by id.
    async fn find(&self, id: &WorkflowId) -> Result<Option<Workflow>, FindWorkflowError>;

    /// Find a workflow by owner + slug.
    async fn find_by_slug(
        &self,
        user_id: &UserId,
        slug: &str,
    ) -> Result<Option<Workflow>, FindWorkflowError>;

    /// List a user's workflows, newest first.
    async fn list_for_user(
        &self,
        user_id: &UserId,
        pagination: &Pagination,
    ) -> Result<Page<Workflow>, ListWorkflowsError>;

    /// Set the workflow status.
    async fn update_status(
        &self,
        id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<(), UpdateWorkflowError>;

    /// Bump `execution_count` and stamp `last_executed_at`.
    async fn record_execution(&self, id: &WorkflowId) -> Result<(), UpdateWorkflowError>;

    /// Bump the success or failure counter and set `last_execution_status`.
    async fn record_outcome(&self, id: &WorkflowId, success: bool)
        -> Result<(), UpdateWorkflowError>;

    /// Hard-delete a workflow. Returns whether a row existed.
    async fn delete(&self, id: &WorkflowId) -> Result<bool, DeleteWorkflowError>;
}

/// Repository for workflow executions
///
/// Status transitions are guarded here: once an execution reaches a terminal
/// status, `mark_running` / `complete` / `fail` / `cancel` refuse to touch it.
#[async_trait]
pub trait ExecutionRepository: Send + Sync {
    /// Insert a pending execution.
    async fn create(&self, execution: &WorkflowExecution) -> Result<(), CreateExecutionError>;

    /// Find an execution by id.
    async fn find(&self, id: &ExecutionId) -> Result<Option<WorkflowExecution>, FindExecutionError>;

    /// Transition `pending -> running`.
    async fn mark_running(&self, id: &ExecutionId) -> Result<(), UpdateExecutionError>;

    /// Transition to `completed`, recording output and node results.
    async fn complete(
        &self,
        id: &ExecutionId,
        output: Value,
        node_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), UpdateExecutionError>;

    /// Transition to `failed`, recording the error and any node results.
    async fn fail(
        &self,
        id: &ExecutionId,
        error: &str,
        node_results: &BTreeMap<String, NodeResult>,
    ) -> Result<(), UpdateExecutionError>;

    /// Transition to `cancelled`.
    async fn cancel(&self, id: &ExecutionId) -> Result<(), UpdateExecutionError>;

    /// List executions of a workflow, newest first.
    async fn list_for_workflow(
        &self,
        workflow_id: &WorkflowId,
        pagination: &Pagination,
    ) -> Result<Page<WorkflowExecution>, ListExecutionsError>;
}

/// Repository for skill installations
#[async_trait]
pub trait InstallationRepository: Send + Sync {
    /// Insert an installation record. Fails when the user already has an
    /// `installed` row for the package.
    async fn create(&self, installation: &SkillInstallation)
        -> Result<(), CreateInstallationError>;

    /// Find the `installed` row for a user + package, if any.
    async fn find_installed(
        &self,
        user_id: &UserId,
        package_id: &str,
    ) -> Result<Option<SkillInstallation>, FindInstallationError>;

    /// Find the most recent row for a user + package regardless of status.
    async fn find_any(
        &self,
        user_id: &UserId,
        package_id: &str,
    ) -> Result<Option<SkillInstallation>, FindInstallationError>;

    /// List a user's installed skills, newest first.
    async fn list_installed(
        &self,
        user_id: &UserId,
        pagination: &Pagination,
    ) -> Result<Page<SkillInstallation>, ListInstallationsError>;

    /// Mark an installation `uninstalled` with a timestamp.
    async fn mark_uninstalled(&self, id: &InstallationId) -> Result<(), UpdateInstallationError>;

    /// Mark an installation `failed` with an error message.
    async fn mark_failed(
        &self,
        id: &InstallationId,
        error: &str,
    ) -> Result<(), UpdateInstallationError>;
}
