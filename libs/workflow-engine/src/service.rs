//! Workflow service
//!
//! Persists workflows and execution records and drives background execution.
//!
//! Background tasks never reuse a caller's persistence session: every
//! repository handle here is pool-backed and each call draws its own
//! connection, so a spawned execution commits independently of the request
//! that created it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use axon_adapters::AdapterManager;
use axon_db::{
    CreateWorkflowError, ExecutionRepository, Page, Pagination, UpdateExecutionError,
    UpdateWorkflowError, WorkflowRepository,
};
use axon_domain::{
    ExecutionId, ExecutionMode, TriggerType, UserId, Workflow, WorkflowDefinition,
    WorkflowExecution, WorkflowId, WorkflowStatus,
};

use crate::engine::{EngineRunStatus, RunSeed, WorkflowEngine};
use crate::parser::{parse_definition, GraphValidationError};

/// Default polling interval for synchronous waits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Default timeout for synchronous waits.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Errors
// =============================================================================

/// Workflow service errors
#[derive(Debug, Error)]
pub enum WorkflowServiceError {
    /// Workflow does not exist
    #[error("workflow not found: {0}")]
    WorkflowNotFound(WorkflowId),

    /// Workflow exists but is not active
    #[error("workflow is not active: {0}")]
    WorkflowInactive(WorkflowId),

    /// Slug already taken for the user
    #[error("workflow slug already exists: {0}")]
    SlugExists(String),

    /// Definition failed structural validation
    #[error(transparent)]
    InvalidGraph(#[from] GraphValidationError),

    /// Execution does not exist
    #[error("execution not found: {0}")]
    ExecutionNotFound(ExecutionId),

    /// Caller does not own the execution
    #[error("not permitted to act on execution {0}")]
    NotPermitted(ExecutionId),

    /// Execution already reached a terminal status
    #[error("execution {0} already finished")]
    AlreadyFinished(ExecutionId),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl WorkflowServiceError {
    /// Stable machine code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::WorkflowNotFound(_) => "WORKFLOW_NOT_FOUND",
            Self::WorkflowInactive(_) => "WORKFLOW_INACTIVE",
            Self::SlugExists(_) => "SLUG_EXISTS",
            Self::InvalidGraph(GraphValidationError::MissingStartNode) => "MISSING_START_NODE",
            Self::InvalidGraph(GraphValidationError::CycleInGraph(_)) => "CYCLE_IN_GRAPH",
            Self::InvalidGraph(_) => "INVALID_GRAPH",
            Self::ExecutionNotFound(_) => "EXECUTION_NOT_FOUND",
            Self::NotPermitted(_) => "NOT_PERMITTED",
            Self::AlreadyFinished(_) => "ALREADY_FINISHED",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

// =============================================================================
// Inputs
// =============================================================================

/// Input for creating a workflow.
#[derive(Debug, Clone)]
pub struct NewWorkflow {
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub definition: WorkflowDefinition,
    pub trigger_type: TriggerType,
    pub trigger_config: Map<String, Value>,
    pub environment_variables: Map<String, Value>,
    pub status: WorkflowStatus,
}

// =============================================================================
// Workflow Service
// =============================================================================

/// Persists workflows and executions and spawns background engine runs.
pub struct WorkflowService {
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    engine: Arc<WorkflowEngine>,
    adapter_manager: Arc<AdapterManager>,
    active: Arc<RwLock<HashMap<ExecutionId, CancellationToken>>>,
}

impl WorkflowService {
    /// Create a service over the given repositories, engine, and manager.
    #[must_use]
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        executions: Arc<dyn ExecutionRepository>,
        engine: Arc<WorkflowEngine>,
        adapter_manager: Arc<AdapterManager>,
    ) -> Self {
        Self {
            workflows,
            executions,
            engine,
            adapter_manager,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// The process-wide adapter manager.
    #[must_use]
    pub fn adapter_manager(&self) -> &Arc<AdapterManager> {
        &self.adapter_manager
    }

    // =========================================================================
    // Workflow CRUD
    // =========================================================================

    /// Validate and persist a workflow.
    pub async fn create_workflow(
        &self,
        user_id: UserId,
        new_workflow: NewWorkflow,
    ) -> Result<Workflow, WorkflowServiceError> {
        parse_definition(&new_workflow.definition)?;

        let mut workflow = Workflow::new(
            user_id,
            new_workflow.slug,
            new_workflow.name,
            new_workflow.definition,
            new_workflow.trigger_type,
        );
        workflow.description = new_workflow.description;
        workflow.trigger_config = new_workflow.trigger_config;
        workflow.environment_variables = new_workflow.environment_variables;
        workflow.workflow_status = new_workflow.status;

        self.workflows.create(&workflow).await.map_err(|e| match e {
            CreateWorkflowError::SlugExists(slug) => WorkflowServiceError::SlugExists(slug),
            CreateWorkflowError::Database(e) => WorkflowServiceError::Storage(e.to_string()),
        })?;

        Ok(workflow)
    }

    /// Look up a workflow by id.
    pub async fn get_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<Option<Workflow>, WorkflowServiceError> {
        self.workflows
            .find(workflow_id)
            .await
            .map_err(|e| WorkflowServiceError::Storage(e.to_string()))
    }

    /// Mark a workflow active.
    pub async fn publish_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<(), WorkflowServiceError> {
        self.set_status(workflow_id, WorkflowStatus::Active).await
    }

    /// Archive a workflow. Archiving an already-archived or missing workflow
    /// is a no-op so uninstall stays idempotent.
    pub async fn archive_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<(), WorkflowServiceError> {
        match self.set_status(workflow_id, WorkflowStatus::Archived).await {
            Ok(()) | Err(WorkflowServiceError::WorkflowNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Hard-delete a workflow (installer rollback path).
    pub async fn delete_workflow(
        &self,
        workflow_id: &WorkflowId,
    ) -> Result<bool, WorkflowServiceError> {
        self.workflows
            .delete(workflow_id)
            .await
            .map_err(|e| WorkflowServiceError::Storage(e.to_string()))
    }

    async fn set_status(
        &self,
        workflow_id: &WorkflowId,
        status: WorkflowStatus,
    ) -> Result<(), WorkflowServiceError> {
        self.workflows
            .update_status(workflow_id, status)
            .await
            .map_err(|e| match e {
                UpdateWorkflowError::NotFound(id) => WorkflowServiceError::WorkflowNotFound(id),
                UpdateWorkflowError::Database(e) => WorkflowServiceError::Storage(e.to_string()),
            })
    }

    // =========================================================================
    // Execution
    // =========================================================================

    /// Insert a pending execution, return it, and spawn the background run.
    ///
    /// The spawned task receives clones of the pool-backed repositories and
    /// the cancellation token; it does not share any session state with this
    /// call.
    pub async fn execute_workflow(
        &self,
        workflow_id: &WorkflowId,
        user_id: UserId,
        input: Value,
        mode: ExecutionMode,
    ) -> Result<WorkflowExecution, WorkflowServiceError> {
        let workflow = self
            .get_workflow(workflow_id)
            .await?
            .ok_or(WorkflowServiceError::WorkflowNotFound(*workflow_id))?;
        if !workflow.is_active() {
            return Err(WorkflowServiceError::WorkflowInactive(*workflow_id));
        }

        let execution = WorkflowExecution::new(*workflow_id, user_id, mode, input);
        self.executions
            .create(&execution)
            .await
            .map_err(|e| WorkflowServiceError::Storage(e.to_string()))?;

        if let Err(e) = self.workflows.record_execution(workflow_id).await {
            tracing::warn!(workflow_id = %workflow_id, error = %e, "failed to bump execution counter");
        }

        let token = CancellationToken::new();
        let execution_id = execution.id;
        {
            let mut active = self.active.write().await;
            active.insert(execution_id, token.clone());
        }

        let workflows = Arc::clone(&self.workflows);
        let executions = Arc::clone(&self.executions);
        let engine = Arc::clone(&self.engine);
        let adapter_manager = Arc::clone(&self.adapter_manager);
        let active = Arc::clone(&self.active);
        let background_execution = execution.clone();

        tokio::spawn(async move {
            run_in_background(
                workflows,
                executions,
                engine,
                adapter_manager,
                workflow,
                background_execution,
                token,
            )
            .await;

            let mut active = active.write().await;
            active.remove(&execution_id);
        });

        Ok(execution)
    }

    /// Look up an execution record.
    pub async fn get_execution(
        &self,
        execution_id: &ExecutionId,
    ) -> Result<Option<WorkflowExecution>, WorkflowServiceError> {
        self.executions
            .find(execution_id)
            .await
            .map_err(|e| WorkflowServiceError::Storage(e.to_string()))
    }

    /// List executions of a workflow.
    pub async fn list_executions(
        &self,
        workflow_id: &WorkflowId,
        pagination: &Pagination,
    ) -> Result<Page<WorkflowExecution>, WorkflowServiceError> {
        self.executions
            .list_for_workflow(workflow_id, pagination)
            .await
            .map_err(|e| WorkflowServiceError::Storage(e.to_string()))
    }

    /// Poll an execution until it reaches a terminal status or the timeout
    /// elapses. Returns the last observed record either way; the caller
    /// inspects its status.
    pub async fn wait_for_completion(
        &self,
        execution_id: &ExecutionId,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<WorkflowExecution, WorkflowServiceError> {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let execution = self
                .get_execution(execution_id)
                .await?
                .ok_or(WorkflowServiceError::ExecutionNotFound(*execution_id))?;

            if execution.is_terminal() || tokio::time::Instant::now() >= deadline {
                return Ok(execution);
            }

            tokio::time::sleep(poll_interval).await;
        }
    }

    /// Cancel a pending or running execution owned by the caller.
    pub async fn cancel_execution(
        &self,
        execution_id: &ExecutionId,
        user_id: &UserId,
    ) -> Result<WorkflowExecution, WorkflowServiceError> {
        let execution = self
            .get_execution(execution_id)
            .await?
            .ok_or(WorkflowServiceError::ExecutionNotFound(*execution_id))?;

        if execution.user_id != *user_id {
            return Err(WorkflowServiceError::NotPermitted(*execution_id));
        }
        if execution.is_terminal() {
            return Err(WorkflowServiceError::AlreadyFinished(*execution_id));
        }

        // Fire the cooperative signal first so a running engine stops at its
        // next suspension point.
        {
            let active = self.active.read().await;
            if let Some(token) = active.get(execution_id) {
                token.cancel();
            }
        }

        match self.executions.cancel(execution_id).await {
            Ok(()) => {}
            // The background task finished in the meantime; its terminal
            // status wins.
            Err(UpdateExecutionError::Terminal(_)) => {}
            Err(UpdateExecutionError::NotFound(id)) => {
                return Err(WorkflowServiceError::ExecutionNotFound(id));
            }
            Err(UpdateExecutionError::Database(e)) => {
                return Err(WorkflowServiceError::Storage(e.to_string()));
            }
        }

        self.get_execution(execution_id)
            .await?
            .ok_or(WorkflowServiceError::ExecutionNotFound(*execution_id))
    }
}

/// Body of the spawned background execution.
async fn run_in_background(
    workflows: Arc<dyn WorkflowRepository>,
    executions: Arc<dyn ExecutionRepository>,
    engine: Arc<WorkflowEngine>,
    adapter_manager: Arc<AdapterManager>,
    workflow: Workflow,
    execution: WorkflowExecution,
    token: CancellationToken,
) {
    match executions.mark_running(&execution.id).await {
        Ok(()) => {}
        Err(UpdateExecutionError::Terminal(_)) => {
            // Cancelled before we got scheduled.
            return;
        }
        Err(e) => {
            tracing::error!(execution_id = %execution.id, error = %e, "failed to mark execution running");
            return;
        }
    }

    let seed = RunSeed::new(adapter_manager).with_cancellation(token);
    let outcome = engine.execute(&workflow, &execution, seed).await;

    let persist = match outcome.status {
        EngineRunStatus::Completed => {
            let result = executions
                .complete(
                    &execution.id,
                    Value::Object(outcome.output),
                    &outcome.node_results,
                )
                .await;
            if result.is_ok() {
                if let Err(e) = workflows.record_outcome(&workflow.id, true).await {
                    tracing::warn!(workflow_id = %workflow.id, error = %e, "failed to record success");
                }
            }
            result
        }
        EngineRunStatus::Failed => {
            let error = outcome
                .error
                .unwrap_or_else(|| "workflow execution failed".to_string());
            let result = executions
                .fail(&execution.id, &error, &outcome.node_results)
                .await;
            if result.is_ok() {
                if let Err(e) = workflows.record_outcome(&workflow.id, false).await {
                    tracing::warn!(workflow_id = %workflow.id, error = %e, "failed to record failure");
                }
            }
            result
        }
        EngineRunStatus::Cancelled => executions.cancel(&execution.id).await,
    };

    match persist {
        Ok(()) => {}
        // A concurrent cancel_execution already wrote the terminal status;
        // that record wins.
        Err(UpdateExecutionError::Terminal(_)) => {}
        Err(e) => {
            tracing::error!(execution_id = %execution.id, error = %e, "failed to persist execution outcome");
        }
    }
}
