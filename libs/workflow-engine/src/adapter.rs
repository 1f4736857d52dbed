//! Workflow-bound adapter
//!
//! A built-in adapter class bound to one workflow. `process` submits the
//! workflow through the service and returns the submission receipt; callers
//! that want the terminal output poll the execution record.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use axon_adapters::{
    Adapter, AdapterError, AdapterFactory, ExecutionContext, HealthReport, WORKFLOW_ADAPTER_CLASS,
};
use axon_domain::{AdapterConfig, ExecutionMode, UserId, WorkflowId};

use crate::service::WorkflowService;

/// Adapter that invokes a specific workflow via the workflow service.
pub struct WorkflowAdapter {
    adapter_id: String,
    workflow_id: WorkflowId,
    allow_other_users: bool,
    allowed_users: Vec<UserId>,
    service: Arc<WorkflowService>,
}

impl WorkflowAdapter {
    /// Build from a registered configuration.
    ///
    /// The configuration must carry a `workflow_id` entry (injected by the
    /// installer); `allow_other_users` and `allowed_users` are optional.
    pub fn from_config(
        config: &AdapterConfig,
        service: Arc<WorkflowService>,
    ) -> Result<Self, AdapterError> {
        let workflow_id: WorkflowId = config
            .config
            .get("workflow_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                AdapterError::Configuration(
                    "workflow adapter config requires workflow_id".to_string(),
                )
            })?
            .parse()
            .map_err(|e| AdapterError::Configuration(format!("invalid workflow_id: {e}")))?;

        let allow_other_users = config
            .config
            .get("allow_other_users")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let allowed_users = config
            .config
            .get("allowed_users")
            .and_then(Value::as_array)
            .map(|users| {
                users
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::parse)
                    .collect::<Result<Vec<UserId>, _>>()
            })
            .transpose()
            .map_err(|e| AdapterError::Configuration(format!("invalid allowed_users: {e}")))?
            .unwrap_or_default();

        Ok(Self {
            adapter_id: config.adapter_id.clone(),
            workflow_id,
            allow_other_users,
            allowed_users,
            service,
        })
    }

    /// Register the `WorkflowAdapter` builder in the factory table.
    ///
    /// Called once at startup, after the workflow service exists.
    pub fn register_class(factory: &AdapterFactory, service: Arc<WorkflowService>) {
        factory.register(WORKFLOW_ADAPTER_CLASS, move |config| {
            Ok(Arc::new(WorkflowAdapter::from_config(config, Arc::clone(&service))?)
                as Arc<dyn Adapter>)
        });
    }

    /// Owner, allow-list, or open access.
    fn permits(&self, caller: UserId, owner: UserId) -> bool {
        caller == owner || self.allowed_users.contains(&caller) || self.allow_other_users
    }
}

#[async_trait]
impl Adapter for WorkflowAdapter {
    async fn initialize(&self) -> Result<(), AdapterError> {
        // Verify the bound workflow exists before serving.
        let workflow = self
            .service
            .get_workflow(&self.workflow_id)
            .await
            .map_err(|e| AdapterError::Configuration(e.to_string()))?;

        if workflow.is_none() {
            return Err(AdapterError::Configuration(format!(
                "bound workflow not found: {}",
                self.workflow_id
            )));
        }

        tracing::info!(
            adapter_id = %self.adapter_id,
            workflow_id = %self.workflow_id,
            "workflow adapter initialized"
        );
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn process(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, AdapterError> {
        let user_id = ctx.user_id.ok_or_else(|| {
            AdapterError::Execution("user id is required for workflow execution".to_string())
        })?;

        let workflow = self
            .service
            .get_workflow(&self.workflow_id)
            .await
            .map_err(|e| AdapterError::Execution(e.to_string()))?
            .ok_or_else(|| {
                AdapterError::Execution(format!("workflow not found: {}", self.workflow_id))
            })?;

        if !self.permits(user_id, workflow.user_id) {
            return Err(AdapterError::Execution(
                "permission denied: user not allowed to execute this workflow".to_string(),
            ));
        }

        if !workflow.is_active() {
            return Err(AdapterError::Execution(format!(
                "workflow is not active: {}",
                self.workflow_id
            )));
        }

        let input = if input.is_object() {
            input
        } else {
            Value::Object(serde_json::Map::new())
        };

        let execution = self
            .service
            .execute_workflow(&self.workflow_id, user_id, input, ExecutionMode::Manual)
            .await
            .map_err(|e| AdapterError::Execution(e.to_string()))?;

        Ok(json!({
            "kind": "workflow",
            "workflow_id": self.workflow_id.to_string(),
            "workflow_execution_id": execution.id.to_string(),
            "status": "submitted",
        }))
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn health_check(&self) -> HealthReport {
        match self.service.get_workflow(&self.workflow_id).await {
            Ok(Some(workflow)) if workflow.is_active() => {
                HealthReport::healthy(["workflow_service", "workflow_status"])
            }
            Ok(Some(workflow)) => HealthReport::unhealthy([format!(
                "workflow is not active: {:?}",
                workflow.workflow_status
            )]),
            Ok(None) => HealthReport::unhealthy(["bound workflow missing"]),
            Err(e) => HealthReport::unhealthy([format!("workflow lookup failed: {e}")]),
        }
    }
}
