//! Adapter node executor
//!
//! Invokes an adapter through the manager with interpolated parameters.

use async_trait::async_trait;
use serde_json::Value;

use axon_adapters::{AdapterError, ExecutionContext};
use axon_domain::{NodeSpec, NodeType};

use crate::context::{AdapterStartPolicy, RunContext};
use crate::executor::traits::{ExecutorError, NodeExecutor};
use crate::interpolate::resolve_value;

/// The adapter node's parameter map must never smuggle a workflow binding;
/// that key is injected by the installer only.
const RESERVED_PARAM: &str = "workflow_id";

pub struct AdapterNodeExecutor;

impl AdapterNodeExecutor {
    /// Ensure the target adapter is running, honoring the start policy.
    async fn ensure_running(
        adapter_id: &str,
        ctx: &RunContext,
    ) -> Result<(), ExecutorError> {
        let snapshot = ctx
            .adapter_manager
            .get_adapter(adapter_id)
            .await
            .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?;

        if snapshot.is_running() {
            return Ok(());
        }

        match ctx.start_policy {
            AdapterStartPolicy::Auto => {
                tracing::info!(adapter_id, "starting adapter on demand");
                if let Err(e) = ctx.adapter_manager.start_adapter(adapter_id).await {
                    // Reproduce the failure synchronously so the error names
                    // the actual lifecycle step that broke.
                    let diagnostic = ctx
                        .adapter_manager
                        .diagnose(adapter_id)
                        .await
                        .unwrap_or_else(|diag_err| format!("diagnose failed: {diag_err}"));
                    return Err(ExecutorError::Adapter(AdapterError::StartFailed {
                        adapter_id: adapter_id.to_string(),
                        diagnostic: format!("{e}; {diagnostic}"),
                    }));
                }
                Ok(())
            }
            AdapterStartPolicy::StrictRunning => Err(ExecutorError::Adapter(
                AdapterError::NotRunning(adapter_id.to_string()),
            )),
        }
    }
}

#[async_trait]
impl NodeExecutor for AdapterNodeExecutor {
    async fn execute(&self, node: &NodeSpec, ctx: &mut RunContext) -> Result<Value, ExecutorError> {
        let adapter_id = node
            .config
            .get("adapter_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                ExecutorError::InvalidConfig("adapter node requires adapter_id".to_string())
            })?
            .to_string();

        let raw_params = node
            .config
            .get("parameters")
            .cloned()
            .unwrap_or_else(|| Value::Object(serde_json::Map::new()));
        let output_variable = node
            .config
            .get("output_variable")
            .and_then(Value::as_str)
            .map(ToString::to_string);

        let params = resolve_value(&raw_params, ctx.scope(), ctx.interpolation_mode)?;
        if params.get(RESERVED_PARAM).is_some() {
            return Err(ExecutorError::InvalidConfig(format!(
                "adapter parameters must not carry the reserved '{RESERVED_PARAM}' key"
            )));
        }

        Self::ensure_running(&adapter_id, ctx).await?;

        // Composite execution id keeps per-node invocations unique within
        // one workflow execution.
        let execution_context = ExecutionContext::new(Some(ctx.user_id))
            .with_request_id(ctx.execution_id.to_string())
            .with_execution_id(format!("{}:{}", ctx.execution_id, node.id))
            .with_metadata("workflow_id", Value::String(ctx.workflow_id.to_string()))
            .with_metadata("execution_id", Value::String(ctx.execution_id.to_string()))
            .with_metadata("node_id", Value::String(node.id.clone()))
            .with_metadata("adapter_id", Value::String(adapter_id.clone()))
            .with_cancellation(ctx.cancellation.clone());

        let outcome = ctx
            .adapter_manager
            .process_with_adapter(&adapter_id, params, &execution_context)
            .await?;

        // The engine consumes the output value only; outcome metadata stays
        // with direct manager callers.
        if let Some(variable) = output_variable {
            ctx.variables.insert(variable, outcome.output.clone());
        }

        Ok(outcome.output)
    }

    fn node_type(&self) -> NodeType {
        NodeType::Adapter
    }
}
