//! Delay node executor

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use axon_domain::{NodeSpec, NodeType};

use crate::context::RunContext;
use crate::executor::traits::{ExecutorError, NodeExecutor};

/// Pauses the run for `config.delay_seconds`. The sleep is cancellable.
pub struct DelayNodeExecutor;

#[async_trait]
impl NodeExecutor for DelayNodeExecutor {
    async fn execute(&self, node: &NodeSpec, ctx: &mut RunContext) -> Result<Value, ExecutorError> {
        let delay_seconds = node
            .config
            .get("delay_seconds")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        if !delay_seconds.is_finite() || delay_seconds < 0.0 {
            return Err(ExecutorError::InvalidConfig(format!(
                "delay_seconds must be a non-negative number, got {delay_seconds}"
            )));
        }

        tokio::select! {
            () = tokio::time::sleep(Duration::from_secs_f64(delay_seconds)) => {
                Ok(json!({"delayed_seconds": delay_seconds}))
            }
            () = ctx.cancellation.cancelled() => Err(ExecutorError::Cancelled),
        }
    }

    fn node_type(&self) -> NodeType {
        NodeType::Delay
    }
}
