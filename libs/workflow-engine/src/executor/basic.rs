//! Start and end node executors

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use axon_domain::{NodeSpec, NodeType};

use crate::context::RunContext;
use crate::executor::traits::{ExecutorError, NodeExecutor};
use crate::interpolate::resolve_value;

/// Marks the beginning of a run. No-op.
pub struct StartNodeExecutor;

#[async_trait]
impl NodeExecutor for StartNodeExecutor {
    async fn execute(
        &self,
        _node: &NodeSpec,
        _ctx: &mut RunContext,
    ) -> Result<Value, ExecutorError> {
        Ok(json!({"message": "workflow_started"}))
    }

    fn node_type(&self) -> NodeType {
        NodeType::Start
    }
}

/// Collects the workflow output.
///
/// `config.output` maps output keys to source expressions; each value is
/// resolved against the current context and written to the run output.
pub struct EndNodeExecutor;

#[async_trait]
impl NodeExecutor for EndNodeExecutor {
    async fn execute(&self, node: &NodeSpec, ctx: &mut RunContext) -> Result<Value, ExecutorError> {
        let output_config = node
            .config
            .get("output")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));

        let resolved = resolve_value(&output_config, ctx.scope(), ctx.interpolation_mode)?;
        let output = match resolved {
            Value::Object(map) => map,
            other => {
                let mut map = Map::new();
                map.insert("result".to_string(), other);
                map
            }
        };

        ctx.output = output.clone();
        Ok(json!({"message": "workflow_completed", "output": Value::Object(output)}))
    }

    fn node_type(&self) -> NodeType {
        NodeType::End
    }
}
