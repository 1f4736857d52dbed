//! Not-yet-implemented node executors
//!
//! Loop, transform, http, and script nodes are dispatched but fail with a
//! not-implemented error.

use async_trait::async_trait;
use serde_json::Value;

use axon_domain::{NodeSpec, NodeType};

use crate::context::RunContext;
use crate::executor::traits::{ExecutorError, NodeExecutor};

pub struct NotImplementedExecutor {
    node_type: NodeType,
}

impl NotImplementedExecutor {
    #[must_use]
    pub fn new(node_type: NodeType) -> Self {
        Self { node_type }
    }
}

#[async_trait]
impl NodeExecutor for NotImplementedExecutor {
    async fn execute(
        &self,
        _node: &NodeSpec,
        _ctx: &mut RunContext,
    ) -> Result<Value, ExecutorError> {
        Err(ExecutorError::NotImplemented(self.node_type))
    }

    fn node_type(&self) -> NodeType {
        self.node_type
    }
}
