//! Node executor trait, errors, and registry

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use axon_adapters::AdapterError;
use axon_domain::{NodeSpec, NodeType};

use crate::context::RunContext;
use crate::interpolate::InterpolationError;

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur during node execution
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// Node configuration is malformed for its type
    #[error("invalid node config: {0}")]
    InvalidConfig(String),

    /// Placeholder resolution failed
    #[error(transparent)]
    Interpolation(#[from] InterpolationError),

    /// Adapter invocation failed
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Condition expression is outside the supported grammar
    #[error("condition expression unsupported: {0}")]
    ConditionUnsupported(String),

    /// Node type is dispatched but not yet implemented
    #[error("node type {0} is not implemented")]
    NotImplemented(NodeType),

    /// Execution was cancelled cooperatively
    #[error("execution cancelled")]
    Cancelled,
}

impl ExecutorError {
    /// Stable machine code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig(_) => "INVALID_NODE_CONFIG",
            Self::Interpolation(InterpolationError::InvalidToken(_)) => "INVALID_TOKEN",
            Self::Interpolation(InterpolationError::Unresolved(_)) => "INTERPOLATION_FAILED",
            Self::Adapter(e) => e.code(),
            Self::ConditionUnsupported(_) => "CONDITION_UNSUPPORTED",
            Self::NotImplemented(_) => "NOT_IMPLEMENTED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

// =============================================================================
// Node Executor Trait & Registry
// =============================================================================

/// Trait for node executors
#[async_trait]
pub trait NodeExecutor: Send + Sync {
    /// Execute the node and return its output value.
    async fn execute(
        &self,
        node: &NodeSpec,
        ctx: &mut RunContext,
    ) -> Result<serde_json::Value, ExecutorError>;

    /// The node type this executor handles.
    fn node_type(&self) -> NodeType;
}

/// Registry of executors keyed by node type.
///
/// Every [`NodeType`] has an entry; loop/transform/http/script dispatch to
/// not-implemented stubs.
pub struct ExecutorRegistry {
    executors: HashMap<NodeType, Arc<dyn NodeExecutor>>,
}

impl ExecutorRegistry {
    /// Create a registry with the default executors for all node types.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self {
            executors: HashMap::new(),
        };
        registry.register(Arc::new(super::basic::StartNodeExecutor));
        registry.register(Arc::new(super::basic::EndNodeExecutor));
        registry.register(Arc::new(super::adapter::AdapterNodeExecutor));
        registry.register(Arc::new(super::conditional::ConditionNodeExecutor));
        registry.register(Arc::new(super::delay::DelayNodeExecutor));
        for node_type in [
            NodeType::Loop,
            NodeType::Transform,
            NodeType::Http,
            NodeType::Script,
        ] {
            registry.register(Arc::new(super::stubs::NotImplementedExecutor::new(
                node_type,
            )));
        }
        registry
    }

    /// Register an executor under its declared node type.
    pub fn register(&mut self, executor: Arc<dyn NodeExecutor>) {
        self.executors.insert(executor.node_type(), executor);
    }

    /// Look up the executor for a node type.
    #[must_use]
    pub fn get(&self, node_type: NodeType) -> Option<Arc<dyn NodeExecutor>> {
        self.executors.get(&node_type).cloned()
    }
}

impl Default for ExecutorRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}
