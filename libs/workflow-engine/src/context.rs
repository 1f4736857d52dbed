//! Runtime context threaded through a workflow execution

use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use axon_adapters::AdapterManager;
use axon_domain::{ExecutionId, UserId, WorkflowId};

use crate::interpolate::{InterpolationMode, Scope};

/// Policy for adapter nodes whose target adapter is not running.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AdapterStartPolicy {
    /// Start the adapter transparently before processing.
    #[default]
    Auto,
    /// Require the adapter to already be running.
    StrictRunning,
}

/// Mutable state carried across node executions of one workflow run.
///
/// The adapter manager handle is passed explicitly; node executors never
/// reach for ambient globals.
pub struct RunContext {
    pub input: Value,
    pub variables: Map<String, Value>,
    pub output: Map<String, Value>,
    pub adapter_manager: Arc<AdapterManager>,
    pub user_id: UserId,
    pub workflow_id: WorkflowId,
    pub execution_id: ExecutionId,
    pub session_id: Option<String>,
    pub start_policy: AdapterStartPolicy,
    pub interpolation_mode: InterpolationMode,
    pub cancellation: CancellationToken,
}

impl RunContext {
    /// Interpolation scope over the current input and variables.
    #[must_use]
    pub fn scope(&self) -> Scope<'_> {
        Scope {
            input: &self.input,
            variables: &self.variables,
        }
    }
}
