//! Workflow execution record and per-node results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::enums::{ExecutionMode, ExecutionStatus, NodeRunStatus};
use crate::ids::{ExecutionId, UserId, WorkflowId};

/// Outcome of one node within an execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeRunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl NodeResult {
    /// A successful node result captured now.
    #[must_use]
    pub fn success(output: Value) -> Self {
        Self {
            status: NodeRunStatus::Success,
            output: Some(output),
            error: None,
            timestamp: Utc::now(),
        }
    }

    /// A failed node result captured now.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: NodeRunStatus::Failed,
            output: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// One invocation of a workflow.
///
/// Executions are created `pending`, advance once to `running`, then once to
/// a terminal status. `completed_at >= started_at` once set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: ExecutionId,
    pub workflow_id: WorkflowId,
    pub user_id: UserId,
    pub execution_mode: ExecutionMode,
    pub execution_status: ExecutionStatus,
    #[serde(default)]
    pub input_data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_data: Option<Value>,
    #[serde(default)]
    pub node_results: BTreeMap<String, NodeResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub error_message: Option<String>,
}

impl WorkflowExecution {
    /// Create a pending execution started now.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        user_id: UserId,
        execution_mode: ExecutionMode,
        input_data: Value,
    ) -> Self {
        Self {
            id: ExecutionId::new(),
            workflow_id,
            user_id,
            execution_mode,
            execution_status: ExecutionStatus::Pending,
            input_data,
            output_data: None,
            node_results: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            duration_ms: None,
            error_message: None,
        }
    }

    /// Whether the execution has reached a terminal status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.execution_status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_execution_is_pending() {
        let exec = WorkflowExecution::new(
            WorkflowId::new(),
            UserId::new(),
            ExecutionMode::Manual,
            json!({"k": 1}),
        );
        assert_eq!(exec.execution_status, ExecutionStatus::Pending);
        assert!(!exec.is_terminal());
        assert!(exec.completed_at.is_none());
    }

    #[test]
    fn test_node_result_shapes() {
        let ok = NodeResult::success(json!({"logged": true}));
        assert_eq!(ok.status, NodeRunStatus::Success);
        assert!(ok.error.is_none());

        let bad = NodeResult::failed("boom");
        assert_eq!(bad.status, NodeRunStatus::Failed);
        assert!(bad.output.is_none());
    }
}
