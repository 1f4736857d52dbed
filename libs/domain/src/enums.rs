//! All enum types for the Axon platform
//!
//! These enums are the source of truth and must match the SQL column values
//! exactly (snake_case strings).

use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

// =============================================================================
// Adapter Enums
// =============================================================================

/// Category of an adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum AdapterType {
    Soft,
    Hard,
}

/// Lifecycle state of an adapter registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdapterState {
    Registered,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Failed,
}

impl AdapterState {
    /// Whether a live instance may be attached in this state
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

// =============================================================================
// Workflow Enums
// =============================================================================

/// Status of a workflow definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Draft,
    Active,
    Archived,
    Deleted,
}

/// How a workflow is triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
    Event,
    Webhook,
}

/// Type of a workflow graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    Start,
    End,
    Adapter,
    Condition,
    Delay,
    Loop,
    Transform,
    Http,
    Script,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Start => "start",
            Self::End => "end",
            Self::Adapter => "adapter",
            Self::Condition => "condition",
            Self::Delay => "delay",
            Self::Loop => "loop",
            Self::Transform => "transform",
            Self::Http => "http",
            Self::Script => "script",
        };
        f.write_str(s)
    }
}

// =============================================================================
// Execution Enums
// =============================================================================

/// Status of a workflow execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
    Timeout,
}

impl ExecutionStatus {
    /// Terminal statuses never transition again
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Timeout
        )
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// How an execution was started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    Manual,
    Scheduled,
    Triggered,
}

/// Outcome of a single node within an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeRunStatus {
    Success,
    Failed,
}

// =============================================================================
// Installation Enums
// =============================================================================

/// Status of a skill installation record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallationStatus {
    Installing,
    Installed,
    Uninstalled,
    Failed,
    PendingApproval,
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Installing => "installing",
            Self::Installed => "installed",
            Self::Uninstalled => "uninstalled",
            Self::Failed => "failed",
            Self::PendingApproval => "pending_approval",
        };
        f.write_str(s)
    }
}

/// Install policy selected by the caller
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum InstallMode {
    #[default]
    Strict,
    AllowWithApproval,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snake_case_serialization() {
        assert_eq!(
            serde_json::to_string(&InstallationStatus::PendingApproval).unwrap(),
            "\"pending_approval\""
        );
        assert_eq!(
            serde_json::to_string(&InstallMode::AllowWithApproval).unwrap(),
            "\"allow_with_approval\""
        );
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!ExecutionStatus::Pending.is_terminal());
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(ExecutionStatus::Completed.is_terminal());
        assert!(ExecutionStatus::Failed.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(ExecutionStatus::Timeout.is_terminal());
    }
}
