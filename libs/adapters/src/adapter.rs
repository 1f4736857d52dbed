//! Adapter trait and supporting execution types

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use axon_domain::UserId;

// =============================================================================
// Errors
// =============================================================================

/// Errors raised by adapters and the adapter manager
#[derive(Debug, Error)]
pub enum AdapterError {
    /// No registration exists for the adapter id
    #[error("adapter not found: {0}")]
    NotFound(String),

    /// A registration for the adapter id already exists
    #[error("adapter already registered: {0}")]
    AlreadyRegistered(String),

    /// Registering the configuration would create a dependency cycle
    #[error("dependency cycle involving adapters: {}", .0.join(" -> "))]
    DependencyCycle(Vec<String>),

    /// The adapter class string is not in the factory table
    #[error("adapter class is not registered: {0}")]
    UnknownClass(String),

    /// Operation requires the adapter to be running
    #[error("adapter is not running: {0}")]
    NotRunning(String),

    /// A running adapter still depends on the target
    #[error("adapter {adapter_id} is required by running adapter {dependent}")]
    DependencyViolation {
        adapter_id: String,
        dependent: String,
    },

    /// Lifecycle start failed; `diagnostic` carries the first failure observed
    #[error("failed to start adapter {adapter_id}: {diagnostic}")]
    StartFailed {
        adapter_id: String,
        diagnostic: String,
    },

    /// Lifecycle stop failed
    #[error("failed to stop adapter {adapter_id}: {cause}")]
    StopFailed { adapter_id: String, cause: String },

    /// The instance's `process` call failed
    #[error("adapter {adapter_id} processing failed")]
    ProcessFailed {
        adapter_id: String,
        #[source]
        source: Box<AdapterError>,
    },

    /// Instance-level configuration problem
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Instance-level execution problem
    #[error("execution failed: {0}")]
    Execution(String),

    /// The call exceeded the adapter's configured timeout
    #[error("operation timed out")]
    Timeout,

    /// The call was cancelled cooperatively
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration persistence failed
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl AdapterError {
    /// Stable machine code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "ADAPTER_NOT_FOUND",
            Self::AlreadyRegistered(_) => "ALREADY_REGISTERED",
            Self::DependencyCycle(_) => "DEPENDENCY_CYCLE",
            Self::UnknownClass(_) => "UNKNOWN_ADAPTER_CLASS",
            Self::NotRunning(_) => "NOT_RUNNING",
            Self::DependencyViolation { .. } => "DEPENDENCY_VIOLATION",
            Self::StartFailed { .. } => "START_FAILED",
            Self::StopFailed { .. } => "STOP_FAILED",
            Self::ProcessFailed { .. } => "PROCESS_FAILED",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Execution(_) => "EXECUTION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Cancelled => "CANCELLED",
            Self::Persistence(_) => "PERSISTENCE_ERROR",
        }
    }
}

// =============================================================================
// Execution Context
// =============================================================================

/// Per-call context flowing unchanged through adapter execution.
///
/// `execution_id` is unique per call (workflow node executions compose it
/// from the workflow execution id and node id). The cancellation token is
/// forwarded so cooperative adapters can abort early; adapters that ignore it
/// simply run to completion.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub request_id: String,
    pub user_id: Option<UserId>,
    pub session_id: Option<String>,
    pub execution_id: String,
    pub metadata: Map<String, Value>,
    pub cancellation: CancellationToken,
}

impl ExecutionContext {
    /// Create a context with fresh request and execution ids.
    #[must_use]
    pub fn new(user_id: Option<UserId>) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            user_id,
            session_id: None,
            execution_id: Uuid::new_v4().to_string(),
            metadata: Map::new(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Override the request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    /// Override the execution id.
    #[must_use]
    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = execution_id.into();
        self
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

// =============================================================================
// Capabilities & Health
// =============================================================================

/// Static capabilities declared by an adapter implementation.
#[derive(Debug, Clone)]
pub struct AdapterCapabilities {
    /// When false, concurrent `process` calls are serialized by the manager.
    pub reentrant: bool,
    /// Per-call wall-clock budget for `process`.
    pub process_timeout: Option<Duration>,
}

impl Default for AdapterCapabilities {
    fn default() -> Self {
        Self {
            reentrant: true,
            process_timeout: None,
        }
    }
}

/// Result of an adapter health check
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub is_healthy: bool,
    pub status: String,
    #[serde(default)]
    pub checks: BTreeMap<String, bool>,
    #[serde(default)]
    pub issues: Vec<String>,
}

impl HealthReport {
    /// A healthy report with the given named checks all passing.
    #[must_use]
    pub fn healthy<I, S>(checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_healthy: true,
            status: "healthy".to_string(),
            checks: checks.into_iter().map(|c| (c.into(), true)).collect(),
            issues: Vec::new(),
        }
    }

    /// An unhealthy report with the given issues.
    #[must_use]
    pub fn unhealthy<I, S>(issues: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            is_healthy: false,
            status: "unhealthy".to_string(),
            checks: BTreeMap::new(),
            issues: issues.into_iter().map(Into::into).collect(),
        }
    }
}

// =============================================================================
// Process Outcome
// =============================================================================

/// Status of a single `process_with_adapter` call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Success,
    Failed,
    Timeout,
    Cancelled,
}

/// Structured result of `process_with_adapter`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessOutcome {
    pub output: Value,
    pub status: ProcessStatus,
    pub duration_ms: i64,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProcessOutcome {
    /// Successful outcome with the given output.
    #[must_use]
    pub fn success(output: Value, duration_ms: i64) -> Self {
        Self {
            output,
            status: ProcessStatus::Success,
            duration_ms,
            timestamp: Utc::now(),
            error: None,
        }
    }
}

// =============================================================================
// Adapter Trait
// =============================================================================

/// A typed, stateful plugin instance.
///
/// Lifecycle: `initialize` then `start` before any `process`; `stop` then
/// `cleanup` tear the instance down. Instances own their internal state; the
/// manager never reaches past this API.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// One-time setup. Called exactly once before `start`.
    async fn initialize(&self) -> Result<(), AdapterError>;

    /// Transition into the serving state.
    async fn start(&self) -> Result<(), AdapterError>;

    /// Handle one input. The hot path; may run concurrently unless the
    /// adapter declares itself non-reentrant.
    async fn process(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, AdapterError>;

    /// Leave the serving state.
    async fn stop(&self) -> Result<(), AdapterError>;

    /// Release resources. Called after `stop`.
    async fn cleanup(&self) -> Result<(), AdapterError>;

    /// Report liveness and internal checks.
    async fn health_check(&self) -> HealthReport;

    /// Static capability declaration.
    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes_are_stable() {
        assert_eq!(
            AdapterError::NotFound("x".into()).code(),
            "ADAPTER_NOT_FOUND"
        );
        assert_eq!(
            AdapterError::DependencyCycle(vec!["a".into(), "b".into()]).code(),
            "DEPENDENCY_CYCLE"
        );
        assert_eq!(AdapterError::Timeout.code(), "TIMEOUT");
    }

    #[test]
    fn test_process_failed_preserves_cause() {
        let err = AdapterError::ProcessFailed {
            adapter_id: "system.logger".into(),
            source: Box::new(AdapterError::Execution("boom".into())),
        };
        let source = std::error::Error::source(&err).expect("cause chain");
        assert!(source.to_string().contains("boom"));
    }

    #[test]
    fn test_context_builder() {
        let ctx = ExecutionContext::new(None)
            .with_request_id("req-1")
            .with_execution_id("exec-1:node-a")
            .with_metadata("package_id", Value::String("skill.example".into()));

        assert_eq!(ctx.request_id, "req-1");
        assert_eq!(ctx.execution_id, "exec-1:node-a");
        assert!(ctx.metadata.contains_key("package_id"));
    }
}
