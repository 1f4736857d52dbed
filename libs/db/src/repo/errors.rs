//! Per-operation repository errors
//!
//! Each repository operation has its own error type for precise error
//! handling at call sites.

use axon_domain::{ExecutionId, IdParseError, InstallationId, UserId, WorkflowId};
use thiserror::Error;

// =============================================================================
// Adapter Configuration Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum UpsertAdapterConfigError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum FindAdapterConfigError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ListAdapterConfigsError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum DeleteAdapterConfigError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum RecordAdapterUsageError {
    #[error("adapter configuration not found: {0}")]
    NotFound(String),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

// =============================================================================
// Workflow Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum CreateWorkflowError {
    #[error("slug already exists for user: {0}")]
    SlugExists(String),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum FindWorkflowError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ListWorkflowsError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum UpdateWorkflowError {
    #[error("workflow not found: {0}")]
    NotFound(WorkflowId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum DeleteWorkflowError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

// =============================================================================
// Execution Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum CreateExecutionError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum FindExecutionError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum UpdateExecutionError {
    #[error("execution not found: {0}")]
    NotFound(ExecutionId),
    /// Terminal statuses are never overwritten.
    #[error("execution {0} already reached a terminal status")]
    Terminal(ExecutionId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ListExecutionsError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

// =============================================================================
// Installation Repository Errors
// =============================================================================

#[derive(Debug, Error)]
pub enum CreateInstallationError {
    #[error("user {user_id} already has package {package_id} installed")]
    AlreadyInstalled {
        user_id: UserId,
        package_id: String,
    },
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum FindInstallationError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum ListInstallationsError {
    #[error("database error")]
    Database(#[source] sqlx::Error),
    #[error("stored row is corrupt: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum UpdateInstallationError {
    #[error("installation not found: {0}")]
    NotFound(InstallationId),
    #[error("database error")]
    Database(#[source] sqlx::Error),
}

impl From<IdParseError> for FindWorkflowError {
    fn from(e: IdParseError) -> Self {
        Self::Corrupt(e.to_string())
    }
}

impl From<IdParseError> for FindExecutionError {
    fn from(e: IdParseError) -> Self {
        Self::Corrupt(e.to_string())
    }
}

impl From<IdParseError> for FindInstallationError {
    fn from(e: IdParseError) -> Self {
        Self::Corrupt(e.to_string())
    }
}
