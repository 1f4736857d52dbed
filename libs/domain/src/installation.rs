//! Skill installation record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::enums::InstallationStatus;
use crate::ids::{InstallationId, UserId, WorkflowId};

/// Persisted link between a user, a skill package, a workflow, and an adapter.
///
/// `manifest` stores the complete validated manifest so a restart can rebuild
/// the workflow adapter even when the live registry was cleared. At most one
/// row per `(user_id, package_id)` carries status `installed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillInstallation {
    pub id: InstallationId,
    pub user_id: UserId,
    pub package_id: String,
    pub workflow_id: Option<WorkflowId>,
    pub adapter_id: Option<String>,
    pub installation_status: InstallationStatus,
    pub manifest: Value,
    pub installed_at: DateTime<Utc>,
    pub uninstalled_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl SkillInstallation {
    /// Create an installed record pointing at the given workflow + adapter.
    #[must_use]
    pub fn installed(
        user_id: UserId,
        package_id: impl Into<String>,
        workflow_id: WorkflowId,
        adapter_id: impl Into<String>,
        manifest: Value,
    ) -> Self {
        Self {
            id: InstallationId::new(),
            user_id,
            package_id: package_id.into(),
            workflow_id: Some(workflow_id),
            adapter_id: Some(adapter_id.into()),
            installation_status: InstallationStatus::Installed,
            manifest,
            installed_at: Utc::now(),
            uninstalled_at: None,
            error_message: None,
        }
    }

    /// Create a record awaiting permission approval. No workflow or adapter
    /// exists yet for these.
    #[must_use]
    pub fn pending_approval(
        user_id: UserId,
        package_id: impl Into<String>,
        manifest: Value,
    ) -> Self {
        Self {
            id: InstallationId::new(),
            user_id,
            package_id: package_id.into(),
            workflow_id: None,
            adapter_id: None,
            installation_status: InstallationStatus::PendingApproval,
            manifest,
            installed_at: Utc::now(),
            uninstalled_at: None,
            error_message: None,
        }
    }
}
