//! Skill installer
//!
//! Turns a validated manifest into a runnable skill atomically from the
//! caller's perspective: workflow creation, adapter registration and start,
//! and the installation record either all land or are compensated in
//! reverse. Every step returns an explicit `Result`; rollback is driven by
//! inspecting those results, never by catch-all control flow.

use std::sync::Arc;

use rand::Rng;
use serde_json::{Map, Value};
use thiserror::Error;

use axon_adapters::{AdapterError, AdapterManager, WORKFLOW_ADAPTER_CLASS};
use axon_db::{CreateInstallationError, InstallationRepository, Page, Pagination};
use axon_domain::{
    AdapterConfig, AdapterType, InstallMode, InstallationStatus, SkillInstallation, UserId,
    WorkflowId, WorkflowStatus,
};
use axon_workflow_engine::{NewWorkflow, WorkflowService, WorkflowServiceError};

use crate::manifest::{ManifestError, SkillManifest};
use crate::policy::{check_dependencies, check_permissions, PermissionRisks, PermissionVerdict};

// =============================================================================
// Errors
// =============================================================================

/// Installer errors
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Manifest failed structural validation
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// Required dependencies are missing or failed to start
    #[error("required dependencies unsatisfied (missing: {missing:?}, start_failed: {start_failed:?})")]
    DependencyUnsatisfied {
        missing: Vec<String>,
        start_failed: Vec<String>,
        warnings: Vec<String>,
    },

    /// Permissions rejected under strict mode
    #[error("permission denied for requested access")]
    PermissionDenied(PermissionRisks),

    /// Workflow creation failed
    #[error("workflow step failed: {0}")]
    Workflow(#[source] WorkflowServiceError),

    /// Adapter registration or start failed
    #[error("adapter step failed: {0}")]
    Adapter(#[source] AdapterError),

    /// No installation exists for the caller
    #[error("skill not installed: {0}")]
    NotInstalled(String),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl InstallerError {
    /// Stable machine code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Manifest(e) => e.code(),
            Self::DependencyUnsatisfied { .. } => "DEPENDENCY_UNSATISFIED",
            Self::PermissionDenied(_) => "PERMISSION_DENIED",
            Self::Workflow(e) => e.code(),
            Self::Adapter(e) => e.code(),
            Self::NotInstalled(_) => "SKILL_NOT_INSTALLED",
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of a successful (or idempotent) install call.
#[derive(Debug)]
pub struct InstallOutcome {
    pub status: InstallationStatus,
    pub installation: SkillInstallation,
    pub warnings: Vec<String>,
    /// True when an existing installed record was returned unchanged.
    pub already_installed: bool,
}

/// Result of an uninstall call.
#[derive(Debug)]
pub struct UninstallOutcome {
    pub installation: SkillInstallation,
}

// =============================================================================
// Installer
// =============================================================================

/// Composes policy, workflow service, adapter manager, and the installation
/// store into a rollback-aware install transaction.
pub struct SkillInstaller {
    installations: Arc<dyn InstallationRepository>,
    workflow_service: Arc<WorkflowService>,
    adapter_manager: Arc<AdapterManager>,
}

impl SkillInstaller {
    /// Create an installer over its collaborators.
    #[must_use]
    pub fn new(
        installations: Arc<dyn InstallationRepository>,
        workflow_service: Arc<WorkflowService>,
        adapter_manager: Arc<AdapterManager>,
    ) -> Self {
        Self {
            installations,
            workflow_service,
            adapter_manager,
        }
    }

    /// Install a skill package for a user.
    pub async fn install(
        &self,
        manifest: &SkillManifest,
        user_id: UserId,
        install_mode: InstallMode,
    ) -> Result<InstallOutcome, InstallerError> {
        // Step 1: structural validation.
        manifest.validate()?;

        // Step 2: idempotency. An existing installed row is the answer.
        if let Some(existing) = self
            .installations
            .find_installed(&user_id, &manifest.package_id)
            .await
            .map_err(|e| InstallerError::Storage(e.to_string()))?
        {
            tracing::info!(
                package_id = %manifest.package_id,
                user_id = %user_id,
                "skill already installed, returning existing record"
            );
            return Ok(InstallOutcome {
                status: InstallationStatus::Installed,
                installation: existing,
                warnings: Vec::new(),
                already_installed: true,
            });
        }

        // Step 3: dependency satisfaction.
        let deps = check_dependencies(&self.adapter_manager, &manifest.dependencies).await;
        if !deps.ok {
            return Err(InstallerError::DependencyUnsatisfied {
                missing: deps.missing,
                start_failed: deps.start_failed,
                warnings: deps.warnings,
            });
        }
        let warnings = deps.warnings;

        // Step 4: permission policy.
        match check_permissions(&manifest.permissions, install_mode) {
            PermissionVerdict::Allowed => {}
            PermissionVerdict::Rejected(risks) => {
                return Err(InstallerError::PermissionDenied(risks));
            }
            PermissionVerdict::NeedsApproval(risks) => {
                let manifest_value = serde_json::to_value(manifest)
                    .map_err(|e| InstallerError::Storage(e.to_string()))?;
                let record = SkillInstallation::pending_approval(
                    user_id,
                    &manifest.package_id,
                    manifest_value,
                );
                self.installations
                    .create(&record)
                    .await
                    .map_err(|e| InstallerError::Storage(e.to_string()))?;

                tracing::info!(
                    package_id = %manifest.package_id,
                    ?risks,
                    "installation recorded as pending approval"
                );
                return Ok(InstallOutcome {
                    status: InstallationStatus::PendingApproval,
                    installation: record,
                    warnings,
                    already_installed: false,
                });
            }
        }

        // Step 5: create the workflow.
        let workflow = self
            .workflow_service
            .create_workflow(
                user_id,
                NewWorkflow {
                    slug: manifest.workflow.slug.clone(),
                    name: manifest.workflow.name.clone(),
                    description: manifest.description.clone(),
                    definition: manifest.workflow.definition.clone(),
                    trigger_type: manifest.workflow.trigger_type,
                    trigger_config: manifest.workflow.trigger_config.clone(),
                    environment_variables: Map::new(),
                    status: WorkflowStatus::Active,
                },
            )
            .await
            .map_err(InstallerError::Workflow)?;

        // Step 6: derive the adapter id.
        let adapter_id = manifest
            .workflow_adapter
            .adapter_id
            .clone()
            .unwrap_or_else(generated_adapter_id);

        // Step 7: register the workflow-bound adapter.
        let adapter_config = workflow_adapter_config(manifest, &adapter_id, &workflow.id);
        if let Err(e) = self.adapter_manager.register_adapter(adapter_config).await {
            self.rollback(None, Some(&workflow.id)).await;
            return Err(InstallerError::Adapter(e));
        }

        // Step 8: start it. The start error carries its own diagnostic.
        if let Err(e) = self.adapter_manager.start_adapter(&adapter_id).await {
            self.rollback(Some(&adapter_id), Some(&workflow.id)).await;
            return Err(InstallerError::Adapter(e));
        }

        // Step 9: write the installation record with the full manifest.
        let manifest_value =
            serde_json::to_value(manifest).map_err(|e| InstallerError::Storage(e.to_string()))?;
        let record = SkillInstallation::installed(
            user_id,
            &manifest.package_id,
            workflow.id,
            &adapter_id,
            manifest_value,
        );
        if let Err(e) = self.installations.create(&record).await {
            self.rollback(Some(&adapter_id), Some(&workflow.id)).await;
            return Err(match e {
                CreateInstallationError::AlreadyInstalled { package_id, .. } => {
                    // Lost a race with a concurrent install of the same
                    // package; the other call's record stands.
                    InstallerError::Storage(format!(
                        "concurrent install finished first for {package_id}"
                    ))
                }
                CreateInstallationError::Database(e) => InstallerError::Storage(e.to_string()),
            });
        }

        tracing::info!(
            package_id = %manifest.package_id,
            adapter_id = %adapter_id,
            workflow_id = %workflow.id,
            "skill installed"
        );

        Ok(InstallOutcome {
            status: InstallationStatus::Installed,
            installation: record,
            warnings,
            already_installed: false,
        })
    }

    /// Compensate steps 5-8 in reverse order. Failures are logged, never
    /// propagated, so the original error stays visible to the caller.
    async fn rollback(&self, adapter_id: Option<&str>, workflow_id: Option<&WorkflowId>) {
        if let Some(adapter_id) = adapter_id {
            if let Err(e) = self.adapter_manager.stop_adapter(adapter_id, true).await {
                if e.code() != "ADAPTER_NOT_FOUND" {
                    tracing::warn!(adapter_id, error = %e, "rollback: stop adapter failed");
                }
            }
            if let Err(e) = self.adapter_manager.unregister_adapter(adapter_id).await {
                tracing::warn!(adapter_id, error = %e, "rollback: unregister adapter failed");
            }
        }

        if let Some(workflow_id) = workflow_id {
            match self.workflow_service.delete_workflow(workflow_id).await {
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(workflow_id = %workflow_id, error = %e, "rollback: delete workflow failed");
                }
            }
        }
    }

    /// Uninstall a skill package for a user.
    ///
    /// Each step tolerates already-gone state: a missing adapter or archived
    /// workflow does not fail the uninstall.
    pub async fn uninstall(
        &self,
        package_id: &str,
        user_id: UserId,
    ) -> Result<UninstallOutcome, InstallerError> {
        let installation = self
            .installations
            .find_installed(&user_id, package_id)
            .await
            .map_err(|e| InstallerError::Storage(e.to_string()))?
            .ok_or_else(|| InstallerError::NotInstalled(package_id.to_string()))?;

        if let Some(adapter_id) = &installation.adapter_id {
            match self.adapter_manager.stop_adapter(adapter_id, true).await {
                Ok(_) | Err(AdapterError::NotFound(_)) => {}
                Err(e) => {
                    tracing::warn!(adapter_id, error = %e, "uninstall: stop adapter failed");
                }
            }
            if let Err(e) = self.adapter_manager.unregister_adapter(adapter_id).await {
                tracing::warn!(adapter_id, error = %e, "uninstall: unregister adapter failed");
            }
        }

        if let Some(workflow_id) = &installation.workflow_id {
            self.workflow_service
                .archive_workflow(workflow_id)
                .await
                .map_err(InstallerError::Workflow)?;
        }

        self.installations
            .mark_uninstalled(&installation.id)
            .await
            .map_err(|e| InstallerError::Storage(e.to_string()))?;

        tracing::info!(package_id, user_id = %user_id, "skill uninstalled");

        let mut installation = installation;
        installation.installation_status = InstallationStatus::Uninstalled;
        Ok(UninstallOutcome { installation })
    }

    /// List a user's installed skills.
    pub async fn list_installed(
        &self,
        user_id: &UserId,
        pagination: &Pagination,
    ) -> Result<Page<SkillInstallation>, InstallerError> {
        self.installations
            .list_installed(user_id, pagination)
            .await
            .map_err(|e| InstallerError::Storage(e.to_string()))
    }
}

/// Generated ids look like `tool.workflow.a1b2c3d4e5f6`.
fn generated_adapter_id() -> String {
    let mut rng = rand::thread_rng();
    let hex: String = (0..6).map(|_| format!("{:02x}", rng.gen::<u8>())).collect();
    format!("tool.workflow.{hex}")
}

/// Build the adapter configuration for a workflow-bound adapter, merging the
/// manifest's adapter config with the injected binding keys.
#[must_use]
pub fn workflow_adapter_config(
    manifest: &SkillManifest,
    adapter_id: &str,
    workflow_id: &WorkflowId,
) -> AdapterConfig {
    let mut config = manifest.workflow_adapter.config.clone();
    config.insert(
        "workflow_id".to_string(),
        Value::String(workflow_id.to_string()),
    );
    config.insert(
        "adapter_id".to_string(),
        Value::String(adapter_id.to_string()),
    );
    config.insert("adapter_type".to_string(), Value::String("hard".into()));
    config.insert("kind".to_string(), Value::String("workflow".into()));
    config.insert("run_mode".to_string(), Value::String("async".into()));

    let mut tags = manifest.tags.clone();
    for tag in ["skill", "workflow"] {
        if !tags.iter().any(|t| t == tag) {
            tags.push(tag.to_string());
        }
    }

    let mut adapter_config = AdapterConfig::new(
        adapter_id,
        &manifest.workflow_adapter.name,
        AdapterType::Hard,
        WORKFLOW_ADAPTER_CLASS,
    )
    .with_version(&manifest.version)
    .with_config(config);
    adapter_config.description = Some(format!(
        "Workflow adapter for skill {}",
        manifest.package_id
    ));
    adapter_config.author = manifest.author.clone();
    adapter_config.tags = tags;
    // Workflow adapters do not declare manager-level dependencies; skill
    // dependencies are enforced by the policy evaluator at install time.
    adapter_config.dependencies.clear();
    adapter_config
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_adapter_id_shape() {
        let id = generated_adapter_id();
        let suffix = id.strip_prefix("tool.workflow.").unwrap();
        assert_eq!(suffix.len(), 12);
        assert!(suffix.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
