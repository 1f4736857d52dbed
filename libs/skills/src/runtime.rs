//! Skill invocation runtime
//!
//! Implements the execute-skill semantics used by the HTTP edge: ensure the
//! adapter manager is serving, auto-install builtins on first use, rebuild
//! workflow adapters from the stored manifest after a restart, invoke the
//! adapter, and optionally wait for the workflow's terminal output.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

use axon_adapters::{
    AdapterError, AdapterManager, ExecutionContext, ProcessOutcome, WORKFLOW_ADAPTER_CLASS,
};
use axon_db::InstallationRepository;
use axon_domain::{
    AdapterConfig, AdapterType, ExecutionId, ExecutionStatus, InstallMode, SkillInstallation,
    UserId,
};
use axon_workflow_engine::{
    WorkflowService, WorkflowServiceError, DEFAULT_POLL_INTERVAL, DEFAULT_WAIT_TIMEOUT,
};

use crate::builtin::{BuiltinSkillLoader, BUILTIN_PREFIX};
use crate::installer::{workflow_adapter_config, InstallerError, SkillInstaller};
use crate::manifest::SkillManifest;

/// Packages under this prefix wait for completion by default, so their
/// callers see the workflow output inline.
const WAIT_BY_DEFAULT_PREFIX: &str = "skill.builtin.mood.";

// =============================================================================
// Errors
// =============================================================================

/// Skill runtime errors
#[derive(Debug, Error)]
pub enum SkillRuntimeError {
    /// No installation exists and the package is not a builtin
    #[error("skill not installed: {0}")]
    NotInstalled(String),

    /// Auto-install of a builtin failed
    #[error("builtin install failed for {package_id}: {reason}")]
    BuiltinInstall { package_id: String, reason: String },

    /// Installation row exists but cannot be used
    #[error("installation record corrupt: {0}")]
    CorruptInstallation(String),

    /// Installer failure
    #[error(transparent)]
    Installer(#[from] InstallerError),

    /// Adapter manager failure
    #[error(transparent)]
    Adapter(#[from] AdapterError),

    /// Workflow service failure
    #[error(transparent)]
    Workflow(#[from] WorkflowServiceError),

    /// Persistence failure
    #[error("storage error: {0}")]
    Storage(String),
}

impl SkillRuntimeError {
    /// Stable machine code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotInstalled(_) => "SKILL_NOT_INSTALLED",
            Self::BuiltinInstall { .. } => "BUILTIN_INSTALL_FAILED",
            Self::CorruptInstallation(_) => "CORRUPT_INSTALLATION",
            Self::Installer(e) => e.code(),
            Self::Adapter(e) => e.code(),
            Self::Workflow(e) => e.code(),
            Self::Storage(_) => "STORAGE_ERROR",
        }
    }
}

// =============================================================================
// Invocation Types
// =============================================================================

/// Options for one skill invocation.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Wait for the workflow to finish. Defaults to true for
    /// `skill.builtin.mood.*` packages, false otherwise.
    pub wait: Option<bool>,
    pub wait_timeout: Option<Duration>,
    pub poll_interval: Option<Duration>,
}

/// Result of one skill invocation.
#[derive(Debug)]
pub struct SkillExecution {
    /// The workflow's terminal `result` output when waiting, else the
    /// adapter submission receipt.
    pub result: Value,
    /// The raw adapter process outcome.
    pub execution: ProcessOutcome,
    pub workflow_execution_id: Option<ExecutionId>,
    pub workflow_execution_status: Option<ExecutionStatus>,
    pub workflow_error_message: Option<String>,
    pub package_id: String,
    pub adapter_id: String,
}

// =============================================================================
// Runtime
// =============================================================================

/// Drives skill invocations end to end.
pub struct SkillRuntime {
    installations: Arc<dyn InstallationRepository>,
    installer: Arc<SkillInstaller>,
    builtin_loader: Arc<BuiltinSkillLoader>,
    workflow_service: Arc<WorkflowService>,
    adapter_manager: Arc<AdapterManager>,
}

impl SkillRuntime {
    /// Create a runtime over its collaborators.
    #[must_use]
    pub fn new(
        installations: Arc<dyn InstallationRepository>,
        installer: Arc<SkillInstaller>,
        builtin_loader: Arc<BuiltinSkillLoader>,
        workflow_service: Arc<WorkflowService>,
        adapter_manager: Arc<AdapterManager>,
    ) -> Self {
        Self {
            installations,
            installer,
            builtin_loader,
            workflow_service,
            adapter_manager,
        }
    }

    /// Make sure the platform's own dependency adapters are registered.
    /// Registration is idempotent, so this is safe to call on every
    /// invocation.
    pub async fn ensure_platform_adapters(&self) -> Result<(), AdapterError> {
        let logger = AdapterConfig::new(
            "system.logger",
            "System Logger",
            AdapterType::Hard,
            "LoggerAdapter",
        );
        self.adapter_manager.register_adapter(logger).await?;

        let diary = AdapterConfig::new(
            "mood.diary_store",
            "Mood Diary Store",
            AdapterType::Hard,
            "MoodDiaryStoreAdapter",
        );
        self.adapter_manager.register_adapter(diary).await?;

        Ok(())
    }

    /// Execute an installed skill (installing builtins on first use).
    pub async fn execute_skill(
        &self,
        package_id: &str,
        payload: Value,
        user_id: UserId,
        options: ExecuteOptions,
    ) -> Result<SkillExecution, SkillRuntimeError> {
        if !self.adapter_manager.is_running() {
            self.adapter_manager.initialize().await?;
            self.adapter_manager.start();
        }
        self.ensure_platform_adapters().await?;

        let installation = self.locate_installation(package_id, user_id).await?;
        let adapter_id = installation.adapter_id.clone().ok_or_else(|| {
            SkillRuntimeError::CorruptInstallation(format!(
                "installation {} has no adapter id",
                installation.id
            ))
        })?;

        self.ensure_adapter_serving(&installation, &adapter_id, package_id)
            .await?;

        let ctx = ExecutionContext::new(Some(user_id))
            .with_metadata("package_id", Value::String(package_id.to_string()));
        let outcome = self
            .adapter_manager
            .process_with_adapter(&adapter_id, payload, &ctx)
            .await?;

        let workflow_execution_id: Option<ExecutionId> = outcome
            .output
            .get("workflow_execution_id")
            .and_then(Value::as_str)
            .and_then(|raw| raw.parse().ok());

        let wait = options
            .wait
            .unwrap_or_else(|| package_id.starts_with(WAIT_BY_DEFAULT_PREFIX));

        let mut result = outcome.output.clone();
        let mut workflow_execution_status = None;
        let mut workflow_error_message = None;

        if wait {
            if let Some(execution_id) = workflow_execution_id {
                let record = self
                    .workflow_service
                    .wait_for_completion(
                        &execution_id,
                        options.wait_timeout.unwrap_or(DEFAULT_WAIT_TIMEOUT),
                        options.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
                    )
                    .await?;

                workflow_execution_status = Some(record.execution_status);
                workflow_error_message = record.error_message.clone();

                // Output may legitimately be absent when the workflow failed
                // before writing it; `result` then stays the receipt.
                if let Some(output) = record.output_data {
                    result = output
                        .get("result")
                        .cloned()
                        .unwrap_or(output);
                }
            }
        }

        Ok(SkillExecution {
            result,
            execution: outcome,
            workflow_execution_id,
            workflow_execution_status,
            workflow_error_message,
            package_id: package_id.to_string(),
            adapter_id,
        })
    }

    /// Find the caller's installation, auto-installing builtin packages.
    async fn locate_installation(
        &self,
        package_id: &str,
        user_id: UserId,
    ) -> Result<SkillInstallation, SkillRuntimeError> {
        if let Some(installation) = self
            .installations
            .find_installed(&user_id, package_id)
            .await
            .map_err(|e| SkillRuntimeError::Storage(e.to_string()))?
        {
            return Ok(installation);
        }

        if !package_id.starts_with(BUILTIN_PREFIX) {
            return Err(SkillRuntimeError::NotInstalled(package_id.to_string()));
        }

        let manifest =
            self.builtin_loader
                .load(package_id)
                .await
                .map_err(|e| SkillRuntimeError::BuiltinInstall {
                    package_id: package_id.to_string(),
                    reason: e.to_string(),
                })?;

        let outcome = self
            .installer
            .install(&manifest, user_id, InstallMode::Strict)
            .await?;
        tracing::info!(package_id, "builtin skill auto-installed");
        Ok(outcome.installation)
    }

    /// Make sure the installation's adapter is registered with the right
    /// class and running. Handles the restart case where the registry was
    /// cleared or restored under a stale class.
    async fn ensure_adapter_serving(
        &self,
        installation: &SkillInstallation,
        adapter_id: &str,
        package_id: &str,
    ) -> Result<(), SkillRuntimeError> {
        let mut snapshot = self.adapter_manager.get_adapter(adapter_id).await;

        // A workflow tool registered under any other class is stale.
        let stale_class = snapshot.as_ref().and_then(|existing| {
            (adapter_id.starts_with("tool.workflow.")
                && existing.config.adapter_class != WORKFLOW_ADAPTER_CLASS)
                .then(|| existing.config.adapter_class.clone())
        });
        if let Some(stored_class) = stale_class {
            tracing::warn!(
                adapter_id,
                %stored_class,
                "replacing workflow adapter registered under stale class"
            );
            let _ = self.adapter_manager.stop_adapter(adapter_id, true).await;
            self.adapter_manager.unregister_adapter(adapter_id).await?;
            snapshot = None;
        }

        if snapshot.is_none() {
            // Rebuild from the stored manifest; fall back to the bundled
            // resource for builtins with a corrupt stored copy.
            let manifest: SkillManifest =
                match serde_json::from_value(installation.manifest.clone()) {
                    Ok(manifest) => manifest,
                    Err(e) if package_id.starts_with(BUILTIN_PREFIX) => {
                        tracing::warn!(package_id, error = %e, "stored manifest invalid, reloading builtin");
                        self.builtin_loader.load(package_id).await.map_err(|e| {
                            SkillRuntimeError::CorruptInstallation(e.to_string())
                        })?
                    }
                    Err(e) => {
                        return Err(SkillRuntimeError::CorruptInstallation(format!(
                            "stored manifest for {package_id} does not parse: {e}"
                        )));
                    }
                };

            let workflow_id = installation.workflow_id.ok_or_else(|| {
                SkillRuntimeError::CorruptInstallation(format!(
                    "installation {} has no workflow id",
                    installation.id
                ))
            })?;

            let config = workflow_adapter_config(&manifest, adapter_id, &workflow_id);
            self.adapter_manager.register_adapter(config).await?;
        }

        let running = self
            .adapter_manager
            .get_adapter(adapter_id)
            .await
            .is_some_and(|s| s.is_running());
        if !running {
            self.adapter_manager.start_adapter(adapter_id).await?;
        }

        Ok(())
    }
}
