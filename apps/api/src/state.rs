//! Shared application state

use std::sync::Arc;

use axon_adapters::AdapterManager;
use axon_skills::{SkillInstaller, SkillRuntime};
use axon_workflow_engine::WorkflowService;

/// Handles threaded through every request handler.
///
/// The adapter manager is process-wide but reached only through this state;
/// nothing reads it ambiently.
#[derive(Clone)]
pub struct AppState {
    pub adapter_manager: Arc<AdapterManager>,
    pub workflow_service: Arc<WorkflowService>,
    pub installer: Arc<SkillInstaller>,
    pub runtime: Arc<SkillRuntime>,
}
