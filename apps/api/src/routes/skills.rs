//! Skill management endpoints
//!
//! Install, list, uninstall, and execute skill packages. All handlers return
//! a shaped `{success, status, data, error}` envelope; install-policy
//! failures come back as HTTP 200 with `success: false` so callers can act
//! on the machine code.

use std::time::Duration;

use axum::{
    extract::{Path, Query},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use axon_db::Pagination;
use axon_domain::{InstallMode, SkillInstallation};
use axon_skills::{ExecuteOptions, InstallerError, SkillManifest, SkillRuntimeError};

use crate::error::ApiError;
use crate::extractors::CurrentUser;
use crate::state::AppState;

/// Skill routes
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/install", post(install_skill))
        .route("/installed", get(list_installed_skills))
        .route("/{package_id}/uninstall", post(uninstall_skill))
        .route("/{package_id}/execute", post(execute_skill))
        .layer(Extension(state))
}

// =============================================================================
// Envelope
// =============================================================================

/// Shaped response envelope
#[derive(Debug, Serialize)]
pub struct ApiEnvelope<T: serde::Serialize> {
    pub success: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EnvelopeError>,
}

/// Machine-readable error payload
#[derive(Debug, Serialize)]
pub struct EnvelopeError {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl<T: serde::Serialize> ApiEnvelope<T> {
    fn ok(status: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            status: status.into(),
            data: Some(data),
            error: None,
        }
    }

    fn rejected(status: impl Into<String>, code: &str, message: String, details: Option<Value>) -> Self {
        Self {
            success: false,
            status: status.into(),
            data: None,
            error: Some(EnvelopeError {
                code: code.to_string(),
                message,
                details,
            }),
        }
    }
}

// =============================================================================
// Install
// =============================================================================

/// Request to install a skill package
#[derive(Debug, Deserialize)]
pub struct InstallSkillRequest {
    pub manifest: SkillManifest,
    #[serde(default)]
    pub install_mode: InstallMode,
}

/// Successful install payload
#[derive(Debug, Serialize)]
pub struct InstallSkillResponse {
    pub status: String,
    pub package_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub installation_id: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    pub already_installed: bool,
}

/// Install a skill package
#[utoipa::path(
    post,
    path = "/api/v1/skills/install",
    tag = "skills",
    responses(
        (status = 200, description = "Install result envelope"),
        (status = 401, description = "Missing user header")
    )
)]
pub async fn install_skill(
    CurrentUser(user_id): CurrentUser,
    Extension(state): Extension<AppState>,
    Json(body): Json<InstallSkillRequest>,
) -> Result<Json<ApiEnvelope<InstallSkillResponse>>, ApiError> {
    match state
        .installer
        .install(&body.manifest, user_id, body.install_mode)
        .await
    {
        Ok(outcome) => {
            let installation = &outcome.installation;
            Ok(Json(ApiEnvelope::ok(
                outcome.status.to_string(),
                InstallSkillResponse {
                    status: outcome.status.to_string(),
                    package_id: installation.package_id.clone(),
                    adapter_id: installation.adapter_id.clone(),
                    workflow_id: installation.workflow_id.map(|id| id.to_string()),
                    installation_id: installation.id.to_string(),
                    warnings: outcome.warnings,
                    already_installed: outcome.already_installed,
                },
            )))
        }
        // Policy rejections are part of the protocol, not transport errors.
        Err(e @ InstallerError::PermissionDenied(_)) => {
            let details = match &e {
                InstallerError::PermissionDenied(risks) => serde_json::to_value(risks).ok(),
                _ => None,
            };
            Ok(Json(ApiEnvelope::rejected(
                "failed",
                e.code(),
                e.to_string(),
                details,
            )))
        }
        Err(
            e @ (InstallerError::DependencyUnsatisfied { .. } | InstallerError::Manifest(_)),
        ) => Ok(Json(ApiEnvelope::rejected(
            "failed",
            e.code(),
            e.to_string(),
            None,
        ))),
        Err(e) => Err(e.into()),
    }
}

// =============================================================================
// List
// =============================================================================

/// Query parameters for listing installed skills
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub skip: i64,
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    20
}

/// One installed skill
#[derive(Debug, Serialize)]
pub struct InstallationItem {
    pub installation_id: String,
    pub package_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub installed_at: String,
}

impl From<SkillInstallation> for InstallationItem {
    fn from(i: SkillInstallation) -> Self {
        Self {
            installation_id: i.id.to_string(),
            package_id: i.package_id,
            adapter_id: i.adapter_id,
            workflow_id: i.workflow_id.map(|id| id.to_string()),
            installed_at: i.installed_at.to_rfc3339(),
        }
    }
}

/// Page of installed skills
#[derive(Debug, Serialize)]
pub struct ListInstalledResponse {
    pub items: Vec<InstallationItem>,
    pub total: i64,
}

/// List the caller's installed skills
#[utoipa::path(
    get,
    path = "/api/v1/skills/installed",
    tag = "skills",
    responses(
        (status = 200, description = "Installed skills envelope"),
        (status = 401, description = "Missing user header")
    )
)]
pub async fn list_installed_skills(
    CurrentUser(user_id): CurrentUser,
    Extension(state): Extension<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiEnvelope<ListInstalledResponse>>, ApiError> {
    let pagination = Pagination::new(query.skip, query.limit);
    let page = state
        .installer
        .list_installed(&user_id, &pagination)
        .await
        .map_err(ApiError::from)?;

    let total = page.total;
    Ok(Json(ApiEnvelope::ok(
        "ok",
        ListInstalledResponse {
            items: page.items.into_iter().map(Into::into).collect(),
            total,
        },
    )))
}

// =============================================================================
// Uninstall
// =============================================================================

/// Uninstall payload
#[derive(Debug, Serialize)]
pub struct UninstallSkillResponse {
    pub status: String,
    pub package_id: String,
}

/// Uninstall a skill package
#[utoipa::path(
    post,
    path = "/api/v1/skills/{package_id}/uninstall",
    tag = "skills",
    params(("package_id" = String, Path, description = "Skill package id")),
    responses(
        (status = 200, description = "Uninstall result envelope"),
        (status = 404, description = "Skill not installed")
    )
)]
pub async fn uninstall_skill(
    CurrentUser(user_id): CurrentUser,
    Extension(state): Extension<AppState>,
    Path(package_id): Path<String>,
) -> Result<Json<ApiEnvelope<UninstallSkillResponse>>, ApiError> {
    let outcome = state
        .installer
        .uninstall(&package_id, user_id)
        .await
        .map_err(ApiError::from)?;

    Ok(Json(ApiEnvelope::ok(
        "uninstalled",
        UninstallSkillResponse {
            status: "uninstalled".to_string(),
            package_id: outcome.installation.package_id,
        },
    )))
}

// =============================================================================
// Execute
// =============================================================================

/// Execute payload
#[derive(Debug, Serialize)]
pub struct ExecuteSkillResponse {
    pub result: Value,
    pub execution: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_execution_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_execution_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_error_message: Option<String>,
    pub package_id: String,
    pub adapter_id: String,
}

/// Execute an installed skill
///
/// The request body is the skill payload. Control keys `_wait`,
/// `_wait_timeout_s`, and `_poll_interval_s` are stripped before the payload
/// reaches the adapter.
#[utoipa::path(
    post,
    path = "/api/v1/skills/{package_id}/execute",
    tag = "skills",
    params(("package_id" = String, Path, description = "Skill package id")),
    responses(
        (status = 200, description = "Execution result envelope"),
        (status = 404, description = "Skill not installed")
    )
)]
pub async fn execute_skill(
    CurrentUser(user_id): CurrentUser,
    Extension(state): Extension<AppState>,
    Path(package_id): Path<String>,
    Json(mut payload): Json<Value>,
) -> Result<Json<ApiEnvelope<ExecuteSkillResponse>>, ApiError> {
    let options = extract_options(&mut payload);

    match state
        .runtime
        .execute_skill(&package_id, payload, user_id, options)
        .await
    {
        Ok(execution) => {
            let execution_value = serde_json::to_value(&execution.execution)
                .map_err(|e| ApiError::Internal(e.to_string()))?;
            Ok(Json(ApiEnvelope::ok(
                "ok",
                ExecuteSkillResponse {
                    result: execution.result,
                    execution: execution_value,
                    workflow_execution_id: execution
                        .workflow_execution_id
                        .map(|id| id.to_string()),
                    workflow_execution_status: execution
                        .workflow_execution_status
                        .map(|s| s.to_string()),
                    workflow_error_message: execution.workflow_error_message,
                    package_id: execution.package_id,
                    adapter_id: execution.adapter_id,
                },
            )))
        }
        Err(e @ SkillRuntimeError::NotInstalled(_)) => Err(ApiError::NotFound(e.to_string())),
        Err(e) => Ok(Json(ApiEnvelope::rejected(
            "failed",
            e.code(),
            e.to_string(),
            None,
        ))),
    }
}

/// Pull the wait control keys out of the payload.
fn extract_options(payload: &mut Value) -> ExecuteOptions {
    let Some(map) = payload.as_object_mut() else {
        return ExecuteOptions::default();
    };

    let wait = map
        .remove("_wait")
        .or_else(|| map.remove("wait"))
        .and_then(|v| v.as_bool());
    let wait_timeout = map
        .remove("_wait_timeout_s")
        .and_then(|v| v.as_f64())
        .map(Duration::from_secs_f64);
    let poll_interval = map
        .remove("_poll_interval_s")
        .and_then(|v| v.as_f64())
        .map(Duration::from_secs_f64);

    ExecuteOptions {
        wait,
        wait_timeout,
        poll_interval,
    }
}
