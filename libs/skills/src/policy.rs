//! Policy evaluator
//!
//! Pure checks run by the installer before any state changes: dependency
//! satisfaction against the adapter manager and permission risk
//! classification against the install mode.

use serde::{Deserialize, Serialize};

use axon_adapters::AdapterManager;
use axon_domain::InstallMode;

use crate::manifest::{DependencySpec, PermissionSpec};

/// Tables a skill may touch without triggering a permission risk.
const DATABASE_WHITELIST: [&str; 2] = ["workflows", "workflow_executions"];

/// File system access is only risk-free under this prefix.
const SAFE_PATH_PREFIX: &str = "/tmp";

// =============================================================================
// Dependency Check
// =============================================================================

/// Result of checking a manifest's adapter dependencies.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyReport {
    pub ok: bool,
    /// Required dependencies absent from the registry.
    pub missing: Vec<String>,
    /// Required dependencies that failed to auto-start.
    pub start_failed: Vec<String>,
    /// Optional-dependency problems and non-fatal notes.
    pub warnings: Vec<String>,
}

/// Walk the declared dependencies against the live registry.
///
/// Required entries missing from the registry are fatal; present-but-stopped
/// entries with `auto_start` are started here, and a start failure is fatal
/// only for required entries. Optional-dependency problems become warnings.
pub async fn check_dependencies(
    manager: &AdapterManager,
    dependencies: &[DependencySpec],
) -> DependencyReport {
    let mut report = DependencyReport::default();

    for dep in dependencies {
        let Some(snapshot) = manager.get_adapter(&dep.adapter_id).await else {
            if dep.required {
                report.missing.push(dep.adapter_id.clone());
            } else {
                report
                    .warnings
                    .push(format!("optional dependency missing: {}", dep.adapter_id));
            }
            continue;
        };

        if snapshot.is_running() {
            continue;
        }

        if dep.auto_start {
            if let Err(e) = manager.start_adapter(&dep.adapter_id).await {
                if dep.required {
                    tracing::warn!(adapter_id = %dep.adapter_id, error = %e, "required dependency failed to start");
                    report.start_failed.push(dep.adapter_id.clone());
                } else {
                    report.warnings.push(format!(
                        "optional dependency failed to start: {}",
                        dep.adapter_id
                    ));
                }
            }
        } else {
            report
                .warnings
                .push(format!("dependency not running: {}", dep.adapter_id));
        }
    }

    report.ok = report.missing.is_empty() && report.start_failed.is_empty();
    report
}

// =============================================================================
// Permission Check
// =============================================================================

/// Permission entries classified as risky.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionRisks {
    pub network_access: Vec<String>,
    pub file_system_access: Vec<String>,
    pub database_access: Vec<String>,
}

impl PermissionRisks {
    /// Whether any risk was found.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.network_access.is_empty()
            && self.file_system_access.is_empty()
            && self.database_access.is_empty()
    }
}

/// Outcome of the permission policy for a given install mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionVerdict {
    /// No risks found.
    Allowed,
    /// Risks found under strict mode.
    Rejected(PermissionRisks),
    /// Risks found under approval mode; an approval record is required.
    NeedsApproval(PermissionRisks),
}

/// Classify requested permissions against the v0 risk rules.
///
/// Any network access is a risk; file system paths outside /tmp are risks;
/// database tables outside the whitelist are risks.
#[must_use]
pub fn check_permissions(permissions: &PermissionSpec, mode: InstallMode) -> PermissionVerdict {
    let risks = PermissionRisks {
        network_access: permissions.network_access.clone(),
        file_system_access: permissions
            .file_system_access
            .iter()
            .filter(|path| !path.is_empty() && !path.starts_with(SAFE_PATH_PREFIX))
            .cloned()
            .collect(),
        database_access: permissions
            .database_access
            .iter()
            .filter(|table| !DATABASE_WHITELIST.contains(&table.as_str()))
            .cloned()
            .collect(),
    };

    if risks.is_empty() {
        return PermissionVerdict::Allowed;
    }

    match mode {
        InstallMode::Strict => PermissionVerdict::Rejected(risks),
        InstallMode::AllowWithApproval => PermissionVerdict::NeedsApproval(risks),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_permissions_allowed() {
        let permissions = PermissionSpec {
            database_access: vec!["workflows".into(), "workflow_executions".into()],
            file_system_access: vec!["/tmp/skill-scratch".into()],
            network_access: vec![],
        };
        assert_eq!(
            check_permissions(&permissions, InstallMode::Strict),
            PermissionVerdict::Allowed
        );
    }

    #[test]
    fn test_network_access_is_always_a_risk() {
        let permissions = PermissionSpec {
            network_access: vec!["https://evil.com".into()],
            ..PermissionSpec::default()
        };

        match check_permissions(&permissions, InstallMode::Strict) {
            PermissionVerdict::Rejected(risks) => {
                assert_eq!(risks.network_access, vec!["https://evil.com".to_string()]);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }

        assert!(matches!(
            check_permissions(&permissions, InstallMode::AllowWithApproval),
            PermissionVerdict::NeedsApproval(_)
        ));
    }

    #[test]
    fn test_paths_outside_tmp_are_risks() {
        let permissions = PermissionSpec {
            file_system_access: vec!["/tmp/ok".into(), "/etc/passwd".into(), String::new()],
            ..PermissionSpec::default()
        };

        match check_permissions(&permissions, InstallMode::Strict) {
            PermissionVerdict::Rejected(risks) => {
                assert_eq!(risks.file_system_access, vec!["/etc/passwd".to_string()]);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }

    #[test]
    fn test_tables_outside_whitelist_are_risks() {
        let permissions = PermissionSpec {
            database_access: vec!["workflows".into(), "users".into()],
            ..PermissionSpec::default()
        };

        match check_permissions(&permissions, InstallMode::Strict) {
            PermissionVerdict::Rejected(risks) => {
                assert_eq!(risks.database_access, vec!["users".to_string()]);
            }
            other => panic!("unexpected verdict: {other:?}"),
        }
    }
}
