//! Skill manifest schema and structural validation
//!
//! A manifest bundles a workflow graph with a bound workflow adapter. The
//! validator rejects anything the installer could not turn into a runnable
//! skill; serializing a valid manifest and parsing it back yields an equal
//! manifest.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use utoipa::ToSchema;

use axon_adapters::WORKFLOW_ADAPTER_CLASS;
use axon_domain::{AdapterType, TriggerType, WorkflowDefinition};

/// The only manifest version this platform accepts.
pub const SUPPORTED_MANIFEST_VERSION: &str = "0.1";

// =============================================================================
// Errors
// =============================================================================

/// Manifest validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ManifestError {
    /// A field violates the schema
    #[error("invalid manifest field '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// The manifest version is not supported
    #[error("unsupported manifest version: {0}")]
    UnsupportedVersion(String),
}

impl ManifestError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Stable machine code for the error kind.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Invalid { .. } => "INVALID_MANIFEST",
            Self::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
        }
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Workflow bundled in a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WorkflowSpec {
    pub slug: String,
    pub name: String,
    pub trigger_type: TriggerType,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub trigger_config: Map<String, Value>,
    pub definition: WorkflowDefinition,
}

/// Workflow adapter bound by a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WorkflowAdapterSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    pub name: String,
    pub adapter_type: AdapterType,
    pub adapter_class: String,
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_mode: Option<String>,
}

/// Adapter dependency declared by a manifest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
pub struct DependencySpec {
    pub adapter_id: String,
    #[serde(default = "default_required")]
    pub required: bool,
    #[serde(default)]
    pub auto_start: bool,
}

fn default_required() -> bool {
    true
}

/// Permissions requested by a manifest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct PermissionSpec {
    #[serde(default)]
    pub database_access: Vec<String>,
    #[serde(default)]
    pub file_system_access: Vec<String>,
    #[serde(default)]
    pub network_access: Vec<String>,
}

/// A declarative skill package.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SkillManifest {
    pub manifest_version: String,
    pub package_id: String,
    pub name: String,
    pub version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub workflow: WorkflowSpec,
    pub workflow_adapter: WorkflowAdapterSpec,
    #[serde(default)]
    pub dependencies: Vec<DependencySpec>,
    #[serde(default)]
    pub permissions: PermissionSpec,
}

// =============================================================================
// Validation
// =============================================================================

fn valid_package_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn valid_semver(version: &str) -> bool {
    let parts: Vec<&str> = version.split('.').collect();
    parts.len() == 3 && parts.iter().all(|p| !p.is_empty() && p.chars().all(|c| c.is_ascii_digit()))
}

impl SkillManifest {
    /// Validate the manifest structurally.
    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.manifest_version != SUPPORTED_MANIFEST_VERSION {
            return Err(ManifestError::UnsupportedVersion(
                self.manifest_version.clone(),
            ));
        }

        let segments: Vec<&str> = self.package_id.split('.').collect();
        if segments.len() < 2
            || segments[0] != "skill"
            || !segments[1..].iter().all(|s| valid_package_segment(s))
        {
            return Err(ManifestError::invalid(
                "package_id",
                format!(
                    "must match skill.<name>[.<sub>] with alphanumeric segments, got '{}'",
                    self.package_id
                ),
            ));
        }

        if self.name.trim().is_empty() {
            return Err(ManifestError::invalid("name", "must not be empty"));
        }

        if !valid_semver(&self.version) {
            return Err(ManifestError::invalid(
                "version",
                format!("must be semver (x.y.z), got '{}'", self.version),
            ));
        }

        if self.workflow.slug.trim().is_empty() {
            return Err(ManifestError::invalid("workflow.slug", "must not be empty"));
        }
        if self.workflow.definition.nodes.is_empty() {
            return Err(ManifestError::invalid(
                "workflow.definition",
                "must contain at least one node",
            ));
        }

        if self.workflow_adapter.adapter_class != WORKFLOW_ADAPTER_CLASS {
            return Err(ManifestError::invalid(
                "workflow_adapter.adapter_class",
                format!("must be '{WORKFLOW_ADAPTER_CLASS}'"),
            ));
        }
        if self.workflow_adapter.adapter_type != AdapterType::Hard {
            return Err(ManifestError::invalid(
                "workflow_adapter.adapter_type",
                "must be 'hard'",
            ));
        }
        // The installer injects the workflow binding; manifests must not
        // carry one.
        if self.workflow_adapter.config.contains_key("workflow_id") {
            return Err(ManifestError::invalid(
                "workflow_adapter.config",
                "must not carry workflow_id",
            ));
        }
        if let Some(kind) = &self.workflow_adapter.kind {
            if kind != "workflow" {
                return Err(ManifestError::invalid(
                    "workflow_adapter.kind",
                    format!("must be 'workflow', got '{kind}'"),
                ));
            }
        }
        if let Some(run_mode) = &self.workflow_adapter.run_mode {
            if run_mode != "async" {
                return Err(ManifestError::invalid(
                    "workflow_adapter.run_mode",
                    format!("must be 'async', got '{run_mode}'"),
                ));
            }
        }

        for (idx, dep) in self.dependencies.iter().enumerate() {
            if dep.adapter_id.trim().is_empty() {
                return Err(ManifestError::invalid(
                    &format!("dependencies[{idx}].adapter_id"),
                    "must not be empty",
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    pub(crate) fn sample_manifest() -> SkillManifest {
        serde_json::from_value(json!({
            "manifest_version": "0.1",
            "package_id": "skill.example.hello_world",
            "name": "Hello World",
            "version": "1.0.0",
            "description": "Logs a greeting",
            "author": "axon",
            "tags": ["example"],
            "workflow": {
                "slug": "hello-world",
                "name": "Hello World",
                "trigger_type": "manual",
                "trigger_config": {},
                "definition": {
                    "nodes": [
                        {"id": "start", "type": "start"},
                        {"id": "log", "type": "adapter", "config": {
                            "adapter_id": "system.logger",
                            "parameters": {"message": "hello"},
                            "output_variable": "log_result"
                        }},
                        {"id": "finish", "type": "end", "config": {"output": {"result": "${log_result}"}}}
                    ],
                    "edges": [
                        {"source": "start", "target": "log"},
                        {"source": "log", "target": "finish"}
                    ]
                }
            },
            "workflow_adapter": {
                "name": "hello world adapter",
                "adapter_type": "hard",
                "adapter_class": "WorkflowAdapter",
                "config": {}
            },
            "dependencies": [
                {"adapter_id": "system.logger", "required": true, "auto_start": true}
            ],
            "permissions": {
                "database_access": ["workflows"],
                "file_system_access": [],
                "network_access": []
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_manifest_passes() {
        sample_manifest().validate().unwrap();
    }

    #[test]
    fn test_serde_round_trip_preserves_manifest() {
        let manifest = sample_manifest();
        let serialized = serde_json::to_string(&manifest).unwrap();
        let parsed: SkillManifest = serde_json::from_str(&serialized).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed, manifest);
    }

    #[test]
    fn test_unsupported_version_rejected() {
        let mut manifest = sample_manifest();
        manifest.manifest_version = "0.2".to_string();
        assert_eq!(
            manifest.validate().unwrap_err().code(),
            "UNSUPPORTED_VERSION"
        );
    }

    #[test]
    fn test_bad_package_id_rejected() {
        for bad in ["tool.example", "skill", "skill.", "skill.has space", "skill.bad-dash!"] {
            let mut manifest = sample_manifest();
            manifest.package_id = bad.to_string();
            let err = manifest.validate().unwrap_err();
            assert_eq!(err.code(), "INVALID_MANIFEST", "{bad}");
        }
    }

    #[test]
    fn test_wrong_adapter_class_rejected() {
        let mut manifest = sample_manifest();
        manifest.workflow_adapter.adapter_class = "EchoAdapter".to_string();
        let err = manifest.validate().unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { field, .. } if field.contains("adapter_class")));
    }

    #[test]
    fn test_workflow_id_in_config_rejected() {
        let mut manifest = sample_manifest();
        manifest
            .workflow_adapter
            .config
            .insert("workflow_id".to_string(), json!("wf_123"));
        let err = manifest.validate().unwrap_err();
        assert!(matches!(err, ManifestError::Invalid { field, .. } if field.contains("config")));
    }

    #[test]
    fn test_kind_and_run_mode_constrained() {
        let mut manifest = sample_manifest();
        manifest.workflow_adapter.kind = Some("tool".to_string());
        assert!(manifest.validate().is_err());

        let mut manifest = sample_manifest();
        manifest.workflow_adapter.kind = Some("workflow".to_string());
        manifest.workflow_adapter.run_mode = Some("async".to_string());
        manifest.validate().unwrap();

        manifest.workflow_adapter.run_mode = Some("sync".to_string());
        assert!(manifest.validate().is_err());
    }

    #[test]
    fn test_bad_semver_rejected() {
        for bad in ["1.0", "1.0.0.0", "v1.0.0", "1.a.0"] {
            let mut manifest = sample_manifest();
            manifest.version = bad.to_string();
            assert!(manifest.validate().is_err(), "{bad}");
        }
    }
}
