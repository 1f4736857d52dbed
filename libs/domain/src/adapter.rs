//! Adapter configuration entity
//!
//! The persisted description of how to instantiate an adapter. A registration
//! (configuration + live instance + lifecycle state) is an in-memory concern
//! and lives in the adapters crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::enums::AdapterType;

/// Persisted adapter configuration.
///
/// `adapter_id` is globally unique and immutable. `dependencies` lists the
/// adapter ids this adapter requires to be running before it can start; the
/// set must stay acyclic across the whole registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    pub adapter_id: String,
    pub name: String,
    pub adapter_type: AdapterType,
    /// Key into the adapter factory table, e.g. `"WorkflowAdapter"`.
    pub adapter_class: String,
    pub version: String,
    /// Opaque adapter-specific configuration.
    #[serde(default)]
    pub config: Map<String, Value>,
    #[serde(default)]
    pub dependencies: BTreeSet<String>,
    pub description: Option<String>,
    pub author: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub is_enabled: bool,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub usage_count: i64,
}

impl AdapterConfig {
    /// Create a new enabled configuration with empty metadata.
    #[must_use]
    pub fn new(
        adapter_id: impl Into<String>,
        name: impl Into<String>,
        adapter_type: AdapterType,
        adapter_class: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            adapter_id: adapter_id.into(),
            name: name.into(),
            adapter_type,
            adapter_class: adapter_class.into(),
            version: "1.0.0".to_string(),
            config: Map::new(),
            dependencies: BTreeSet::new(),
            description: None,
            author: None,
            tags: Vec::new(),
            is_enabled: true,
            status: "registered".to_string(),
            created_at: now,
            updated_at: now,
            last_used_at: None,
            usage_count: 0,
        }
    }

    /// Set the opaque config map.
    #[must_use]
    pub fn with_config(mut self, config: Map<String, Value>) -> Self {
        self.config = config;
        self
    }

    /// Set the dependency set.
    #[must_use]
    pub fn with_dependencies<I, S>(mut self, deps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = deps.into_iter().map(Into::into).collect();
        self
    }

    /// Set the version string.
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let cfg = AdapterConfig::new("system.logger", "Logger", AdapterType::Hard, "LoggerAdapter")
            .with_dependencies(["system.clock"]);

        assert!(cfg.is_enabled);
        assert_eq!(cfg.usage_count, 0);
        assert_eq!(cfg.version, "1.0.0");
        assert!(cfg.dependencies.contains("system.clock"));
    }
}
