//! Statically-registered adapter factory
//!
//! Configurations carry an `adapter_class` string; this table maps each class
//! to a builder closure. Dynamic code loading is deliberately absent: every
//! class available in a process is registered here at startup, and
//! registration of an unknown class fails fast.
//!
//! The table is interior-mutable because the `WorkflowAdapter` builder closes
//! over the workflow service, which is constructed after the manager already
//! holds the factory handle.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use axon_domain::AdapterConfig;

use crate::adapter::{Adapter, AdapterError};
use crate::builtin::{EchoAdapter, LoggerAdapter, MoodDiaryStoreAdapter};

/// Adapter class bound to workflow execution. The builder for this class is
/// installed by the workflow engine at startup and must be present before any
/// skill installation.
pub const WORKFLOW_ADAPTER_CLASS: &str = "WorkflowAdapter";

type AdapterBuilder =
    Arc<dyn Fn(&AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> + Send + Sync>;

/// Registry of adapter builders keyed by `adapter_class`.
#[derive(Default)]
pub struct AdapterFactory {
    builders: RwLock<HashMap<String, AdapterBuilder>>,
}

impl AdapterFactory {
    /// Create an empty factory
    #[must_use]
    pub fn new() -> Self {
        Self {
            builders: RwLock::new(HashMap::new()),
        }
    }

    /// Create a factory with the built-in adapter classes registered
    #[must_use]
    pub fn with_builtins() -> Self {
        let factory = Self::new();
        factory.register("LoggerAdapter", |config| {
            Ok(Arc::new(LoggerAdapter::new(config)) as Arc<dyn Adapter>)
        });
        factory.register("EchoAdapter", |_config| {
            Ok(Arc::new(EchoAdapter) as Arc<dyn Adapter>)
        });
        factory.register("MoodDiaryStoreAdapter", |_config| {
            Ok(Arc::new(MoodDiaryStoreAdapter::new()) as Arc<dyn Adapter>)
        });
        factory
    }

    /// Register a builder for an adapter class.
    ///
    /// # Panics
    /// Panics if the builder table lock is poisoned.
    pub fn register<F>(&self, adapter_class: impl Into<String>, builder: F)
    where
        F: Fn(&AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> + Send + Sync + 'static,
    {
        let mut builders = self.builders.write().expect("factory lock poisoned");
        builders.insert(adapter_class.into(), Arc::new(builder));
    }

    /// Whether a class is registered.
    ///
    /// # Panics
    /// Panics if the builder table lock is poisoned.
    #[must_use]
    pub fn contains(&self, adapter_class: &str) -> bool {
        let builders = self.builders.read().expect("factory lock poisoned");
        builders.contains_key(adapter_class)
    }

    /// Build an instance from a configuration.
    ///
    /// # Panics
    /// Panics if the builder table lock is poisoned.
    pub fn build(&self, config: &AdapterConfig) -> Result<Arc<dyn Adapter>, AdapterError> {
        let builder = {
            let builders = self.builders.read().expect("factory lock poisoned");
            builders
                .get(&config.adapter_class)
                .cloned()
                .ok_or_else(|| AdapterError::UnknownClass(config.adapter_class.clone()))?
        };
        builder(config)
    }

    /// List registered class names.
    ///
    /// # Panics
    /// Panics if the builder table lock is poisoned.
    #[must_use]
    pub fn classes(&self) -> Vec<String> {
        let builders = self.builders.read().expect("factory lock poisoned");
        builders.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::AdapterType;

    #[test]
    fn test_builtins_registered() {
        let factory = AdapterFactory::with_builtins();
        assert!(factory.contains("LoggerAdapter"));
        assert!(factory.contains("EchoAdapter"));
        assert!(factory.contains("MoodDiaryStoreAdapter"));
        assert!(!factory.contains(WORKFLOW_ADAPTER_CLASS));
    }

    #[test]
    fn test_unknown_class_fails_fast() {
        let factory = AdapterFactory::with_builtins();
        let config = AdapterConfig::new("x", "X", AdapterType::Hard, "NoSuchAdapter");
        assert!(matches!(
            factory.build(&config),
            Err(AdapterError::UnknownClass(_))
        ));
    }

    #[test]
    fn test_late_registration_visible() {
        let factory = AdapterFactory::with_builtins();
        factory.register(WORKFLOW_ADAPTER_CLASS, |_config| {
            Ok(Arc::new(EchoAdapter) as Arc<dyn Adapter>)
        });
        assert!(factory.contains(WORKFLOW_ADAPTER_CLASS));
    }

    #[test]
    fn test_build_logger() {
        let factory = AdapterFactory::with_builtins();
        let config =
            AdapterConfig::new("system.logger", "Logger", AdapterType::Hard, "LoggerAdapter");
        assert!(factory.build(&config).is_ok());
    }
}
