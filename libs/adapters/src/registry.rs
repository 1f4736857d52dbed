//! In-memory adapter registry entries
//!
//! The registry itself is a `HashMap<String, AdapterRegistration>` owned by
//! the manager behind a single read-write lock; this module defines the entry
//! type and the read-only snapshot handed to callers.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use axon_domain::{AdapterConfig, AdapterState};

use crate::adapter::Adapter;

/// Live registry entry: configuration + lifecycle state + optional instance.
///
/// At most one instance exists per adapter id. `process_gate` is present only
/// for non-reentrant adapters and serializes their `process` calls.
pub struct AdapterRegistration {
    pub config: AdapterConfig,
    pub state: AdapterState,
    pub instance: Option<Arc<dyn Adapter>>,
    pub process_gate: Option<Arc<Mutex<()>>>,
    pub usage_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl AdapterRegistration {
    /// Fresh entry in the `registered` state.
    #[must_use]
    pub fn new(config: AdapterConfig) -> Self {
        Self {
            config,
            state: AdapterState::Registered,
            instance: None,
            process_gate: None,
            usage_count: 0,
            last_used_at: None,
        }
    }

    /// Whether a live instance is attached and serving.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == AdapterState::Running && self.instance.is_some()
    }

    /// Detach the instance and gate, recording the new state.
    pub fn clear_instance(&mut self, state: AdapterState) {
        self.instance = None;
        self.process_gate = None;
        self.state = state;
    }

    /// Read-only snapshot for callers outside the lock.
    #[must_use]
    pub fn snapshot(&self) -> RegistrationSnapshot {
        RegistrationSnapshot {
            config: self.config.clone(),
            state: self.state,
            has_instance: self.instance.is_some(),
            usage_count: self.usage_count,
            last_used_at: self.last_used_at,
        }
    }
}

/// Read-only view of a registration.
#[derive(Debug, Clone)]
pub struct RegistrationSnapshot {
    pub config: AdapterConfig,
    pub state: AdapterState,
    pub has_instance: bool,
    pub usage_count: u64,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl RegistrationSnapshot {
    /// Whether the adapter is running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == AdapterState::Running && self.has_instance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::AdapterType;

    #[test]
    fn test_fresh_registration_state() {
        let config = AdapterConfig::new("system.echo", "Echo", AdapterType::Soft, "EchoAdapter");
        let registration = AdapterRegistration::new(config);

        assert_eq!(registration.state, AdapterState::Registered);
        assert!(!registration.is_running());
        assert!(registration.instance.is_none());

        let snapshot = registration.snapshot();
        assert!(!snapshot.is_running());
        assert_eq!(snapshot.usage_count, 0);
    }
}
