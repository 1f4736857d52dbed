//! Process-wide adapter lifecycle controller
//!
//! The manager owns the registry, orchestrates dependency-ordered start/stop,
//! keeps persisted configurations in sync, and serves the `process` hot path.
//!
//! Locking discipline: one `RwLock` guards the registry. Lookups and health
//! checks take shared access; register/unregister/start/stop take exclusive
//! access for the whole transition so no caller observes an intermediate
//! state. `process_with_adapter` clones the instance handle under the read
//! lock and releases it before calling into the adapter, so long-running
//! processing never blocks registry reads.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::RwLock;

use axon_db::AdapterConfigRepository;
use axon_domain::{AdapterConfig, AdapterState};

use crate::adapter::{
    Adapter, AdapterError, ExecutionContext, HealthReport, ProcessOutcome,
};
use crate::factory::AdapterFactory;
use crate::registry::{AdapterRegistration, RegistrationSnapshot};

type Registry = HashMap<String, AdapterRegistration>;

// =============================================================================
// Dependency Graph Walk
// =============================================================================

/// Depth-first post-order over the dependency graph rooted at `root`.
///
/// Returns ids in start order (dependencies before dependents, `root` last).
/// Unregistered ids are included so the caller can surface them as start
/// failures. A gray-set hit returns the cycle path eagerly, before any state
/// changes.
fn dependency_order(registry: &Registry, root: &str) -> Result<Vec<String>, AdapterError> {
    fn visit(
        registry: &Registry,
        id: &str,
        visiting: &mut Vec<String>,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) -> Result<(), AdapterError> {
        if visited.contains(id) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|v| v == id) {
            let mut cycle: Vec<String> = visiting[pos..].to_vec();
            cycle.push(id.to_string());
            return Err(AdapterError::DependencyCycle(cycle));
        }

        visiting.push(id.to_string());
        if let Some(registration) = registry.get(id) {
            for dep in &registration.config.dependencies {
                visit(registry, dep, visiting, visited, order)?;
            }
        }
        visiting.pop();

        visited.insert(id.to_string());
        order.push(id.to_string());
        Ok(())
    }

    let mut order = Vec::new();
    visit(
        registry,
        root,
        &mut Vec::new(),
        &mut HashSet::new(),
        &mut order,
    )?;
    Ok(order)
}

/// Detect whether inserting `config` would close a dependency cycle.
///
/// A new node can only participate in a cycle through itself, so a single
/// DFS rooted at the incoming id over the union graph suffices.
fn check_no_cycle(registry: &Registry, config: &AdapterConfig) -> Result<(), AdapterError> {
    fn visit(
        registry: &Registry,
        incoming: &AdapterConfig,
        id: &str,
        visiting: &mut Vec<String>,
        visited: &mut HashSet<String>,
    ) -> Result<(), AdapterError> {
        if visited.contains(id) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|v| v == id) {
            let mut cycle: Vec<String> = visiting[pos..].to_vec();
            cycle.push(id.to_string());
            return Err(AdapterError::DependencyCycle(cycle));
        }

        let deps = if id == incoming.adapter_id {
            Some(&incoming.dependencies)
        } else {
            registry.get(id).map(|r| &r.config.dependencies)
        };

        visiting.push(id.to_string());
        if let Some(deps) = deps {
            for dep in deps {
                visit(registry, incoming, dep, visiting, visited)?;
            }
        }
        visiting.pop();
        visited.insert(id.to_string());
        Ok(())
    }

    visit(
        registry,
        config,
        &config.adapter_id,
        &mut Vec::new(),
        &mut HashSet::new(),
    )
}

/// Running adapters that transitively depend on `root`, ordered so each
/// appears before anything it depends on (safe stop order).
fn running_dependents(registry: &Registry, root: &str) -> Vec<String> {
    fn visit(
        registry: &Registry,
        id: &str,
        visited: &mut HashSet<String>,
        order: &mut Vec<String>,
    ) {
        for (candidate, registration) in registry {
            if registration.is_running()
                && registration.config.dependencies.contains(id)
                && !visited.contains(candidate)
            {
                visited.insert(candidate.clone());
                visit(registry, candidate, visited, order);
                order.push(candidate.clone());
            }
        }
    }

    // Post-order of the reverse-dependency DFS already lists dependents
    // before anything they depend on.
    let mut order = Vec::new();
    visit(registry, root, &mut HashSet::new(), &mut order);
    order
}

// =============================================================================
// Adapter Manager
// =============================================================================

/// Single authoritative lifecycle controller for all adapters in the process.
pub struct AdapterManager {
    factory: Arc<AdapterFactory>,
    store: Arc<dyn AdapterConfigRepository>,
    registry: RwLock<Registry>,
    running: AtomicBool,
}

impl AdapterManager {
    /// Create a manager over the given factory and configuration store.
    #[must_use]
    pub fn new(factory: Arc<AdapterFactory>, store: Arc<dyn AdapterConfigRepository>) -> Self {
        Self {
            factory,
            store,
            registry: RwLock::new(HashMap::new()),
            running: AtomicBool::new(false),
        }
    }

    /// Restore persisted configurations into the registry.
    ///
    /// All enabled configurations land in the `registered` state; nothing is
    /// auto-started. Adapters are pulled into `running` lazily by the first
    /// `start_adapter` call that references them.
    pub async fn initialize(&self) -> Result<(), AdapterError> {
        let configs = self
            .store
            .list_enabled()
            .await
            .map_err(|e| AdapterError::Persistence(e.to_string()))?;

        let mut registry = self.registry.write().await;
        for config in configs {
            if !self.factory.contains(&config.adapter_class) {
                tracing::warn!(
                    adapter_id = %config.adapter_id,
                    adapter_class = %config.adapter_class,
                    "skipping restore of configuration with unknown adapter class"
                );
                continue;
            }
            registry
                .entry(config.adapter_id.clone())
                .or_insert_with(|| AdapterRegistration::new(config));
        }

        tracing::info!(restored = registry.len(), "adapter registry restored");
        Ok(())
    }

    /// Mark the manager as serving.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stop all running adapters and mark the manager as stopped.
    pub async fn stop(&self) {
        let ids: Vec<String> = {
            let registry = self.registry.read().await;
            registry
                .iter()
                .filter(|(_, r)| r.is_running())
                .map(|(id, _)| id.clone())
                .collect()
        };

        for id in ids {
            if let Err(e) = self.stop_adapter(&id, true).await {
                tracing::warn!(adapter_id = %id, error = %e, "failed to stop adapter during shutdown");
            }
        }

        self.running.store(false, Ordering::SeqCst);
    }

    /// Whether the manager is serving.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Registration
    // =========================================================================

    /// Add a configuration to the registry and persist it.
    ///
    /// Returns `true` when a new registration was created and `false` for an
    /// idempotent re-registration (same adapter class already present). When
    /// the stored class differs from the incoming one the old registration is
    /// stopped and replaced; this handles restarts against a stale persisted
    /// record. Cycle detection runs over the union of existing configurations
    /// and the incoming one before any state changes.
    pub async fn register_adapter(&self, config: AdapterConfig) -> Result<bool, AdapterError> {
        if !self.factory.contains(&config.adapter_class) {
            return Err(AdapterError::UnknownClass(config.adapter_class));
        }

        let mut registry = self.registry.write().await;

        if let Some(existing) = registry.get(&config.adapter_id) {
            if existing.config.adapter_class == config.adapter_class {
                // Identical re-registration is a no-op; a different
                // configuration under a live id is a caller error.
                if existing.config.config == config.config
                    && existing.config.dependencies == config.dependencies
                {
                    tracing::debug!(
                        adapter_id = %config.adapter_id,
                        "identical re-registration is a no-op"
                    );
                    return Ok(false);
                }
                return Err(AdapterError::AlreadyRegistered(config.adapter_id));
            }

            tracing::warn!(
                adapter_id = %config.adapter_id,
                stored_class = %existing.config.adapter_class,
                incoming_class = %config.adapter_class,
                "stored adapter class differs; replacing stale registration"
            );
            if let Some(instance) = existing.instance.clone() {
                if let Err(e) = instance.stop().await {
                    tracing::warn!(adapter_id = %config.adapter_id, error = %e, "stop of stale instance failed");
                }
                if let Err(e) = instance.cleanup().await {
                    tracing::warn!(adapter_id = %config.adapter_id, error = %e, "cleanup of stale instance failed");
                }
            }
            registry.remove(&config.adapter_id);
        }

        check_no_cycle(&registry, &config)?;

        registry.insert(
            config.adapter_id.clone(),
            AdapterRegistration::new(config.clone()),
        );

        if let Err(e) = self.store.upsert(&config).await {
            registry.remove(&config.adapter_id);
            return Err(AdapterError::Persistence(e.to_string()));
        }

        tracing::info!(adapter_id = %config.adapter_id, "adapter registered");
        Ok(true)
    }

    /// Remove a registration, stopping its instance if running, and delete
    /// the persisted configuration. Returns `false` when nothing was
    /// registered under the id.
    pub async fn unregister_adapter(&self, adapter_id: &str) -> Result<bool, AdapterError> {
        let mut registry = self.registry.write().await;

        let Some(registration) = registry.get(adapter_id) else {
            return Ok(false);
        };

        if let Some(dependent) = registry
            .iter()
            .find(|(_, r)| r.is_running() && r.config.dependencies.contains(adapter_id))
            .map(|(id, _)| id.clone())
        {
            return Err(AdapterError::DependencyViolation {
                adapter_id: adapter_id.to_string(),
                dependent,
            });
        }

        if let Some(instance) = registration.instance.clone() {
            if let Err(e) = instance.stop().await {
                tracing::warn!(adapter_id, error = %e, "stop during unregister failed");
            }
            if let Err(e) = instance.cleanup().await {
                tracing::warn!(adapter_id, error = %e, "cleanup during unregister failed");
            }
        }

        registry.remove(adapter_id);

        self.store
            .delete(adapter_id)
            .await
            .map_err(|e| AdapterError::Persistence(e.to_string()))?;

        tracing::info!(adapter_id, "adapter unregistered");
        Ok(true)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start an adapter, recursively starting its required dependencies
    /// first.
    ///
    /// Every dependency actually started by this call is recorded; on any
    /// failure they are stopped again in reverse order, the failing adapter
    /// is marked `failed`, and the error carries the first failure observed.
    pub async fn start_adapter(&self, adapter_id: &str) -> Result<(), AdapterError> {
        let mut registry = self.registry.write().await;

        let registration = registry
            .get(adapter_id)
            .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?;
        if registration.is_running() {
            return Ok(());
        }

        // Cycle detection happens here, before any state change.
        let order = dependency_order(&registry, adapter_id)?;

        let mut started_here: Vec<String> = Vec::new();

        for id in &order {
            let config = match registry.get(id) {
                None => {
                    let diagnostic = format!("dependency {id} is not registered");
                    Self::rollback_started(&mut registry, &started_here).await;
                    return Err(AdapterError::StartFailed {
                        adapter_id: adapter_id.to_string(),
                        diagnostic,
                    });
                }
                Some(registration) if registration.is_running() => continue,
                Some(registration) => registration.config.clone(),
            };

            if let Some(entry) = registry.get_mut(id) {
                entry.state = AdapterState::Initializing;
            }

            let started = Self::bring_up(&self.factory, &config).await;

            match started {
                Ok((instance, gate)) => {
                    if let Some(entry) = registry.get_mut(id) {
                        entry.instance = Some(instance);
                        entry.process_gate = gate;
                        entry.state = AdapterState::Running;
                    }
                    started_here.push(id.clone());
                    tracing::info!(adapter_id = %id, "adapter running");
                }
                Err(diagnostic) => {
                    if let Some(entry) = registry.get_mut(id) {
                        entry.clear_instance(AdapterState::Failed);
                    }
                    Self::rollback_started(&mut registry, &started_here).await;
                    tracing::error!(adapter_id = %id, %diagnostic, "adapter start failed");
                    return Err(AdapterError::StartFailed {
                        adapter_id: adapter_id.to_string(),
                        diagnostic,
                    });
                }
            }
        }

        Ok(())
    }

    /// Construct and run the bring-up half of the lifecycle. Returns the
    /// instance and its serialization gate, or a diagnostic describing the
    /// first failure.
    async fn bring_up(
        factory: &AdapterFactory,
        config: &AdapterConfig,
    ) -> Result<(Arc<dyn Adapter>, Option<Arc<tokio::sync::Mutex<()>>>), String> {
        let instance = factory
            .build(config)
            .map_err(|e| format!("construction failed: {e}"))?;

        if let Err(e) = instance.initialize().await {
            let _ = instance.cleanup().await;
            return Err(format!("initialize failed: {e}"));
        }

        if let Err(e) = instance.start().await {
            let _ = instance.cleanup().await;
            return Err(format!("start failed: {e}"));
        }

        let gate = if instance.capabilities().reentrant {
            None
        } else {
            Some(Arc::new(tokio::sync::Mutex::new(())))
        };

        Ok((instance, gate))
    }

    /// Stop every adapter started by the current call, in reverse order.
    async fn rollback_started(registry: &mut Registry, started: &[String]) {
        for id in started.iter().rev() {
            if let Some(entry) = registry.get_mut(id) {
                if let Some(instance) = entry.instance.clone() {
                    if let Err(e) = instance.stop().await {
                        tracing::warn!(adapter_id = %id, error = %e, "rollback stop failed");
                    }
                    if let Err(e) = instance.cleanup().await {
                        tracing::warn!(adapter_id = %id, error = %e, "rollback cleanup failed");
                    }
                }
                entry.clear_instance(AdapterState::Stopped);
            }
        }
    }

    /// Stop an adapter and clean up its instance.
    ///
    /// Fails with a dependency violation when running dependents exist,
    /// unless `force` is set, in which case the dependents are torn down
    /// first (dependents before their dependencies). Returns `false` when
    /// the adapter was not running.
    pub async fn stop_adapter(&self, adapter_id: &str, force: bool) -> Result<bool, AdapterError> {
        let mut registry = self.registry.write().await;

        let registration = registry
            .get(adapter_id)
            .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?;
        if !registration.is_running() {
            return Ok(false);
        }

        let dependents = running_dependents(&registry, adapter_id);
        if !dependents.is_empty() && !force {
            return Err(AdapterError::DependencyViolation {
                adapter_id: adapter_id.to_string(),
                dependent: dependents[0].clone(),
            });
        }

        for dependent in &dependents {
            if let Some(entry) = registry.get_mut(dependent) {
                if let Some(instance) = entry.instance.clone() {
                    entry.state = AdapterState::Stopping;
                    if let Err(e) = instance.stop().await {
                        tracing::warn!(adapter_id = %dependent, error = %e, "forced stop of dependent failed");
                    }
                    if let Err(e) = instance.cleanup().await {
                        tracing::warn!(adapter_id = %dependent, error = %e, "cleanup of dependent failed");
                    }
                }
                entry.clear_instance(AdapterState::Stopped);
            }
        }

        let Some(entry) = registry.get_mut(adapter_id) else {
            return Err(AdapterError::NotFound(adapter_id.to_string()));
        };
        entry.state = AdapterState::Stopping;
        let instance = entry.instance.clone();

        if let Some(instance) = instance {
            if let Err(e) = instance.stop().await {
                entry.clear_instance(AdapterState::Failed);
                return Err(AdapterError::StopFailed {
                    adapter_id: adapter_id.to_string(),
                    cause: e.to_string(),
                });
            }
            if let Err(e) = instance.cleanup().await {
                tracing::warn!(adapter_id, error = %e, "cleanup after stop failed");
            }
        }

        entry.clear_instance(AdapterState::Stopped);
        tracing::info!(adapter_id, forced_dependents = dependents.len(), "adapter stopped");
        Ok(true)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Read-only snapshot of a registration. Does not start anything.
    pub async fn get_adapter(&self, adapter_id: &str) -> Option<RegistrationSnapshot> {
        let registry = self.registry.read().await;
        registry.get(adapter_id).map(AdapterRegistration::snapshot)
    }

    /// Snapshots of all registrations.
    pub async fn list_adapters(&self) -> Vec<RegistrationSnapshot> {
        let registry = self.registry.read().await;
        registry.values().map(AdapterRegistration::snapshot).collect()
    }

    /// Forward a health check to the live instance.
    pub async fn health_check(&self, adapter_id: &str) -> Result<HealthReport, AdapterError> {
        let instance = {
            let registry = self.registry.read().await;
            let registration = registry
                .get(adapter_id)
                .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?;
            registration.instance.clone()
        };

        match instance {
            Some(instance) => Ok(instance.health_check().await),
            None => Ok(HealthReport::unhealthy(["adapter is not running"])),
        }
    }

    // =========================================================================
    // Processing
    // =========================================================================

    /// The hot path: invoke a running adapter's `process`.
    ///
    /// The instance handle is cloned under the read lock and the lock is
    /// released before processing. Calls against a non-reentrant adapter are
    /// serialized by its gate; reentrant adapters run in parallel. Wall-clock
    /// duration and usage accounting are recorded for every call, successful
    /// or not.
    pub async fn process_with_adapter(
        &self,
        adapter_id: &str,
        input: Value,
        ctx: &ExecutionContext,
    ) -> Result<ProcessOutcome, AdapterError> {
        let (instance, gate, capabilities) = {
            let registry = self.registry.read().await;
            let registration = registry
                .get(adapter_id)
                .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?;
            if !registration.is_running() {
                return Err(AdapterError::NotRunning(adapter_id.to_string()));
            }
            let Some(instance) = registration.instance.clone() else {
                return Err(AdapterError::NotRunning(adapter_id.to_string()));
            };
            let capabilities = instance.capabilities();
            (instance, registration.process_gate.clone(), capabilities)
        };

        let _serialized = match &gate {
            Some(gate) => Some(gate.lock().await),
            None => None,
        };

        let started = Instant::now();
        let result = match capabilities.process_timeout {
            Some(budget) => match tokio::time::timeout(budget, instance.process(input, ctx)).await {
                Ok(inner) => inner,
                Err(_) => Err(AdapterError::Timeout),
            },
            None => instance.process(input, ctx).await,
        };
        let duration_ms = i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX);

        self.record_usage(adapter_id).await;

        match result {
            Ok(output) => Ok(ProcessOutcome::success(output, duration_ms)),
            Err(e) => {
                tracing::warn!(adapter_id, error = %e, duration_ms, "adapter process failed");
                Err(AdapterError::ProcessFailed {
                    adapter_id: adapter_id.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn record_usage(&self, adapter_id: &str) {
        {
            let mut registry = self.registry.write().await;
            if let Some(entry) = registry.get_mut(adapter_id) {
                entry.usage_count += 1;
                entry.last_used_at = Some(Utc::now());
            }
        }

        // Persistence uses its own session scoped to this mutation; a miss
        // here must not fail the processing call.
        if let Err(e) = self.store.record_usage(adapter_id).await {
            tracing::warn!(adapter_id, error = %e, "failed to persist usage accounting");
        }
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Best-effort synchronous reproduction of `start_adapter`.
    ///
    /// Constructs a throwaway instance, runs the full lifecycle against it,
    /// and reports the first failure. A clean run indicates the failure the
    /// caller observed came from manager bookkeeping rather than the adapter.
    pub async fn diagnose(&self, adapter_id: &str) -> Result<String, AdapterError> {
        let config = {
            let registry = self.registry.read().await;
            registry
                .get(adapter_id)
                .map(|r| r.config.clone())
                .ok_or_else(|| AdapterError::NotFound(adapter_id.to_string()))?
        };

        let instance = match self.factory.build(&config) {
            Ok(instance) => instance,
            Err(e) => return Ok(format!("construction failed: {e}")),
        };

        if let Err(e) = instance.initialize().await {
            let _ = instance.cleanup().await;
            return Ok(format!("initialize failed: {e}"));
        }
        if let Err(e) = instance.start().await {
            let _ = instance.cleanup().await;
            return Ok(format!("start failed: {e}"));
        }

        if let Err(e) = instance.stop().await {
            let _ = instance.cleanup().await;
            return Ok(format!("stop failed: {e}"));
        }
        if let Err(e) = instance.cleanup().await {
            return Ok(format!("cleanup failed: {e}"));
        }

        Ok("manual start succeeded".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axon_domain::AdapterType;

    fn registration(id: &str, deps: &[&str]) -> AdapterRegistration {
        let config = AdapterConfig::new(id, id, AdapterType::Soft, "EchoAdapter")
            .with_dependencies(deps.iter().copied());
        AdapterRegistration::new(config)
    }

    #[test]
    fn test_dependency_order_linear_chain() {
        let mut registry = Registry::new();
        registry.insert("a".into(), registration("a", &["b"]));
        registry.insert("b".into(), registration("b", &["c"]));
        registry.insert("c".into(), registration("c", &[]));

        let order = dependency_order(&registry, "a").unwrap();
        assert_eq!(order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_dependency_order_detects_cycle() {
        let mut registry = Registry::new();
        registry.insert("a".into(), registration("a", &["b"]));
        registry.insert("b".into(), registration("b", &["a"]));

        let err = dependency_order(&registry, "a").unwrap_err();
        assert!(matches!(err, AdapterError::DependencyCycle(_)));
    }

    #[test]
    fn test_check_no_cycle_through_new_node() {
        let mut registry = Registry::new();
        registry.insert("a".into(), registration("a", &["b"]));
        registry.insert("b".into(), registration("b", &["c"]));

        // Registering c -> a closes the loop a -> b -> c -> a.
        let config = AdapterConfig::new("c", "c", AdapterType::Soft, "EchoAdapter")
            .with_dependencies(["a"]);
        let err = check_no_cycle(&registry, &config).unwrap_err();
        assert!(matches!(err, AdapterError::DependencyCycle(_)));

        // An acyclic addition passes.
        let config = AdapterConfig::new("d", "d", AdapterType::Soft, "EchoAdapter")
            .with_dependencies(["b"]);
        check_no_cycle(&registry, &config).unwrap();
    }

    #[test]
    fn test_running_dependents_order() {
        let mut registry = Registry::new();
        let mut a = registration("a", &["b"]);
        let mut b = registration("b", &["c"]);
        let mut c = registration("c", &[]);
        a.state = AdapterState::Running;
        b.state = AdapterState::Running;
        c.state = AdapterState::Running;
        a.instance = Some(Arc::new(crate::builtin::EchoAdapter));
        b.instance = Some(Arc::new(crate::builtin::EchoAdapter));
        c.instance = Some(Arc::new(crate::builtin::EchoAdapter));
        registry.insert("a".into(), a);
        registry.insert("b".into(), b);
        registry.insert("c".into(), c);

        // Stopping c must tear down a before b.
        let order = running_dependents(&registry, "c");
        assert_eq!(order, vec!["a", "b"]);
    }
}
