//! Built-in adapter implementations
//!
//! These ship with the platform and are always present in the factory table:
//! a structured-logging sink, an echo adapter used heavily by tests, and the
//! in-process diary store backing the builtin mood skill.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::adapter::{
    Adapter, AdapterCapabilities, AdapterError, ExecutionContext, HealthReport,
};

// =============================================================================
// Logger Adapter (system.logger)
// =============================================================================

/// Writes its parameters to the tracing log and reports success.
pub struct LoggerAdapter {
    adapter_id: String,
}

impl LoggerAdapter {
    /// Create a logger bound to the configuration's adapter id.
    #[must_use]
    pub fn new(config: &axon_domain::AdapterConfig) -> Self {
        Self {
            adapter_id: config.adapter_id.clone(),
        }
    }
}

#[async_trait]
impl Adapter for LoggerAdapter {
    async fn initialize(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn process(&self, input: Value, ctx: &ExecutionContext) -> Result<Value, AdapterError> {
        tracing::info!(
            adapter_id = %self.adapter_id,
            execution_id = %ctx.execution_id,
            payload = %input,
            "logger adapter invoked"
        );
        Ok(json!({"logged": true}))
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport::healthy(["log_sink"])
    }
}

// =============================================================================
// Echo Adapter (system.echo)
// =============================================================================

/// Returns its input unchanged. Reentrant; used as a test fixture and as a
/// trivial pass-through node in workflows.
#[derive(Default)]
pub struct EchoAdapter;

#[async_trait]
impl Adapter for EchoAdapter {
    async fn initialize(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn process(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, AdapterError> {
        Ok(input)
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport::healthy(["echo"])
    }
}

// =============================================================================
// Mood Diary Store Adapter (mood.diary_store)
// =============================================================================

/// In-process append/list store backing the builtin mood skill.
///
/// Input shape: `{"action": "append", "entry": {...}}` or
/// `{"action": "list"}`. Declared non-reentrant: appends are a single-writer
/// operation over the shared buffer.
pub struct MoodDiaryStoreAdapter {
    entries: RwLock<Vec<Value>>,
}

impl MoodDiaryStoreAdapter {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MoodDiaryStoreAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Adapter for MoodDiaryStoreAdapter {
    async fn initialize(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn start(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn process(&self, input: Value, _ctx: &ExecutionContext) -> Result<Value, AdapterError> {
        let action = input
            .get("action")
            .and_then(Value::as_str)
            .unwrap_or("append");

        match action {
            "append" => {
                let entry = input.get("entry").cloned().ok_or_else(|| {
                    AdapterError::Execution("append requires an 'entry' field".to_string())
                })?;
                let mut entries = self.entries.write().await;
                entries.push(entry);
                Ok(json!({"stored": true, "count": entries.len()}))
            }
            "list" => {
                let entries = self.entries.read().await;
                Ok(json!({
                    "items": entries.clone(),
                    "count": entries.len(),
                }))
            }
            other => Err(AdapterError::Execution(format!(
                "unsupported diary action: {other}"
            ))),
        }
    }

    async fn stop(&self) -> Result<(), AdapterError> {
        Ok(())
    }

    async fn cleanup(&self) -> Result<(), AdapterError> {
        let mut entries = self.entries.write().await;
        entries.clear();
        Ok(())
    }

    async fn health_check(&self) -> HealthReport {
        HealthReport::healthy(["entry_buffer"])
    }

    fn capabilities(&self) -> AdapterCapabilities {
        AdapterCapabilities {
            reentrant: false,
            ..AdapterCapabilities::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_logger_reports_logged() {
        let config = axon_domain::AdapterConfig::new(
            "system.logger",
            "Logger",
            axon_domain::AdapterType::Hard,
            "LoggerAdapter",
        );
        let adapter = LoggerAdapter::new(&config);
        let ctx = ExecutionContext::new(None);

        let output = adapter.process(json!({"msg": "hi"}), &ctx).await.unwrap();
        assert_eq!(output, json!({"logged": true}));
    }

    #[tokio::test]
    async fn test_echo_returns_input() {
        let adapter = EchoAdapter;
        let ctx = ExecutionContext::new(None);
        let input = json!({"nested": {"a": [1, 2, 3]}});

        let output = adapter.process(input.clone(), &ctx).await.unwrap();
        assert_eq!(output, input);
    }

    #[tokio::test]
    async fn test_diary_append_then_list() {
        let adapter = MoodDiaryStoreAdapter::new();
        let ctx = ExecutionContext::new(None);

        let stored = adapter
            .process(json!({"action": "append", "entry": {"mood": "calm"}}), &ctx)
            .await
            .unwrap();
        assert_eq!(stored["count"], 1);

        let listed = adapter.process(json!({"action": "list"}), &ctx).await.unwrap();
        assert_eq!(listed["items"][0]["mood"], "calm");
        assert!(!adapter.capabilities().reentrant);
    }

    #[tokio::test]
    async fn test_diary_append_without_entry_fails() {
        let adapter = MoodDiaryStoreAdapter::new();
        let ctx = ExecutionContext::new(None);

        let err = adapter
            .process(json!({"action": "append"}), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Execution(_)));
    }
}
