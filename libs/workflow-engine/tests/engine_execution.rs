//! Integration tests for the workflow engine
//!
//! Runs against the in-memory stores with the built-in adapters.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use axon_adapters::{AdapterFactory, AdapterManager};
use axon_db::{AdapterConfigRepository, InMemoryAdapterConfigRepository};
use axon_domain::{
    AdapterConfig, AdapterType, ExecutionMode, NodeRunStatus, TriggerType, UserId, Workflow,
    WorkflowDefinition, WorkflowExecution, WorkflowStatus,
};
use axon_workflow_engine::{EngineRunStatus, RunSeed, WorkflowEngine};

async fn manager_with_echo() -> Arc<AdapterManager> {
    let store: Arc<dyn AdapterConfigRepository> = Arc::new(InMemoryAdapterConfigRepository::new());
    let factory = Arc::new(AdapterFactory::with_builtins());
    let manager = Arc::new(AdapterManager::new(factory, store));
    manager.start();

    manager
        .register_adapter(AdapterConfig::new(
            "system.echo",
            "Echo",
            AdapterType::Soft,
            "EchoAdapter",
        ))
        .await
        .unwrap();
    manager
        .register_adapter(AdapterConfig::new(
            "system.logger",
            "Logger",
            AdapterType::Hard,
            "LoggerAdapter",
        ))
        .await
        .unwrap();

    manager
}

fn workflow_from(definition: Value) -> Workflow {
    let definition: WorkflowDefinition = serde_json::from_value(definition).unwrap();
    let mut workflow = Workflow::new(
        UserId::new(),
        "test-flow",
        "Test Flow",
        definition,
        TriggerType::Manual,
    );
    workflow.workflow_status = WorkflowStatus::Active;
    workflow
}

fn execution_for(workflow: &Workflow, input: Value) -> WorkflowExecution {
    WorkflowExecution::new(workflow.id, workflow.user_id, ExecutionMode::Manual, input)
}

#[tokio::test]
async fn linear_adapter_workflow_completes() {
    let manager = manager_with_echo().await;
    let workflow = workflow_from(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "echo", "type": "adapter", "config": {
                "adapter_id": "system.echo",
                "parameters": {"msg": "${input.msg}"},
                "output_variable": "echoed"
            }},
            {"id": "finish", "type": "end", "config": {"output": {"result": "${echoed}"}}}
        ],
        "edges": [
            {"source": "start", "target": "echo"},
            {"source": "echo", "target": "finish"}
        ]
    }));
    let execution = execution_for(&workflow, json!({"msg": "hi"}));

    let engine = WorkflowEngine::new();
    let outcome = engine
        .execute(&workflow, &execution, RunSeed::new(Arc::clone(&manager)))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Completed);
    assert_eq!(outcome.output["result"], json!({"msg": "hi"}));
    assert_eq!(outcome.node_results.len(), 3);
    assert!(outcome
        .node_results
        .values()
        .all(|r| r.status == NodeRunStatus::Success));

    // The auto policy pulled the adapter into running.
    assert!(manager.get_adapter("system.echo").await.unwrap().is_running());
}

#[tokio::test]
async fn environment_variables_feed_interpolation() {
    let manager = manager_with_echo().await;
    let mut workflow = workflow_from(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "finish", "type": "end", "config": {"output": {"greeting": "${greeting}, ${user.name}!"}}}
        ],
        "edges": [{"source": "start", "target": "finish"}]
    }));
    workflow.environment_variables = serde_json::from_value(json!({
        "greeting": "hello",
        "user": {"name": "alice"}
    }))
    .unwrap();
    let execution = execution_for(&workflow, json!({}));

    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(manager))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Completed);
    assert_eq!(outcome.output["greeting"], json!("hello, alice!"));
}

#[tokio::test]
async fn strict_interpolation_failure_fails_node() {
    let manager = manager_with_echo().await;
    let workflow = workflow_from(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "echo", "type": "adapter", "config": {
                "adapter_id": "system.echo",
                "parameters": {"value": "${missing}"}
            }},
            {"id": "finish", "type": "end", "config": {"output": {}}}
        ],
        "edges": [
            {"source": "start", "target": "echo"},
            {"source": "echo", "target": "finish"}
        ]
    }));
    let execution = execution_for(&workflow, json!({}));

    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(manager))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("missing"));

    // Failing node recorded as failed, every earlier node as success, and
    // traversal stopped before the end node.
    assert_eq!(
        outcome.node_results["echo"].status,
        NodeRunStatus::Failed
    );
    assert_eq!(
        outcome.node_results["start"].status,
        NodeRunStatus::Success
    );
    assert!(!outcome.node_results.contains_key("finish"));
}

#[tokio::test]
async fn condition_selects_matching_branch() {
    let manager = manager_with_echo().await;
    let definition = json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "gate", "type": "condition", "config": {"condition": "${input.flag}"}},
            {"id": "yes", "type": "end", "config": {"output": {"branch": "yes"}}},
            {"id": "no", "type": "end", "config": {"output": {"branch": "no"}}}
        ],
        "edges": [
            {"source": "start", "target": "gate"},
            {"source": "gate", "target": "yes", "condition": "true"},
            {"source": "gate", "target": "no", "condition": "false"}
        ]
    });

    let workflow = workflow_from(definition.clone());
    let execution = execution_for(&workflow, json!({"flag": true}));
    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(Arc::clone(&manager)))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Completed);
    assert_eq!(outcome.output["branch"], json!("yes"));
    assert!(outcome.node_results.contains_key("yes"));
    assert!(!outcome.node_results.contains_key("no"));

    let workflow = workflow_from(definition);
    let execution = execution_for(&workflow, json!({"flag": false}));
    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(manager))
        .await;

    assert_eq!(outcome.output["branch"], json!("no"));
    assert!(!outcome.node_results.contains_key("yes"));
}

#[tokio::test]
async fn unknown_adapter_fails_run() {
    let manager = manager_with_echo().await;
    let workflow = workflow_from(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "ghost", "type": "adapter", "config": {
                "adapter_id": "no.such.adapter",
                "parameters": {}
            }},
            {"id": "finish", "type": "end", "config": {"output": {}}}
        ],
        "edges": [
            {"source": "start", "target": "ghost"},
            {"source": "ghost", "target": "finish"}
        ]
    }));
    let execution = execution_for(&workflow, json!({}));

    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(manager))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Failed);
    assert_eq!(outcome.node_results["ghost"].status, NodeRunStatus::Failed);
    assert!(!outcome.node_results.contains_key("finish"));
}

#[tokio::test]
async fn reserved_workflow_id_parameter_rejected() {
    let manager = manager_with_echo().await;
    let workflow = workflow_from(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "echo", "type": "adapter", "config": {
                "adapter_id": "system.echo",
                "parameters": {"workflow_id": "sneaky"}
            }},
            {"id": "finish", "type": "end", "config": {"output": {}}}
        ],
        "edges": [
            {"source": "start", "target": "echo"},
            {"source": "echo", "target": "finish"}
        ]
    }));
    let execution = execution_for(&workflow, json!({}));

    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(manager))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("workflow_id"));
}

#[tokio::test]
async fn delay_is_cancellable() {
    let manager = manager_with_echo().await;
    let workflow = workflow_from(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "nap", "type": "delay", "config": {"delay_seconds": 30}},
            {"id": "finish", "type": "end", "config": {"output": {}}}
        ],
        "edges": [
            {"source": "start", "target": "nap"},
            {"source": "nap", "target": "finish"}
        ]
    }));
    let execution = execution_for(&workflow, json!({}));

    let token = CancellationToken::new();
    let cancel = token.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    let started = std::time::Instant::now();
    let outcome = WorkflowEngine::new()
        .execute(
            &workflow,
            &execution,
            RunSeed::new(manager).with_cancellation(token),
        )
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!outcome.node_results.contains_key("finish"));
}

#[tokio::test]
async fn stubbed_node_types_dispatch_to_not_implemented() {
    let manager = manager_with_echo().await;
    let workflow = workflow_from(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "call", "type": "http", "config": {"url": "https://example.com"}},
            {"id": "finish", "type": "end", "config": {"output": {}}}
        ],
        "edges": [
            {"source": "start", "target": "call"},
            {"source": "call", "target": "finish"}
        ]
    }));
    let execution = execution_for(&workflow, json!({}));

    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(manager))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("not implemented"));
}

#[tokio::test]
async fn invalid_graph_fails_without_node_results() {
    let manager = manager_with_echo().await;
    let workflow = workflow_from(json!({
        "nodes": [{"id": "finish", "type": "end", "config": {"output": {}}}],
        "edges": []
    }));
    let execution = execution_for(&workflow, json!({}));

    let outcome = WorkflowEngine::new()
        .execute(&workflow, &execution, RunSeed::new(manager))
        .await;

    assert_eq!(outcome.status, EngineRunStatus::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("start node"));
    assert!(outcome.node_results.is_empty());
}
