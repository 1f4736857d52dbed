//! Integration tests for the workflow service and the workflow adapter
//!
//! Exercises background execution, synchronous waits, cancellation, and the
//! workflow-bound adapter against the in-memory repositories.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use axon_adapters::{AdapterFactory, AdapterManager, ExecutionContext, WORKFLOW_ADAPTER_CLASS};
use axon_db::{
    AdapterConfigRepository, ExecutionRepository, InMemoryAdapterConfigRepository,
    InMemoryExecutionRepository, InMemoryWorkflowRepository, WorkflowRepository,
};
use axon_domain::{
    AdapterConfig, AdapterType, ExecutionMode, ExecutionStatus, NodeRunStatus, TriggerType, UserId,
    WorkflowStatus,
};
use axon_workflow_engine::{
    NewWorkflow, WorkflowAdapter, WorkflowEngine, WorkflowService, DEFAULT_POLL_INTERVAL,
};

struct Harness {
    manager: Arc<AdapterManager>,
    service: Arc<WorkflowService>,
    workflows: Arc<InMemoryWorkflowRepository>,
}

async fn harness() -> Harness {
    let adapter_store: Arc<dyn AdapterConfigRepository> =
        Arc::new(InMemoryAdapterConfigRepository::new());
    let workflows = Arc::new(InMemoryWorkflowRepository::new());
    let executions = Arc::new(InMemoryExecutionRepository::new());

    let factory = Arc::new(AdapterFactory::with_builtins());
    let manager = Arc::new(AdapterManager::new(Arc::clone(&factory), adapter_store));
    manager.start();

    let service = Arc::new(WorkflowService::new(
        Arc::clone(&workflows) as Arc<dyn WorkflowRepository>,
        Arc::clone(&executions) as Arc<dyn ExecutionRepository>,
        Arc::new(WorkflowEngine::new()),
        Arc::clone(&manager),
    ));

    // The workflow adapter class closes over the service, so it is installed
    // after service construction.
    WorkflowAdapter::register_class(&factory, Arc::clone(&service));

    manager
        .register_adapter(AdapterConfig::new(
            "system.echo",
            "Echo",
            AdapterType::Soft,
            "EchoAdapter",
        ))
        .await
        .unwrap();

    Harness {
        manager,
        service,
        workflows,
    }
}

fn echo_flow(slug: &str) -> NewWorkflow {
    NewWorkflow {
        slug: slug.to_string(),
        name: "Echo Flow".to_string(),
        description: None,
        definition: serde_json::from_value(json!({
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
        }))
        .unwrap(),
        trigger_type: TriggerType::Manual,
        trigger_config: serde_json::Map::new(),
        environment_variables: serde_json::Map::new(),
        status: WorkflowStatus::Active,
    }
}

fn failing_flow(slug: &str) -> NewWorkflow {
    let mut flow = echo_flow(slug);
    flow.definition = serde_json::from_value(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "boom", "type": "adapter", "config": {
                "adapter_id": "adapter.that.does.not.exist",
                "parameters": {}
            }},
            {"id": "finish", "type": "end", "config": {"output": {}}}
        ],
        "edges": [
            {"source": "start", "target": "boom"},
            {"source": "boom", "target": "finish"}
        ]
    }))
    .unwrap();
    flow
}

#[tokio::test]
async fn execute_workflow_completes_in_background() {
    let h = harness().await;
    let user = UserId::new();
    let workflow = h.service.create_workflow(user, echo_flow("echo")).await.unwrap();

    let execution = h
        .service
        .execute_workflow(&workflow.id, user, json!({"msg": "ping"}), ExecutionMode::Manual)
        .await
        .unwrap();
    assert_eq!(execution.execution_status, ExecutionStatus::Pending);

    let finished = h
        .service
        .wait_for_completion(&execution.id, Duration::from_secs(5), DEFAULT_POLL_INTERVAL)
        .await
        .unwrap();

    assert_eq!(finished.execution_status, ExecutionStatus::Completed);
    assert_eq!(finished.output_data.unwrap()["result"], json!({"msg": "ping"}));
    assert!(finished.completed_at.unwrap() >= finished.started_at);
    assert!(finished.duration_ms.is_some());

    let stored = h.workflows.find(&workflow.id).await.unwrap().unwrap();
    assert_eq!(stored.execution_count, 1);
    assert_eq!(stored.success_count, 1);
    assert_eq!(stored.last_execution_status.as_deref(), Some("completed"));
}

#[tokio::test]
async fn inactive_workflow_cannot_execute_until_published() {
    let h = harness().await;
    let user = UserId::new();
    let mut flow = echo_flow("draft-flow");
    flow.status = WorkflowStatus::Draft;
    let workflow = h.service.create_workflow(user, flow).await.unwrap();

    let err = h
        .service
        .execute_workflow(&workflow.id, user, json!({}), ExecutionMode::Manual)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "WORKFLOW_INACTIVE");

    // Publishing flips it to active and execution proceeds.
    h.service.publish_workflow(&workflow.id).await.unwrap();
    let execution = h
        .service
        .execute_workflow(&workflow.id, user, json!({"msg": "now"}), ExecutionMode::Manual)
        .await
        .unwrap();
    let finished = h
        .service
        .wait_for_completion(&execution.id, Duration::from_secs(5), DEFAULT_POLL_INTERVAL)
        .await
        .unwrap();
    assert_eq!(finished.execution_status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn failed_run_records_error_and_node_results() {
    let h = harness().await;
    let user = UserId::new();
    let workflow = h
        .service
        .create_workflow(user, failing_flow("boom"))
        .await
        .unwrap();

    let execution = h
        .service
        .execute_workflow(&workflow.id, user, json!({}), ExecutionMode::Manual)
        .await
        .unwrap();

    let finished = h
        .service
        .wait_for_completion(&execution.id, Duration::from_secs(5), DEFAULT_POLL_INTERVAL)
        .await
        .unwrap();

    assert_eq!(finished.execution_status, ExecutionStatus::Failed);
    assert!(finished.error_message.is_some());
    assert_eq!(finished.node_results["boom"].status, NodeRunStatus::Failed);
    assert_eq!(finished.node_results["start"].status, NodeRunStatus::Success);

    let stored = h.workflows.find(&workflow.id).await.unwrap().unwrap();
    assert_eq!(stored.failure_count, 1);
    assert_eq!(stored.last_execution_status.as_deref(), Some("failed"));
}

#[tokio::test]
async fn cancel_stops_delay_node() {
    let h = harness().await;
    let user = UserId::new();
    let mut flow = echo_flow("sleepy");
    flow.definition = serde_json::from_value(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "nap", "type": "delay", "config": {"delay_seconds": 30}},
            {"id": "finish", "type": "end", "config": {"output": {}}}
        ],
        "edges": [
            {"source": "start", "target": "nap"},
            {"source": "nap", "target": "finish"}
        ]
    }))
    .unwrap();
    let workflow = h.service.create_workflow(user, flow).await.unwrap();

    let execution = h
        .service
        .execute_workflow(&workflow.id, user, json!({}), ExecutionMode::Manual)
        .await
        .unwrap();

    // Give the background task a moment to enter the delay.
    tokio::time::sleep(Duration::from_millis(50)).await;
    let cancelled = h
        .service
        .cancel_execution(&execution.id, &user)
        .await
        .unwrap();
    assert_eq!(cancelled.execution_status, ExecutionStatus::Cancelled);

    // Terminal status sticks.
    let settled = h
        .service
        .wait_for_completion(&execution.id, Duration::from_millis(500), DEFAULT_POLL_INTERVAL)
        .await
        .unwrap();
    assert_eq!(settled.execution_status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn cancel_requires_ownership() {
    let h = harness().await;
    let user = UserId::new();
    let workflow = h.service.create_workflow(user, echo_flow("owned")).await.unwrap();

    let execution = h
        .service
        .execute_workflow(&workflow.id, user, json!({"msg": "x"}), ExecutionMode::Manual)
        .await
        .unwrap();

    let stranger = UserId::new();
    let err = h
        .service
        .cancel_execution(&execution.id, &stranger)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NOT_PERMITTED");
}

#[tokio::test]
async fn slug_conflict_and_graph_validation_surface_as_errors() {
    let h = harness().await;
    let user = UserId::new();
    h.service.create_workflow(user, echo_flow("dup")).await.unwrap();

    let err = h
        .service
        .create_workflow(user, echo_flow("dup"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SLUG_EXISTS");

    let mut cyclic = echo_flow("cyclic");
    cyclic.definition = serde_json::from_value(json!({
        "nodes": [
            {"id": "start", "type": "start"},
            {"id": "a", "type": "delay", "config": {"delay_seconds": 0}},
            {"id": "b", "type": "delay", "config": {"delay_seconds": 0}}
        ],
        "edges": [
            {"source": "start", "target": "a"},
            {"source": "a", "target": "b"},
            {"source": "b", "target": "a"}
        ]
    }))
    .unwrap();
    let err = h.service.create_workflow(user, cyclic).await.unwrap_err();
    assert_eq!(err.code(), "CYCLE_IN_GRAPH");
}

#[tokio::test]
async fn workflow_adapter_submits_and_completes() {
    let h = harness().await;
    let user = UserId::new();
    let workflow = h
        .service
        .create_workflow(user, echo_flow("adapter-bound"))
        .await
        .unwrap();

    let mut config = serde_json::Map::new();
    config.insert(
        "workflow_id".to_string(),
        Value::String(workflow.id.to_string()),
    );
    let adapter_config = AdapterConfig::new(
        "tool.workflow.test1",
        "bound workflow",
        AdapterType::Hard,
        WORKFLOW_ADAPTER_CLASS,
    )
    .with_config(config);

    h.manager.register_adapter(adapter_config).await.unwrap();
    h.manager.start_adapter("tool.workflow.test1").await.unwrap();

    let ctx = ExecutionContext::new(Some(user));
    let outcome = h
        .manager
        .process_with_adapter("tool.workflow.test1", json!({"msg": "via adapter"}), &ctx)
        .await
        .unwrap();

    assert_eq!(outcome.output["kind"], json!("workflow"));
    assert_eq!(outcome.output["status"], json!("submitted"));
    let execution_id = outcome.output["workflow_execution_id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap();

    let finished = h
        .service
        .wait_for_completion(&execution_id, Duration::from_secs(5), DEFAULT_POLL_INTERVAL)
        .await
        .unwrap();
    assert_eq!(finished.execution_status, ExecutionStatus::Completed);
    assert_eq!(
        finished.output_data.unwrap()["result"],
        json!({"msg": "via adapter"})
    );
}

#[tokio::test]
async fn workflow_adapter_enforces_permissions() {
    let h = harness().await;
    let owner = UserId::new();
    let workflow = h
        .service
        .create_workflow(owner, echo_flow("private"))
        .await
        .unwrap();

    let mut config = serde_json::Map::new();
    config.insert(
        "workflow_id".to_string(),
        Value::String(workflow.id.to_string()),
    );
    let adapter_config = AdapterConfig::new(
        "tool.workflow.private",
        "private workflow",
        AdapterType::Hard,
        WORKFLOW_ADAPTER_CLASS,
    )
    .with_config(config);
    h.manager.register_adapter(adapter_config).await.unwrap();
    h.manager.start_adapter("tool.workflow.private").await.unwrap();

    let stranger = UserId::new();
    let ctx = ExecutionContext::new(Some(stranger));
    let err = h
        .manager
        .process_with_adapter("tool.workflow.private", json!({}), &ctx)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "PROCESS_FAILED");
    let cause = std::error::Error::source(&err).unwrap();
    assert!(cause.to_string().contains("permission denied"));

    // The owner is always allowed.
    let ctx = ExecutionContext::new(Some(owner));
    assert!(h
        .manager
        .process_with_adapter("tool.workflow.private", json!({}), &ctx)
        .await
        .is_ok());
}
