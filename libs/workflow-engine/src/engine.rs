//! Workflow execution engine
//!
//! Walks a validated node graph depth-first from the start node, dispatching
//! each node to its executor and recording per-node results. The first node
//! failure stops traversal and fails the run.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use axon_adapters::AdapterManager;
use axon_domain::{NodeResult, NodeType, Workflow, WorkflowExecution};

use crate::context::{AdapterStartPolicy, RunContext};
use crate::executor::{ExecutorError, ExecutorRegistry};
use crate::interpolate::InterpolationMode;
use crate::parser::parse_definition;

// =============================================================================
// Run Seed & Outcome
// =============================================================================

/// Caller-supplied seed for one engine run.
pub struct RunSeed {
    pub adapter_manager: Arc<AdapterManager>,
    pub variables: Map<String, Value>,
    pub session_id: Option<String>,
    pub start_policy: AdapterStartPolicy,
    pub interpolation_mode: InterpolationMode,
    pub cancellation: CancellationToken,
}

impl RunSeed {
    /// Seed with defaults: auto start policy, strict interpolation.
    #[must_use]
    pub fn new(adapter_manager: Arc<AdapterManager>) -> Self {
        Self {
            adapter_manager,
            variables: Map::new(),
            session_id: None,
            start_policy: AdapterStartPolicy::Auto,
            interpolation_mode: InterpolationMode::Strict,
            cancellation: CancellationToken::new(),
        }
    }

    /// Merge extra variables into the seed.
    #[must_use]
    pub fn with_variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    /// Attach a cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }
}

/// Terminal status of an engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineRunStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Result of running a workflow to termination.
#[derive(Debug)]
pub struct EngineOutcome {
    pub status: EngineRunStatus,
    pub output: Map<String, Value>,
    pub node_results: BTreeMap<String, NodeResult>,
    pub error: Option<String>,
}

impl EngineOutcome {
    fn failed(error: String, node_results: BTreeMap<String, NodeResult>) -> Self {
        Self {
            status: EngineRunStatus::Failed,
            output: Map::new(),
            node_results,
            error: Some(error),
        }
    }

    fn cancelled(node_results: BTreeMap<String, NodeResult>) -> Self {
        Self {
            status: EngineRunStatus::Cancelled,
            output: Map::new(),
            node_results,
            error: None,
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

/// DAG executor over workflow definitions.
pub struct WorkflowEngine {
    executors: ExecutorRegistry,
}

impl WorkflowEngine {
    /// Engine with the default executor registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            executors: ExecutorRegistry::with_defaults(),
        }
    }

    /// Engine over a custom executor registry.
    #[must_use]
    pub fn with_registry(executors: ExecutorRegistry) -> Self {
        Self { executors }
    }

    /// Execute a workflow against an execution record.
    ///
    /// Always returns an outcome; validation and node errors surface as a
    /// failed outcome carrying the node results gathered so far.
    pub async fn execute(
        &self,
        workflow: &Workflow,
        execution: &WorkflowExecution,
        seed: RunSeed,
    ) -> EngineOutcome {
        tracing::info!(
            workflow_id = %workflow.id,
            execution_id = %execution.id,
            "executing workflow"
        );

        let graph = match parse_definition(&workflow.definition) {
            Ok(graph) => graph,
            Err(e) => return EngineOutcome::failed(e.to_string(), BTreeMap::new()),
        };

        // Workflow environment variables first, seed variables override.
        let mut variables = workflow.environment_variables.clone();
        variables.extend(seed.variables);

        let mut ctx = RunContext {
            input: execution.input_data.clone(),
            variables,
            output: Map::new(),
            adapter_manager: seed.adapter_manager,
            user_id: execution.user_id,
            workflow_id: workflow.id,
            execution_id: execution.id,
            session_id: seed.session_id,
            start_policy: seed.start_policy,
            interpolation_mode: seed.interpolation_mode,
            cancellation: seed.cancellation,
        };

        let mut node_results: BTreeMap<String, NodeResult> = BTreeMap::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut stack: Vec<String> = vec![graph.start_node().to_string()];

        while let Some(node_id) = stack.pop() {
            if !visited.insert(node_id.clone()) {
                continue;
            }

            if ctx.cancellation.is_cancelled() {
                tracing::info!(execution_id = %execution.id, "execution cancelled before node {node_id}");
                return EngineOutcome::cancelled(node_results);
            }

            let Some(node) = workflow.definition.node(&node_id) else {
                return EngineOutcome::failed(
                    format!("graph references unknown node: {node_id}"),
                    node_results,
                );
            };

            let Some(executor) = self.executors.get(node.node_type) else {
                return EngineOutcome::failed(
                    format!("no executor for node type: {}", node.node_type),
                    node_results,
                );
            };

            tracing::debug!(node_id = %node_id, node_type = %node.node_type, "executing node");

            match executor.execute(node, &mut ctx).await {
                Ok(output) => {
                    let branch = (node.node_type == NodeType::Condition)
                        .then(|| output.get("result").and_then(Value::as_bool))
                        .flatten();
                    node_results.insert(node_id.clone(), NodeResult::success(output));

                    // Push successors in reverse so traversal visits them in
                    // definition order. Condition nodes follow only the edges
                    // whose tag matches the evaluated branch.
                    let successors = graph.successors(&node_id);
                    for edge in successors.iter().rev() {
                        let follow = match (&edge.condition, branch) {
                            (None, _) => true,
                            (Some(tag), Some(result)) => tag == if result { "true" } else { "false" },
                            (Some(_), None) => true,
                        };
                        if follow && !visited.contains(&edge.target) {
                            stack.push(edge.target.clone());
                        }
                    }
                }
                Err(ExecutorError::Cancelled) => {
                    tracing::info!(execution_id = %execution.id, node_id = %node_id, "node cancelled");
                    return EngineOutcome::cancelled(node_results);
                }
                Err(e) => {
                    tracing::warn!(node_id = %node_id, error = %e, "node failed");
                    node_results.insert(node_id.clone(), NodeResult::failed(e.to_string()));
                    return EngineOutcome::failed(
                        format!("node {node_id} failed: {e}"),
                        node_results,
                    );
                }
            }
        }

        EngineOutcome {
            status: EngineRunStatus::Completed,
            output: ctx.output,
            node_results,
            error: None,
        }
    }
}

impl Default for WorkflowEngine {
    fn default() -> Self {
        Self::new()
    }
}
