//! Workflow entity and graph definition types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

use crate::enums::{NodeType, TriggerType, WorkflowStatus};
use crate::ids::{UserId, WorkflowId};

// =============================================================================
// Graph Definition
// =============================================================================

/// A node in a workflow graph.
///
/// `config` is type-specific: adapter nodes carry `{adapter_id, parameters,
/// output_variable?}`, condition nodes carry `{condition}`, delay nodes carry
/// `{delay_seconds}`, end nodes carry `{output}`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct NodeSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub node_type: NodeType,
    #[serde(default)]
    pub config: Value,
}

/// A directed edge between two nodes.
///
/// `condition` is the optional boolean branch tag (`"true"` / `"false"`)
/// consulted when the source is a condition node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct EdgeSpec {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// The stored graph: nodes plus edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, ToSchema)]
pub struct WorkflowDefinition {
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

impl WorkflowDefinition {
    /// Find a node by id.
    #[must_use]
    pub fn node(&self, id: &str) -> Option<&NodeSpec> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

// =============================================================================
// Workflow
// =============================================================================

/// A user-owned workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub user_id: UserId,
    /// Unique per user.
    pub slug: String,
    pub name: String,
    pub description: Option<String>,
    pub definition: WorkflowDefinition,
    pub trigger_type: TriggerType,
    #[serde(default)]
    pub trigger_config: Map<String, Value>,
    pub workflow_status: WorkflowStatus,
    #[serde(default)]
    pub environment_variables: Map<String, Value>,
    pub execution_count: i64,
    pub success_count: i64,
    pub failure_count: i64,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub last_execution_status: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Create a draft workflow from a definition.
    #[must_use]
    pub fn new(
        user_id: UserId,
        slug: impl Into<String>,
        name: impl Into<String>,
        definition: WorkflowDefinition,
        trigger_type: TriggerType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            user_id,
            slug: slug.into(),
            name: name.into(),
            description: None,
            definition,
            trigger_type,
            trigger_config: Map::new(),
            workflow_status: WorkflowStatus::Draft,
            environment_variables: Map::new(),
            execution_count: 0,
            success_count: 0,
            failure_count: 0,
            last_executed_at: None,
            last_execution_status: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this workflow may be executed.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.workflow_status == WorkflowStatus::Active
    }

    /// Bump `updated_at` to now.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_definition_deserializes_node_type_tag() {
        let def: WorkflowDefinition = serde_json::from_value(json!({
            "nodes": [
                {"id": "start", "type": "start", "config": {}},
                {"id": "finish", "type": "end", "config": {"output": {}}}
            ],
            "edges": [{"source": "start", "target": "finish"}]
        }))
        .unwrap();

        assert_eq!(def.nodes.len(), 2);
        assert_eq!(def.nodes[0].node_type, NodeType::Start);
        assert!(def.edges[0].condition.is_none());
        assert!(def.node("finish").is_some());
    }
}
