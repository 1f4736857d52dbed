//! Workflow graph parsing and structural validation
//!
//! Validates a stored definition before execution: exactly one start node,
//! unique node ids, every edge endpoint resolves (with typo suggestions),
//! and the graph is a DAG.

use std::collections::{HashMap, HashSet};

use petgraph::algo;
use petgraph::graph::DiGraph;
use thiserror::Error;

use axon_domain::{NodeType, WorkflowDefinition};

// =============================================================================
// Errors
// =============================================================================

/// Structural validation errors
#[derive(Debug, Error)]
pub enum GraphValidationError {
    /// No start node present
    #[error("workflow graph has no start node")]
    MissingStartNode,

    /// More than one start node present
    #[error("workflow graph has {0} start nodes, expected exactly one")]
    MultipleStartNodes(usize),

    /// Two nodes share an id
    #[error("duplicate node id: {0}")]
    DuplicateNodeId(String),

    /// Edge endpoint does not resolve to a node
    #[error("edge references unknown node '{node}'{}", .suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    UnknownEdgeNode {
        node: String,
        suggestion: Option<String>,
    },

    /// The graph contains a cycle
    #[error("cycle in workflow graph: {}", .0.join(" -> "))]
    CycleInGraph(Vec<String>),
}

// =============================================================================
// Parsed Graph
// =============================================================================

/// Outgoing edge with its optional boolean branch tag.
#[derive(Debug, Clone)]
pub struct OutEdge {
    pub target: String,
    pub condition: Option<String>,
}

/// A validated workflow graph ready for traversal.
#[derive(Debug, Clone)]
pub struct ParsedGraph {
    start_node: String,
    adjacency: HashMap<String, Vec<OutEdge>>,
}

impl ParsedGraph {
    /// Id of the single start node.
    #[must_use]
    pub fn start_node(&self) -> &str {
        &self.start_node
    }

    /// Outgoing edges of a node, in definition order.
    #[must_use]
    pub fn successors(&self, node_id: &str) -> &[OutEdge] {
        self.adjacency
            .get(node_id)
            .map_or(&[], Vec::as_slice)
    }
}

/// Find a similar node id using Levenshtein distance.
fn find_similar_node<'a>(target: &str, node_ids: &HashSet<&'a str>) -> Option<&'a str> {
    let mut best_match: Option<&str> = None;
    let mut best_distance = usize::MAX;

    for &node_id in node_ids {
        let distance = strsim::levenshtein(target, node_id);
        // Only suggest if reasonably similar (distance <= 3)
        if distance < best_distance && distance <= 3 {
            best_distance = distance;
            best_match = Some(node_id);
        }
    }

    best_match
}

/// Parse and validate a workflow definition.
pub fn parse_definition(
    definition: &WorkflowDefinition,
) -> Result<ParsedGraph, GraphValidationError> {
    // Unique node ids
    let mut node_ids: HashSet<&str> = HashSet::with_capacity(definition.nodes.len());
    for node in &definition.nodes {
        if !node_ids.insert(node.id.as_str()) {
            return Err(GraphValidationError::DuplicateNodeId(node.id.clone()));
        }
    }

    // Exactly one start node
    let start_nodes: Vec<&str> = definition
        .nodes
        .iter()
        .filter(|n| n.node_type == NodeType::Start)
        .map(|n| n.id.as_str())
        .collect();
    let start_node = match start_nodes.as_slice() {
        [] => return Err(GraphValidationError::MissingStartNode),
        [only] => (*only).to_string(),
        many => return Err(GraphValidationError::MultipleStartNodes(many.len())),
    };

    // All edge endpoints resolve
    for edge in &definition.edges {
        for endpoint in [edge.source.as_str(), edge.target.as_str()] {
            if !node_ids.contains(endpoint) {
                return Err(GraphValidationError::UnknownEdgeNode {
                    node: endpoint.to_string(),
                    suggestion: find_similar_node(endpoint, &node_ids).map(ToString::to_string),
                });
            }
        }
    }

    // DAG check via petgraph
    let mut graph = DiGraph::<&str, ()>::new();
    let mut indices = HashMap::new();
    for node in &definition.nodes {
        indices.insert(node.id.as_str(), graph.add_node(node.id.as_str()));
    }
    for edge in &definition.edges {
        graph.add_edge(indices[edge.source.as_str()], indices[edge.target.as_str()], ());
    }

    if algo::is_cyclic_directed(&graph) {
        // Name the offending nodes via strongly connected components.
        let sccs = algo::kosaraju_scc(&graph);
        let cycle_nodes: Vec<String> = sccs
            .iter()
            .find(|scc| scc.len() > 1)
            .map(|scc| scc.iter().map(|&idx| graph[idx].to_string()).collect())
            .unwrap_or_else(|| {
                // Self-loop: a single-node SCC with an edge to itself.
                definition
                    .edges
                    .iter()
                    .filter(|e| e.source == e.target)
                    .map(|e| e.source.clone())
                    .collect()
            });
        return Err(GraphValidationError::CycleInGraph(cycle_nodes));
    }

    // Adjacency in definition order
    let mut adjacency: HashMap<String, Vec<OutEdge>> = HashMap::new();
    for edge in &definition.edges {
        adjacency.entry(edge.source.clone()).or_default().push(OutEdge {
            target: edge.target.clone(),
            condition: edge.condition.clone(),
        });
    }

    Ok(ParsedGraph {
        start_node,
        adjacency,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(value: serde_json::Value) -> WorkflowDefinition {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_valid_linear_graph() {
        let def = definition(json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "work", "type": "adapter", "config": {"adapter_id": "system.echo", "parameters": {}}},
                {"id": "finish", "type": "end", "config": {"output": {}}}
            ],
            "edges": [
                {"source": "start", "target": "work"},
                {"source": "work", "target": "finish"}
            ]
        }));

        let graph = parse_definition(&def).unwrap();
        assert_eq!(graph.start_node(), "start");
        assert_eq!(graph.successors("start")[0].target, "work");
        assert!(graph.successors("finish").is_empty());
    }

    #[test]
    fn test_missing_start_node() {
        let def = definition(json!({
            "nodes": [{"id": "finish", "type": "end"}],
            "edges": []
        }));
        assert!(matches!(
            parse_definition(&def),
            Err(GraphValidationError::MissingStartNode)
        ));
    }

    #[test]
    fn test_multiple_start_nodes() {
        let def = definition(json!({
            "nodes": [
                {"id": "a", "type": "start"},
                {"id": "b", "type": "start"}
            ],
            "edges": []
        }));
        assert!(matches!(
            parse_definition(&def),
            Err(GraphValidationError::MultipleStartNodes(2))
        ));
    }

    #[test]
    fn test_unknown_edge_target_suggests_fix() {
        let def = definition(json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "finish", "type": "end"}
            ],
            "edges": [{"source": "start", "target": "finsh"}]
        }));

        let err = parse_definition(&def).unwrap_err();
        match err {
            GraphValidationError::UnknownEdgeNode { node, suggestion } => {
                assert_eq!(node, "finsh");
                assert_eq!(suggestion.as_deref(), Some("finish"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_cycle_detected() {
        let def = definition(json!({
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
        }));

        assert!(matches!(
            parse_definition(&def),
            Err(GraphValidationError::CycleInGraph(_))
        ));
    }

    #[test]
    fn test_duplicate_node_id() {
        let def = definition(json!({
            "nodes": [
                {"id": "start", "type": "start"},
                {"id": "start", "type": "end"}
            ],
            "edges": []
        }));
        assert!(matches!(
            parse_definition(&def),
            Err(GraphValidationError::DuplicateNodeId(_))
        ));
    }
}
