//! Graph validation for a definition's node/edge body.
//!
//! Rules enforced:
//! 1. Node IDs must be unique within the definition.
//! 2. Every edge must reference valid node IDs (both `from` and `to`).
//! 3. The directed graph must be acyclic.
//!
//! Returns the node IDs in a topological order on success. Among nodes that
//! become ready at the same time, declaration order is kept.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::{models::Definition, ExecutionError};

/// Validate the definition's graph and return nodes in execution order.
///
/// # Errors
/// - [`ExecutionError::DuplicateNodeId`] if two nodes share an ID.
/// - [`ExecutionError::UnknownNodeReference`] if an edge references a missing node.
/// - [`ExecutionError::CycleDetected`] if the graph is not acyclic.
pub fn validate_dag(definition: &Definition) -> Result<Vec<String>, ExecutionError> {
    let mut seen_ids: HashSet<&str> = HashSet::new();
    for node in &definition.nodes {
        if !seen_ids.insert(node.id.as_str()) {
            return Err(ExecutionError::DuplicateNodeId(node.id.clone()));
        }
    }

    for edge in &definition.edges {
        if !seen_ids.contains(edge.from.as_str()) {
            return Err(ExecutionError::UnknownNodeReference {
                node_id: edge.from.clone(),
                side: "from",
            });
        }
        if !seen_ids.contains(edge.to.as_str()) {
            return Err(ExecutionError::UnknownNodeReference {
                node_id: edge.to.clone(),
                side: "to",
            });
        }
    }

    // Kahn's algorithm.
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut in_degree: HashMap<&str, usize> = definition
        .nodes
        .iter()
        .map(|n| (n.id.as_str(), 0))
        .collect();

    for edge in &definition.edges {
        adjacency
            .entry(edge.from.as_str())
            .or_default()
            .push(edge.to.as_str());
        *in_degree.entry(edge.to.as_str()).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = definition
        .nodes
        .iter()
        .map(|n| n.id.as_str())
        .filter(|id| in_degree[id] == 0)
        .collect();

    let mut sorted: Vec<String> = Vec::with_capacity(definition.nodes.len());

    while let Some(node_id) = queue.pop_front() {
        sorted.push(node_id.to_owned());

        for &neighbour in adjacency.get(node_id).into_iter().flatten() {
            if let Some(deg) = in_degree.get_mut(neighbour) {
                *deg -= 1;
                if *deg == 0 {
                    queue.push_back(neighbour);
                }
            }
        }
    }

    // Nodes left unvisited sit on a cycle.
    if sorted.len() != definition.nodes.len() {
        return Err(ExecutionError::CycleDetected);
    }

    Ok(sorted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Edge, NodeDefinition};

    fn make_node(id: &str) -> NodeDefinition {
        NodeDefinition {
            id: id.to_string(),
            node_type: "mock".into(),
            config: serde_json::Value::Null,
        }
    }

    fn edge(from: &str, to: &str) -> Edge {
        Edge { from: from.into(), to: to.into() }
    }

    fn make_definition(nodes: Vec<NodeDefinition>, edges: Vec<Edge>) -> Definition {
        Definition::new("test", 1, "test").with_graph(nodes, edges)
    }

    #[test]
    fn valid_linear_dag_returns_sorted_order() {
        // A → B → C
        let definition = make_definition(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c")],
        );

        let sorted = validate_dag(&definition).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c"]);
    }

    #[test]
    fn valid_diamond_dag() {
        //   A
        //  / \
        // B   C
        //  \ /
        //   D
        let definition = make_definition(
            vec![make_node("a"), make_node("b"), make_node("c"), make_node("d")],
            vec![edge("a", "b"), edge("a", "c"), edge("b", "d"), edge("c", "d")],
        );

        let sorted = validate_dag(&definition).expect("should be valid");
        assert_eq!(sorted, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn independent_nodes_keep_declaration_order() {
        let definition = make_definition(
            vec![make_node("z"), make_node("m"), make_node("a")],
            vec![],
        );
        assert_eq!(validate_dag(&definition).unwrap(), vec!["z", "m", "a"]);
    }

    #[test]
    fn duplicate_node_id_is_rejected() {
        let definition = make_definition(vec![make_node("a"), make_node("a")], vec![]);
        assert!(matches!(
            validate_dag(&definition),
            Err(ExecutionError::DuplicateNodeId(id)) if id == "a"
        ));
    }

    #[test]
    fn edge_referencing_missing_node_is_rejected() {
        let definition = make_definition(vec![make_node("a")], vec![edge("a", "ghost")]);
        assert!(matches!(
            validate_dag(&definition),
            Err(ExecutionError::UnknownNodeReference { node_id, side: "to" }) if node_id == "ghost"
        ));
    }

    #[test]
    fn cycle_is_detected() {
        // A → B → C → A
        let definition = make_definition(
            vec![make_node("a"), make_node("b"), make_node("c")],
            vec![edge("a", "b"), edge("b", "c"), edge("c", "a")],
        );
        assert!(matches!(validate_dag(&definition), Err(ExecutionError::CycleDetected)));
    }

    #[test]
    fn empty_graph_is_valid() {
        let definition = make_definition(vec![], vec![]);
        assert!(validate_dag(&definition).unwrap().is_empty());
    }
}
