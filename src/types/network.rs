//! Network snapshot type.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::edge::Edge;
use super::node::{Ego, Node, NodeId};

/// A network snapshot: nodes, edges and the ego records that produced them.
///
/// Nodes and edges are kept as ordered sequences; union appends, so output
/// order is a deterministic function of input order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Network {
    /// Nodes in append order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges in append order.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Ego records. A session network carries at most one.
    #[serde(default, deserialize_with = "ego_list")]
    pub ego: Vec<Ego>,
}

impl Network {
    /// The empty network.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a network without ego records.
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            nodes,
            edges,
            ego: Vec::new(),
        }
    }

    /// Attach an ego record.
    pub fn with_ego(mut self, ego: Ego) -> Self {
        self.ego.push(ego);
        self
    }

    /// Whether the network has no nodes, edges or egos.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty() && self.ego.is_empty()
    }

    /// Whether a node with `id` is present.
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.iter().any(|n| &n.id == id)
    }

    /// Set of node ids currently present.
    pub fn node_ids(&self) -> HashSet<&NodeId> {
        self.nodes.iter().map(|n| &n.id).collect()
    }

    /// Number of nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Number of edges.
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }
}

/// Accept either a single ego object, `null`, or a list of egos.
fn ego_list<'de, D>(deserializer: D) -> Result<Vec<Ego>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(Ego),
        Many(Vec<Ego>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(ego)) => vec![ego],
        Some(OneOrMany::Many(egos)) => egos,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_ego_deserializes_as_list() {
        let network: Network = serde_json::from_value(json!({
            "nodes": [{ "id": "n1" }],
            "edges": [],
            "ego": { "id": "e1", "attributes": { "age": 30 } }
        }))
        .unwrap();

        assert_eq!(network.ego.len(), 1);
        assert_eq!(network.ego[0].id, NodeId::new("e1"));
    }

    #[test]
    fn test_missing_fields_default_to_empty() {
        let network: Network = serde_json::from_value(json!({})).unwrap();
        assert!(network.is_empty());

        let network: Network = serde_json::from_value(json!({ "ego": null })).unwrap();
        assert!(network.ego.is_empty());
    }

    #[test]
    fn test_node_lookup() {
        let network = Network::new(vec![Node::bare("a"), Node::bare("b")], vec![]);
        assert!(network.contains_node(&NodeId::new("b")));
        assert!(!network.contains_node(&NodeId::new("c")));
        assert_eq!(network.node_ids().len(), 2);
    }
}
