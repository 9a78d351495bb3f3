//! Edge types for captured networks.

use serde::{Deserialize, Serialize};
use super::node::{Attributes, EdgeId, NodeId};

/// Relationship between two nodes of the same network.
///
/// `from`/`to` reference node ids; direction is only meaningful to
/// downstream exporters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Optional edge identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EdgeId>,
    /// Source node.
    pub from: NodeId,
    /// Target node.
    pub to: NodeId,
    /// Recorded attributes.
    #[serde(default)]
    pub attributes: Attributes,
    /// Ego that produced this edge, stamped by ego attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ego_id: Option<NodeId>,
}

impl Edge {
    /// Create an edge without attributes.
    pub fn new(from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        Self {
            id: None,
            from: from.into(),
            to: to.into(),
            attributes: Attributes::new(),
            ego_id: None,
        }
    }

    /// Set the edge identifier.
    pub fn with_id(mut self, id: impl Into<EdgeId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the edge attributes.
    pub fn with_attributes(mut self, attributes: Attributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether either endpoint is `id`.
    pub fn touches(&self, id: &NodeId) -> bool {
        &self.from == id || &self.to == id
    }

    /// Whether both endpoints are the same node.
    pub fn is_self_loop(&self) -> bool {
        self.from == self.to
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_edge_wire_format() {
        let edge = Edge::new("a", "b").with_id("e1");
        let value = serde_json::to_value(&edge).unwrap();
        assert_eq!(value, json!({ "id": "e1", "from": "a", "to": "b", "attributes": {} }));
    }

    #[test]
    fn test_self_loop() {
        assert!(Edge::new("m", "m").is_self_loop());
        assert!(!Edge::new("m", "n").is_self_loop());
        assert!(Edge::new("m", "n").touches(&NodeId::new("n")));
    }
}
