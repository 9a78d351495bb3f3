//! Node and identifier types for captured networks.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Attribute map carried by nodes, edges, egos and transforms.
///
/// A `BTreeMap` keeps serialized output (and therefore fingerprints)
/// deterministic.
pub type Attributes = BTreeMap<String, serde_json::Value>;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Get the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id! {
    /// Identifier of a node (or ego) within a network.
    ///
    /// Unique only within the session that produced it, until a transform
    /// assigns a canonical id.
    NodeId
}

string_id! {
    /// Identifier of an edge within a network.
    EdgeId
}

string_id! {
    /// Identifier of an interview session.
    SessionId
}

string_id! {
    /// Identifier of a resolution in the merge log.
    ResolutionId
}

string_id! {
    /// Identifier of the protocol (population) sessions belong to.
    ProtocolId
}

/// A person (or other entity) in a captured network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Node identifier.
    pub id: NodeId,
    /// Recorded attributes.
    #[serde(default)]
    pub attributes: Attributes,
    /// Ego that produced this node, stamped by ego attachment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ego_id: Option<NodeId>,
}

impl Node {
    /// Create a node with the given attributes.
    pub fn new(id: impl Into<NodeId>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
            ego_id: None,
        }
    }

    /// Create a node without attributes.
    pub fn bare(id: impl Into<NodeId>) -> Self {
        Self::new(id, Attributes::new())
    }
}

/// The respondent who produced a session.
///
/// Same shape as a [`Node`]; carries session-level variables once attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ego {
    /// Ego identifier.
    pub id: NodeId,
    /// Ego attributes.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Ego {
    /// Create an ego record.
    pub fn new(id: impl Into<NodeId>, attributes: Attributes) -> Self {
        Self {
            id: id.into(),
            attributes,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_ids_serialize_transparently() {
        let id = NodeId::new("n1");
        assert_eq!(serde_json::to_value(&id).unwrap(), json!("n1"));
        assert_eq!(id.to_string(), "n1");
    }

    #[test]
    fn test_node_omits_missing_ego_stamp() {
        let node = Node::bare("n1");
        let value = serde_json::to_value(&node).unwrap();
        assert_eq!(value, json!({ "id": "n1", "attributes": {} }));
    }

    #[test]
    fn test_node_deserializes_without_attributes() {
        let node: Node = serde_json::from_value(json!({ "id": "n2", "egoId": "e1" })).unwrap();
        assert!(node.attributes.is_empty());
        assert_eq!(node.ego_id, Some(NodeId::new("e1")));
    }
}
