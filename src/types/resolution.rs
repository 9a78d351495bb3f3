//! Resolution log entries and the transforms they carry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::{Attributes, NodeId, ResolutionId};

/// Contraction of a set of node ids into one canonical node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    /// Canonical node id that replaces `nodes`.
    pub id: NodeId,
    /// Source node ids to remove.
    pub nodes: Vec<NodeId>,
    /// Resolved attributes for the canonical node.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Transform {
    /// Create a transform.
    pub fn new<I, N>(id: impl Into<NodeId>, nodes: I, attributes: Attributes) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<NodeId>,
    {
        Self {
            id: id.into(),
            nodes: nodes.into_iter().map(Into::into).collect(),
            attributes,
        }
    }
}

/// A reviewed batch of merge decisions.
///
/// Append-only once persisted. The log is totally ordered by
/// `(date, sequence, id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    /// Resolution identifier.
    pub id: ResolutionId,
    /// When the resolution was recorded.
    pub date: DateTime<Utc>,
    /// Insertion sequence number, the tie-break for equal dates.
    #[serde(default)]
    pub sequence: u64,
    /// Transforms, applied in array order.
    #[serde(default)]
    pub transforms: Vec<Transform>,
    /// Matcher parameters used to produce this resolution.
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub parameters: serde_json::Value,
}

impl Resolution {
    /// Create a resolution with sequence 0 and no parameters.
    pub fn new(id: impl Into<ResolutionId>, date: DateTime<Utc>, transforms: Vec<Transform>) -> Self {
        Self {
            id: id.into(),
            date,
            sequence: 0,
            transforms,
            parameters: serde_json::Value::Null,
        }
    }

    /// Set the insertion sequence number.
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Total order key: date, then insertion sequence, then id.
    pub fn order_key(&self) -> (DateTime<Utc>, u64, &ResolutionId) {
        (self.date, self.sequence, &self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_transform_from_json() {
        let transform: Transform = serde_json::from_value(json!({
            "id": "M",
            "nodes": ["n1", "n2"],
            "attributes": { "name": "Merged" }
        }))
        .unwrap();

        assert_eq!(transform.id, NodeId::new("M"));
        assert_eq!(transform.nodes, vec![NodeId::new("n1"), NodeId::new("n2")]);
        assert_eq!(transform.attributes["name"], json!("Merged"));
    }

    #[test]
    fn test_order_key_breaks_date_ties_by_sequence() {
        let date = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = Resolution::new("b", date, vec![]).with_sequence(1);
        let b = Resolution::new("a", date, vec![]).with_sequence(2);
        assert!(a.order_key() < b.order_key());
    }
}
