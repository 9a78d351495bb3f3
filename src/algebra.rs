//! Network algebra: union of networks and contraction of node sets.
//!
//! Both operations are pure. Union never deduplicates; deduplication is
//! exclusively the job of transforms.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::{Network, Node, NodeId, Transform};

/// Result of attempting a transform against a network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TransformOutcome {
    /// Every source node was present; the network was contracted.
    Applied {
        /// Number of source nodes removed.
        removed: usize,
    },
    /// Some source nodes were absent; the network is unchanged.
    Skipped {
        /// Source ids not present in the network.
        missing: Vec<NodeId>,
    },
}

impl TransformOutcome {
    /// Whether the transform was applied.
    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

/// Concatenate networks in order.
///
/// Nodes, edges and ego records are appended in input order, then in order
/// within each network.
pub fn union<'a, I>(networks: I) -> Network
where
    I: IntoIterator<Item = &'a Network>,
{
    let mut merged = Network::empty();
    for network in networks {
        merged.nodes.extend(network.nodes.iter().cloned());
        merged.edges.extend(network.edges.iter().cloned());
        merged.ego.extend(network.ego.iter().cloned());
    }
    merged
}

/// Append `others` onto an owned accumulator without cloning it.
pub(crate) fn union_into<'a, I>(mut accumulator: Network, others: I) -> Network
where
    I: IntoIterator<Item = &'a Network>,
{
    for network in others {
        accumulator.nodes.extend(network.nodes.iter().cloned());
        accumulator.edges.extend(network.edges.iter().cloned());
        accumulator.ego.extend(network.ego.iter().cloned());
    }
    accumulator
}

/// Apply a transform, returning the contracted network.
///
/// If not every id in `transform.nodes` is present, the network is returned
/// unchanged.
pub fn apply_transform(network: &Network, transform: &Transform) -> Network {
    let (network, _) = try_apply_transform(network.clone(), transform);
    network
}

/// Apply a transform to an owned network and report what happened.
///
/// 1. Remove every node whose id is in `transform.nodes`.
/// 2. If fewer than `transform.nodes.len()` nodes were removed, skip: the
///    original network is returned untouched.
/// 3. Append the canonical node `{ id, attributes }`.
/// 4. Rewire every edge endpoint in `transform.nodes` to `transform.id`.
///    Edges between two source nodes become self-loops.
pub fn try_apply_transform(network: Network, transform: &Transform) -> (Network, TransformOutcome) {
    let sources: HashSet<&NodeId> = transform.nodes.iter().collect();

    let removed = network
        .nodes
        .iter()
        .filter(|n| sources.contains(&n.id))
        .count();

    if removed != transform.nodes.len() {
        let present = network.node_ids();
        let missing = transform
            .nodes
            .iter()
            .filter(|id| !present.contains(id))
            .cloned()
            .collect();
        return (network, TransformOutcome::Skipped { missing });
    }

    let Network { nodes, edges, ego } = network;

    let mut nodes: Vec<Node> = nodes
        .into_iter()
        .filter(|n| !sources.contains(&n.id))
        .collect();
    nodes.push(Node::new(transform.id.clone(), transform.attributes.clone()));

    let edges = edges
        .into_iter()
        .map(|mut edge| {
            if sources.contains(&edge.from) {
                edge.from = transform.id.clone();
            }
            if sources.contains(&edge.to) {
                edge.to = transform.id.clone();
            }
            edge
        })
        .collect();

    (
        Network { nodes, edges, ego },
        TransformOutcome::Applied { removed },
    )
}
