//! Ego attachment: provenance stamping before sessions are merged.

use std::borrow::Cow;

use crate::types::{Ego, Network, Session};

/// Stamp a session's nodes and edges with its ego id and fold the
/// session-level variables into the ego record.
///
/// Ego attributes win over session variables on key collision. A session
/// without an ego is returned unchanged (borrowed).
pub fn attach_ego(session: &Session) -> Cow<'_, Network> {
    let Some(ego) = session.network.ego.first() else {
        return Cow::Borrowed(&session.network);
    };

    let mut network = session.network.clone();
    let ego_id = ego.id.clone();

    for node in &mut network.nodes {
        node.ego_id = Some(ego_id.clone());
    }
    for edge in &mut network.edges {
        edge.ego_id = Some(ego_id.clone());
    }

    network.ego = session
        .network
        .ego
        .iter()
        .map(|ego| merge_variables(ego, session))
        .collect();

    Cow::Owned(network)
}

fn merge_variables(ego: &Ego, session: &Session) -> Ego {
    let mut attributes = session.variables.clone();
    attributes.extend(ego.attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ego::new(ego.id.clone(), attributes)
}
