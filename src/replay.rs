//! Deterministic replay of the resolution log.
//!
//! The replayer folds the ordered resolution log over partitioned sessions.
//! Each step unions the epoch's sessions into the accumulated network and
//! then applies the resolution's transforms, in order, to that network.
//! Transforms therefore always see the current accumulated network, which
//! is what makes merges of earlier canonical nodes resolve correctly.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::algebra::{try_apply_transform, union_into, TransformOutcome};
use crate::canonical::canonical_hash_hex;
use crate::ego::attach_ego;
use crate::metrics::{NoOpMetrics, ReplayMetrics};
use crate::ordering::{prior_resolutions, ResolutionNotFound};
use crate::partition::partition_sessions;
use crate::types::{Network, NodeId, Resolution, ResolutionId, Session};

/// Error type for replay.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// `from_resolution` is not in the log.
    #[error(transparent)]
    ResolutionNotFound(#[from] ResolutionNotFound),
}

/// Options for a replay request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReplayOptions {
    /// Replay up to and including this resolution. `None` replays everything.
    pub from_resolution: Option<ResolutionId>,
    /// Append sessions newer than the last replayed resolution, untransformed.
    pub include_unresolved: bool,
    /// Run ego attachment on each session before it is merged.
    pub use_ego_data: bool,
}

impl ReplayOptions {
    /// Replay the whole log, dropping unresolved sessions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop at `id`.
    pub fn from_resolution(mut self, id: impl Into<ResolutionId>) -> Self {
        self.from_resolution = Some(id.into());
        self
    }

    /// Include unresolved sessions.
    pub fn include_unresolved(mut self, include: bool) -> Self {
        self.include_unresolved = include;
        self
    }

    /// Attach ego data before merging.
    pub fn use_ego_data(mut self, use_ego_data: bool) -> Self {
        self.use_ego_data = use_ego_data;
        self
    }
}

/// A transform that was skipped because some source nodes were absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkippedTransform {
    /// Resolution carrying the transform.
    pub resolution_id: ResolutionId,
    /// Canonical id the transform would have produced.
    pub transform_id: NodeId,
    /// Source ids missing from the working network.
    pub missing: Vec<NodeId>,
}

/// Result of a replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayOutcome {
    /// The resolved network.
    pub network: Network,
    /// Transforms skipped during the fold.
    pub skipped: Vec<SkippedTransform>,
    /// Number of resolutions folded.
    pub resolutions_applied: usize,
    /// Number of sessions merged into the result.
    pub sessions_included: usize,
}

impl ReplayOutcome {
    /// Canonical xxh64 fingerprint of the resolved network.
    pub fn fingerprint(&self) -> Result<String, serde_json::Error> {
        canonical_hash_hex(&self.network)
    }
}

/// Folds a resolution log over sessions.
///
/// Holds no state between calls; concurrent replays never interfere.
#[derive(Debug, Clone, Default)]
pub struct ResolutionReplayer<M: ReplayMetrics = NoOpMetrics> {
    metrics: M,
}

impl<M: ReplayMetrics> ResolutionReplayer<M> {
    /// Create a replayer reporting to `metrics`.
    pub fn new(metrics: M) -> Self {
        Self { metrics }
    }

    /// Get the metrics sink.
    pub fn metrics(&self) -> &M {
        &self.metrics
    }

    /// Reconstruct the canonical network.
    ///
    /// ## Algorithm
    ///
    /// 1. Order the log and cut it at `from_resolution`
    /// 2. Partition sessions into the epoch of the next resolution
    /// 3. For each resolution, oldest first:
    ///    - union its epoch's sessions into the accumulator (if any)
    ///    - apply its transforms in order, skipping any whose sources
    ///      are not all present
    /// 4. Optionally append unresolved sessions, untransformed
    pub fn replay(
        &self,
        sessions: &[Session],
        resolutions: &[Resolution],
        options: &ReplayOptions,
    ) -> Result<ReplayOutcome, ReplayError> {
        let ordered = prior_resolutions(resolutions, options.from_resolution.as_ref())?;
        let buckets = partition_sessions(&ordered, sessions);

        let mut accumulator = Network::empty();
        let mut skipped = Vec::new();
        let mut sessions_included = 0;

        for resolution in &ordered {
            let epoch = buckets.for_resolution(&resolution.id);
            if !epoch.is_empty() {
                accumulator = merge_sessions(accumulator, epoch, options.use_ego_data);
                sessions_included += epoch.len();
            }

            for transform in &resolution.transforms {
                let (next, outcome) = try_apply_transform(accumulator, transform);
                accumulator = next;

                if let TransformOutcome::Skipped { missing } = outcome {
                    warn!(
                        resolution_id = %resolution.id,
                        transform_id = %transform.id,
                        missing = ?missing,
                        "Skipping transform with source nodes absent from the network"
                    );
                    let entry = SkippedTransform {
                        resolution_id: resolution.id.clone(),
                        transform_id: transform.id.clone(),
                        missing,
                    };
                    self.metrics.record_skipped_transform(&entry);
                    skipped.push(entry);
                }
            }

            debug!(
                resolution_id = %resolution.id,
                epoch_sessions = epoch.len(),
                transforms = resolution.transforms.len(),
                nodes = accumulator.num_nodes(),
                edges = accumulator.num_edges(),
                "Resolution replayed"
            );
        }

        let unresolved = buckets.unresolved();
        if options.include_unresolved && !unresolved.is_empty() {
            accumulator = merge_sessions(accumulator, unresolved, options.use_ego_data);
            sessions_included += unresolved.len();
        }

        self.metrics.record_replay(skipped.len());

        Ok(ReplayOutcome {
            network: accumulator,
            skipped,
            resolutions_applied: ordered.len(),
            sessions_included,
        })
    }
}

/// Union `sessions` onto the accumulator, optionally ego-attached first.
fn merge_sessions(accumulator: Network, sessions: &[&Session], use_ego_data: bool) -> Network {
    let networks: Vec<Cow<'_, Network>> = sessions
        .iter()
        .map(|session| {
            if use_ego_data {
                attach_ego(session)
            } else {
                Cow::Borrowed(&session.network)
            }
        })
        .collect();

    union_into(accumulator, networks.iter().map(|network| &**network))
}

/// Replay with default metrics, returning only the resolved network.
pub fn replay(
    sessions: &[Session],
    resolutions: &[Resolution],
    options: &ReplayOptions,
) -> Result<Network, ReplayError> {
    ResolutionReplayer::new(NoOpMetrics)
        .replay(sessions, resolutions, options)
        .map(|outcome| outcome.network)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::{TestMetrics, TRANSFORM_SKIPPED_METRIC};
    use crate::types::{Attributes, Edge, Ego, Node, Transform};
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use serde_json::json;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    fn session(id: &str, date: i64, nodes: &[&str], edges: &[(&str, &str)]) -> Session {
        Session::new(
            id,
            day(date),
            Network::new(
                nodes.iter().map(|n| Node::bare(*n)).collect(),
                edges.iter().map(|(a, b)| Edge::new(*a, *b)).collect(),
            ),
        )
    }

    fn merge(id: &str, nodes: &[&str]) -> Transform {
        Transform::new(id, nodes.iter().copied(), Attributes::new())
    }

    fn node_ids(network: &Network) -> Vec<&str> {
        network.nodes.iter().map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_empty_inputs_give_empty_network() {
        let network = replay(&[], &[], &ReplayOptions::new().include_unresolved(true)).unwrap();
        assert!(network.is_empty());
    }

    #[test]
    fn test_resolution_merges_across_epochs() {
        // s1 lands in r1's epoch, s2 in r2's; r2 merges a node from each.
        let sessions = vec![
            session("s1", 0, &["a1", "b1"], &[("a1", "b1")]),
            session("s2", 2, &["a2"], &[]),
        ];
        let resolutions = vec![
            Resolution::new("r1", day(1), vec![]),
            Resolution::new("r2", day(3), vec![merge("A", &["a1", "a2"])]),
        ];

        let network = replay(&sessions, &resolutions, &ReplayOptions::new()).unwrap();

        assert_eq!(node_ids(&network), vec!["b1", "A"]);
        assert_eq!(network.edges[0].from.as_str(), "A");
    }

    #[test]
    fn test_empty_epoch_still_applies_transforms() {
        let sessions = vec![session("s1", 0, &["x", "y"], &[])];
        let resolutions = vec![
            Resolution::new("r1", day(1), vec![]),
            Resolution::new("r2", day(2), vec![merge("XY", &["x", "y"])]),
        ];

        let network = replay(&sessions, &resolutions, &ReplayOptions::new()).unwrap();
        assert_eq!(node_ids(&network), vec!["XY"]);
    }

    #[test]
    fn test_from_resolution_stops_early_and_drops_later_sessions() {
        let sessions = vec![
            session("s1", 0, &["a", "b"], &[]),
            session("s2", 2, &["c"], &[]),
        ];
        let resolutions = vec![
            Resolution::new("r1", day(1), vec![merge("AB", &["a", "b"])]),
            Resolution::new("r2", day(3), vec![merge("ABC", &["AB", "c"])]),
        ];

        let options = ReplayOptions::new().from_resolution("r1");
        let network = replay(&sessions, &resolutions, &options).unwrap();
        assert_eq!(node_ids(&network), vec!["AB"]);

        let options = options.include_unresolved(true);
        let network = replay(&sessions, &resolutions, &options).unwrap();
        assert_eq!(node_ids(&network), vec!["AB", "c"]);
    }

    #[test]
    fn test_skips_are_reported_and_counted() {
        let sessions = vec![session("s1", 0, &["a", "b"], &[])];
        let resolutions = vec![Resolution::new(
            "r1",
            day(1),
            vec![merge("M", &["a", "ghost"]), merge("N", &["a", "b"])],
        )];

        let replayer = ResolutionReplayer::new(TestMetrics::default());
        let outcome = replayer
            .replay(&sessions, &resolutions, &ReplayOptions::new())
            .unwrap();

        assert_eq!(node_ids(&outcome.network), vec!["N"]);
        assert_eq!(outcome.skipped.len(), 1);
        assert_eq!(outcome.skipped[0].transform_id.as_str(), "M");
        assert_eq!(outcome.skipped[0].missing, vec![NodeId::new("ghost")]);
        assert_eq!(replayer.metrics().get_count(TRANSFORM_SKIPPED_METRIC), 1);
    }

    #[test]
    fn test_ego_data_attached_before_merge() {
        let mut s1 = session("s1", 0, &["a"], &[]);
        s1.network.ego.push(Ego::new("ego-1", Attributes::new()));
        s1.variables.insert("site".to_string(), json!("north"));

        let options = ReplayOptions::new().include_unresolved(true).use_ego_data(true);
        let network = replay(&[s1], &[], &options).unwrap();

        assert_eq!(network.nodes[0].ego_id, Some(NodeId::new("ego-1")));
        assert_eq!(network.ego[0].attributes["site"], json!("north"));
    }

    #[test]
    fn test_outcome_counts_and_fingerprint() {
        let sessions = vec![session("s1", 0, &["a"], &[]), session("s2", 5, &["b"], &[])];
        let resolutions = vec![Resolution::new("r1", day(1), vec![])];
        let options = ReplayOptions::new().include_unresolved(true);

        let replayer = ResolutionReplayer::<NoOpMetrics>::default();
        let first = replayer.replay(&sessions, &resolutions, &options).unwrap();
        let second = replayer.replay(&sessions, &resolutions, &options).unwrap();

        assert_eq!(first.resolutions_applied, 1);
        assert_eq!(first.sessions_included, 2);
        assert_eq!(first.fingerprint().unwrap(), second.fingerprint().unwrap());
    }

    #[test]
    fn test_options_wire_format() {
        let options: ReplayOptions = serde_json::from_value(json!({
            "fromResolution": "r9",
            "includeUnresolved": true
        }))
        .unwrap();
        assert_eq!(options.from_resolution, Some(ResolutionId::new("r9")));
        assert!(options.include_unresolved);
        assert!(!options.use_ego_data);
    }
}
