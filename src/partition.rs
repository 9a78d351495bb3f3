//! Session partitioning into resolution epochs.
//!
//! A session belongs to the epoch of the first resolution dated strictly
//! after it. Sessions newer than every resolution are unresolved.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Resolution, ResolutionId, Session};

/// Bucket key used for unresolved sessions in serialized summaries.
pub const UNRESOLVED_BUCKET: &str = "_unresolved";

/// Sessions grouped by the resolution epoch they precede.
#[derive(Debug, Clone, Default)]
pub struct SessionBuckets<'a> {
    by_resolution: BTreeMap<&'a ResolutionId, Vec<&'a Session>>,
    unresolved: Vec<&'a Session>,
}

impl<'a> SessionBuckets<'a> {
    /// Sessions assigned to `id`. Empty when none were.
    pub fn for_resolution(&self, id: &ResolutionId) -> &[&'a Session] {
        self.by_resolution
            .get(id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Sessions dated after every resolution.
    pub fn unresolved(&self) -> &[&'a Session] {
        &self.unresolved
    }

    /// Total number of sessions across all buckets.
    pub fn len(&self) -> usize {
        self.by_resolution.values().map(Vec::len).sum::<usize>() + self.unresolved.len()
    }

    /// Whether no sessions were partitioned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Non-empty resolution buckets, keyed by resolution id.
    pub fn resolution_buckets(&self) -> impl Iterator<Item = (&'a ResolutionId, &[&'a Session])> + '_ {
        self.by_resolution.iter().map(|(id, sessions)| (*id, sessions.as_slice()))
    }
}

/// Assign each session to the first resolution dated strictly after it.
///
/// `ordered` must be sorted oldest first, as produced by
/// [`crate::ordering::prior_resolutions`]. Session order within a bucket
/// follows input order.
pub fn partition_sessions<'a>(
    ordered: &[&'a Resolution],
    sessions: &'a [Session],
) -> SessionBuckets<'a> {
    let mut buckets = SessionBuckets::default();

    for session in sessions {
        let index = ordered.partition_point(|r| r.date <= session.date);
        match ordered.get(index) {
            Some(resolution) => buckets
                .by_resolution
                .entry(&resolution.id)
                .or_default()
                .push(session),
            None => buckets.unresolved.push(session),
        }
    }

    buckets
}

/// Per-epoch counts for listing the resolution log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EpochSummary {
    /// Resolution id, or [`UNRESOLVED_BUCKET`].
    pub bucket: String,
    /// Resolution date; `None` for the unresolved bucket.
    pub date: Option<DateTime<Utc>>,
    /// Sessions captured during this epoch.
    pub session_count: usize,
    /// Transforms recorded by the resolution.
    pub transform_count: usize,
}

/// Summarize each epoch, oldest first, followed by the unresolved bucket.
pub fn summarize_epochs(ordered: &[&Resolution], buckets: &SessionBuckets<'_>) -> Vec<EpochSummary> {
    let mut summaries: Vec<EpochSummary> = ordered
        .iter()
        .map(|r| EpochSummary {
            bucket: r.id.to_string(),
            date: Some(r.date),
            session_count: buckets.for_resolution(&r.id).len(),
            transform_count: r.transforms.len(),
        })
        .collect();

    summaries.push(EpochSummary {
        bucket: UNRESOLVED_BUCKET.to_string(),
        date: None,
        session_count: buckets.unresolved().len(),
        transform_count: 0,
    });

    summaries
}
