//! # network-resolver
//!
//! Deterministic replay of reviewed node merges over network sessions.
//!
//! Each session captures a small network (nodes, edges, an optional ego).
//! Reviewers periodically record a *resolution*: a batch of transforms, each
//! collapsing several nodes believed to be the same entity into one
//! canonical node. The resolver answers one question:
//!
//! > Given the sessions and the resolution log, what is the canonical network?
//!
//! ## Architecture
//!
//! ```text
//! Resolutions → prior_resolutions → partition_sessions → fold(union, apply_transform) → Network
//!                                          ↑
//!                           Sessions (SessionStore: Postgres or Memory)
//! ```
//!
//! ## Determinism Guarantees
//!
//! - Same sessions + same resolutions + same options → identical network
//! - Resolutions are ordered by (date, sequence, id)
//! - A session belongs to the first resolution dated strictly after it
//! - Transforms whose source nodes are not all present are skipped, never partially applied

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod algebra;
pub mod ordering;
pub mod partition;
pub mod ego;
pub mod replay;
pub mod metrics;
pub mod canonical;
pub mod cache;
pub mod store;

#[cfg(feature = "matcher")]
pub mod matcher;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use types::{
    Attributes, Edge, EdgeId, Ego, Network, Node, NodeId, ProtocolId, Resolution, ResolutionId,
    Session, SessionId, Transform,
};
pub use algebra::{apply_transform, try_apply_transform, union, TransformOutcome};
pub use ordering::{prior_resolutions, sort_resolutions, ResolutionNotFound};
pub use partition::{partition_sessions, summarize_epochs, EpochSummary, SessionBuckets, UNRESOLVED_BUCKET};
pub use ego::attach_ego;
pub use replay::{
    replay, ReplayError, ReplayOptions, ReplayOutcome, ResolutionReplayer, SkippedTransform,
};
pub use metrics::{LogMetrics, NoOpMetrics, ReplayMetrics, TestMetrics};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use cache::{CacheConfig, CacheStats, ReplayCache, ReplayKey};
pub use store::{
    delete_session_cascade, CascadeReport, InMemoryStore, ResolutionOptions, ResolutionStore,
    SessionStore, StoreError,
};
#[cfg(feature = "postgres")]
pub use store::PostgresStore;

#[cfg(feature = "matcher")]
pub use matcher::{
    CommandMatcher, DuplicateMatcher, MatchCandidate, MatchRequest, MatchSession, MatcherError,
    StaticMatcher,
};

// Service re-exports (when service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version for serialized sessions, resolutions and networks.
/// Increment on breaking changes to any schema type.
pub const RESOLVER_SCHEMA_VERSION: &str = "1.0.0";
