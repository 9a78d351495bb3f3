//! LRU cache for replay outcomes.
//!
//! Preview and export requests against the same protocol tend to replay the
//! same inputs repeatedly. The key is a digest of everything the fold reads:
//! - protocol id
//! - replay options
//! - every session `(id, date)` plus the canonical hash of its network and
//!   variables
//! - every resolution `(id, date, sequence)` plus the canonical hash of its
//!   transforms
//!
//! A session deleted and re-imported under the same id and date with
//! different content therefore gets a different key.

use std::hash::Hasher;
use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;
use parking_lot::Mutex;
use xxhash_rust::xxh64::Xxh64;

use crate::canonical::canonical_hash;
use crate::replay::{ReplayOptions, ReplayOutcome};
use crate::types::{ProtocolId, Resolution, Session};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1024) {
    Some(n) => n,
    None => unreachable!(),
};

/// Configuration for the replay cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum number of cached outcomes.
    pub max_entries: usize,
    /// Whether to enable the cache.
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_CAPACITY.get(),
            enabled: true,
        }
    }
}

impl CacheConfig {
    /// Load from `REPLAY_CACHE_ENTRIES`; `0` disables the cache.
    pub fn from_env() -> Self {
        match std::env::var("REPLAY_CACHE_ENTRIES").ok().and_then(|s| s.parse().ok()) {
            Some(0) => Self { max_entries: 0, enabled: false },
            Some(n) => Self { max_entries: n, enabled: true },
            None => Self::default(),
        }
    }
}

/// Digest of everything a replay depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReplayKey(u64);

impl ReplayKey {
    /// Compute the key for a replay request.
    pub fn compute(
        protocol: &ProtocolId,
        options: &ReplayOptions,
        sessions: &[Session],
        resolutions: &[Resolution],
    ) -> Result<Self, serde_json::Error> {
        let mut hasher = Xxh64::new(0);

        hasher.write(protocol.as_str().as_bytes());
        hasher.write_u8(0);
        match &options.from_resolution {
            Some(id) => {
                hasher.write_u8(1);
                hasher.write(id.as_str().as_bytes());
            }
            None => hasher.write_u8(0),
        }
        hasher.write_u8(options.include_unresolved as u8);
        hasher.write_u8(options.use_ego_data as u8);

        hasher.write_usize(sessions.len());
        for session in sessions {
            hasher.write(session.id.as_str().as_bytes());
            hasher.write_u8(0);
            hasher.write_i64(session.date.timestamp_micros());
            hasher.write_u64(canonical_hash(&session.network)?);
            hasher.write_u64(canonical_hash(&session.variables)?);
        }

        hasher.write_usize(resolutions.len());
        for resolution in resolutions {
            hasher.write(resolution.id.as_str().as_bytes());
            hasher.write_u8(0);
            hasher.write_i64(resolution.date.timestamp_micros());
            hasher.write_u64(resolution.sequence);
            hasher.write_u64(canonical_hash(&resolution.transforms)?);
        }

        Ok(Self(hasher.finish()))
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries currently cached.
    pub len: usize,
    /// Cache capacity.
    pub capacity: usize,
}

/// Thread-safe LRU cache of replay outcomes.
#[derive(Debug, Clone)]
pub struct ReplayCache {
    inner: Option<Arc<Mutex<LruCache<ReplayKey, Arc<ReplayOutcome>>>>>,
}

impl ReplayCache {
    /// Create a cache from configuration.
    pub fn new(config: &CacheConfig) -> Self {
        let inner = if config.enabled {
            let size = NonZeroUsize::new(config.max_entries).unwrap_or(DEFAULT_CAPACITY);
            Some(Arc::new(Mutex::new(LruCache::new(size))))
        } else {
            None
        };
        Self { inner }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Look up a cached outcome.
    pub fn get(&self, key: &ReplayKey) -> Option<Arc<ReplayOutcome>> {
        self.inner.as_ref()?.lock().get(key).cloned()
    }

    /// Store an outcome.
    pub fn insert(&self, key: ReplayKey, outcome: Arc<ReplayOutcome>) {
        if let Some(inner) = &self.inner {
            inner.lock().put(key, outcome);
        }
    }

    /// Return the cached outcome, or compute and store it.
    ///
    /// Errors are not cached.
    pub fn get_or_try_insert<E>(
        &self,
        key: ReplayKey,
        compute: impl FnOnce() -> Result<ReplayOutcome, E>,
    ) -> Result<(Arc<ReplayOutcome>, bool), E> {
        if let Some(hit) = self.get(&key) {
            return Ok((hit, true));
        }
        let outcome = Arc::new(compute()?);
        self.insert(key, Arc::clone(&outcome));
        Ok((outcome, false))
    }

    /// Drop every entry.
    pub fn clear(&self) {
        if let Some(inner) = &self.inner {
            inner.lock().clear();
        }
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        match &self.inner {
            Some(inner) => {
                let cache = inner.lock();
                CacheStats {
                    len: cache.len(),
                    capacity: cache.cap().get(),
                }
            }
            None => CacheStats::default(),
        }
    }
}

impl Default for ReplayCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}
