//! Service state management.
//!
//! Store handles are injected here and shared by every request; nothing is
//! held in process-wide singletons.

use std::sync::Arc;

use crate::cache::{CacheConfig, ReplayCache};
use crate::metrics::LogMetrics;
use crate::replay::ResolutionReplayer;
use crate::store::{ResolutionStore, SessionStore};

/// Shared service state.
pub struct ServiceState<S> {
    /// Session and resolution store.
    pub store: Arc<S>,
    /// Replayer reporting skipped transforms to the log.
    pub replayer: ResolutionReplayer<LogMetrics>,
    /// Cache of recent replay outcomes.
    pub cache: ReplayCache,
}

impl<S: SessionStore + ResolutionStore + 'static> ServiceState<S> {
    /// Create service state with the default cache configuration.
    pub fn new(store: S) -> Self {
        Self::with_cache(store, &CacheConfig::default())
    }

    /// Create service state with a custom cache configuration.
    pub fn with_cache(store: S, cache: &CacheConfig) -> Self {
        Self {
            store: Arc::new(store),
            replayer: ResolutionReplayer::new(LogMetrics),
            cache: ReplayCache::new(cache),
        }
    }

    /// Create service state with the cache configured from the environment.
    pub fn from_env(store: S) -> Self {
        let cache = CacheConfig::from_env();
        tracing::info!(
            enabled = cache.enabled,
            max_entries = cache.max_entries,
            "Replay cache configured"
        );
        Self::with_cache(store, &cache)
    }
}

impl<S> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            replayer: self.replayer.clone(),
            cache: self.cache.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;

    #[test]
    fn test_clones_share_store_and_cache() {
        let state = ServiceState::new(InMemoryStore::new());
        let clone = state.clone();
        assert!(Arc::ptr_eq(&state.store, &clone.store));
        assert_eq!(state.cache.stats().capacity, clone.cache.stats().capacity);
    }

    #[test]
    fn test_disabled_cache() {
        let config = CacheConfig { max_entries: 0, enabled: false };
        let state = ServiceState::with_cache(InMemoryStore::new(), &config);
        assert_eq!(state.cache.stats().capacity, 0);
    }
}
