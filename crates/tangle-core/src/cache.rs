//! Hook for an external materialization cache.
//!
//! [`crate::repo::Repository`] asks the cache first and only falls back to
//! the store when it has nothing. Every state the repository materializes
//! is handed back through [`CachePort::persist`].

use crate::graph::GraphState;

/// A place to keep the last materialized state between calls.
///
/// Implementations own their failure handling: a cache that cannot load
/// returns `None`, and a cache that cannot save drops the state.
pub trait CachePort: Send + Sync {
    fn hydrate(&self) -> Option<GraphState>;

    fn persist(&self, state: &GraphState);
}
