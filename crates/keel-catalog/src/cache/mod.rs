//! Repository index caching with TTL support
//!
//! One [`IndexCache`] is shared by every client an engine builds, so a
//! long-lived engine downloads each repository index once per TTL.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;

/// Default lifetime of a cached index
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct CachedIndex {
    entries: Vec<Value>,
    stored_at: Instant,
}

/// Undecoded repository indexes keyed by index URL
#[derive(Debug)]
pub struct IndexCache {
    indexes: DashMap<String, CachedIndex>,
    ttl: Duration,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            indexes: DashMap::new(),
            ttl,
        }
    }

    /// Cached index for `url` unless it has expired; expired indexes are
    /// dropped
    pub fn get(&self, url: &str) -> Option<Vec<Value>> {
        let entries = self
            .indexes
            .get(url)
            .map(|cached| (cached.stored_at.elapsed() < self.ttl).then(|| cached.entries.clone()))?;
        if entries.is_none() {
            self.indexes.remove(url);
        }
        entries
    }

    pub fn insert(&self, url: String, entries: Vec<Value>) {
        self.indexes.insert(
            url,
            CachedIndex {
                entries,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

impl Default for IndexCache {
    fn default() -> Self {
        Self::new()
    }
}
