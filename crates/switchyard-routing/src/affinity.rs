//! Session affinity memory
//!
//! Remembers which provider last served an affinity key successfully.
//! In-memory only and bounded; at capacity an arbitrary entry is evicted.

use dashmap::DashMap;

/// Bounded map from affinity key to provider id
#[derive(Debug)]
pub struct AffinityMap {
    entries: DashMap<String, String>,
    capacity: usize,
}

impl AffinityMap {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Provider that last served this key
    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Remember a successful provider for a key
    pub fn remember(&self, key: &str, provider_id: &str) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.capacity {
            let victim = self.entries.iter().next().map(|entry| entry.key().clone());
            if let Some(victim) = victim {
                self.entries.remove(&victim);
            }
        }
        self.entries.insert(key.to_owned(), provider_id.to_owned());
    }

    /// Forget every key pointing at a provider
    pub fn forget_provider(&self, provider_id: &str) {
        self.entries.retain(|_, provider| provider != provider_id);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for AffinityMap {
    fn default() -> Self {
        Self::new(10_000)
    }
}
