use crate::models::MediaSummary;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

/// Query-keyed LRU of shaped results. An empty result list is a real value, not a miss.
pub struct SearchCache {
    name: &'static str,
    entries: Mutex<LruCache<String, Vec<MediaSummary>>>,
}

impl SearchCache {
    pub fn new(name: &'static str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            name,
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns a copy of the cached results and marks the query as recently used.
    pub fn get(&self, query: &str) -> Option<Vec<MediaSummary>> {
        if let Ok(mut entries) = self.entries.lock() {
            entries.get(query).cloned()
        } else {
            None
        }
    }

    pub fn insert(&self, query: &str, results: Vec<MediaSummary>) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.put(query.to_string(), results);
        }
    }

    /// Membership check that does not touch recency.
    pub fn contains(&self, query: &str) -> bool {
        if let Ok(entries) = self.entries.lock() {
            entries.contains(query)
        } else {
            false
        }
    }

    pub fn len(&self) -> usize {
        if let Ok(entries) = self.entries.lock() {
            entries.len()
        } else {
            0
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        if let Ok(entries) = self.entries.lock() {
            entries.cap().get()
        } else {
            0
        }
    }
}
