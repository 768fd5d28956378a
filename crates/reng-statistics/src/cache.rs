use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Clone)]
struct Entry<T> {
    value: T,
    cached_at: DateTime<Utc>,
}

/// A per-query-key TTL cache (spec §4.6 "cached per (query-key) with TTL
/// ... invalidated on every admission, closure, deletion, or trim"),
/// the same lock-free `DashMap` idiom the price monitor uses for its cache.
pub struct TtlCache<T: Clone> {
    entries: DashMap<String, Entry<T>>,
    ttl: Duration,
}

impl<T: Clone> TtlCache<T> {
    pub fn new(ttl: Duration) -> Self {
        Self { entries: DashMap::new(), ttl }
    }

    pub fn get(&self, key: &str) -> Option<T> {
        let entry = self.entries.get(key)?;
        let age = Utc::now() - entry.cached_at;
        if age < chrono::Duration::from_std(self.ttl).unwrap_or_default() {
            Some(entry.value.clone())
        } else {
            None
        }
    }

    pub fn put(&self, key: impl Into<String>, value: T) {
        self.entries.insert(key.into(), Entry { value, cached_at: Utc::now() });
    }

    /// Drop every cached entry (spec §4.6 invalidation on write events).
    pub fn invalidate_all(&self) {
        self.entries.clear();
    }
}
