use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    payload: V,
    fetched_at: DateTime<Utc>,
    validity: Duration,
}

impl<V> CacheEntry<V> {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at <= self.validity
    }
}

/// Key-value store with per-entry validity. Stale entries read as misses and are
/// replaced by the next `put`; nothing else evicts. Writes are last-writer-wins.
#[derive(Debug)]
pub struct TtlCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
}

impl<V: Clone> Default for TtlCache<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> TtlCache<V> {
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }

    pub fn get(&self, key: &str) -> Option<V> {
        self.get_at(key, Utc::now())
    }

    pub fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<V> {
        self.entries
            .get(key)
            .filter(|e| e.is_fresh(now))
            .map(|e| e.payload.clone())
    }

    pub fn put(&self, key: impl Into<String>, payload: V, validity: Duration) {
        self.put_at(key, payload, validity, Utc::now());
    }

    pub fn put_at(&self, key: impl Into<String>, payload: V, validity: Duration, now: DateTime<Utc>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                payload,
                fetched_at: now,
                validity,
            },
        );
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Entry count, stale entries included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn miss_then_hit() {
        let cache = TtlCache::new();
        assert!(cache.get("k").is_none());
        cache.put("k", 1u32, Duration::hours(1));
        assert_eq!(cache.get("k"), Some(1));
    }

    #[test]
    fn stale_entry_reads_as_miss_and_is_overwritten() {
        let cache = TtlCache::new();
        let t0 = Utc::now();
        cache.put_at("k", "old".to_string(), Duration::hours(12), t0);

        assert_eq!(cache.get_at("k", t0 + Duration::hours(12)), Some("old".to_string()));
        assert!(cache.get_at("k", t0 + Duration::hours(13)).is_none());

        let t1 = t0 + Duration::hours(13);
        cache.put_at("k", "new".to_string(), Duration::hours(12), t1);
        assert_eq!(cache.get_at("k", t1), Some("new".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn validity_is_per_entry() {
        let cache = TtlCache::new();
        let t0 = Utc::now();
        cache.put_at("historical", 1, Duration::hours(24), t0);
        cache.put_at("recent", 2, Duration::hours(12), t0);
        let later = t0 + Duration::hours(18);
        assert_eq!(cache.get_at("historical", later), Some(1));
        assert!(cache.get_at("recent", later).is_none());
    }

    #[test]
    fn clear_drops_everything() {
        let cache = TtlCache::new();
        cache.put("a", 1, Duration::hours(1));
        cache.put("b", 2, Duration::hours(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
